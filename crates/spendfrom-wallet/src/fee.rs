//! Fee estimation.
//!
//! The selector recomputes the fee after every added input, so estimators
//! are a function of transaction shape only.

use spendfrom_core::policy::estimate_tx_size;
use spendfrom_core::{Amount, AmountError, FeePolicy, Policy};

/// Fee for a transaction with `inputs` inputs and `outputs` outputs.
///
/// Must be non-decreasing in `inputs`.
pub trait FeeEstimator {
    fn estimate(&self, inputs: usize, outputs: usize) -> Result<Amount, AmountError>;
}

impl<F> FeeEstimator for F
where
    F: Fn(usize, usize) -> Amount,
{
    fn estimate(&self, inputs: usize, outputs: usize) -> Result<Amount, AmountError> {
        Ok(self(inputs, outputs))
    }
}

/// Same fee regardless of shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedFee(pub Amount);

impl FeeEstimator for FixedFee {
    fn estimate(&self, _inputs: usize, _outputs: usize) -> Result<Amount, AmountError> {
        Ok(self.0)
    }
}

/// `fee_per_kb` for every started kilobyte of estimated size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeFee {
    pub fee_per_kb: Amount,
}

impl FeeEstimator for SizeFee {
    fn estimate(&self, inputs: usize, outputs: usize) -> Result<Amount, AmountError> {
        let kilobytes = estimate_tx_size(inputs, outputs).div_ceil(1000).max(1);
        self.fee_per_kb
            .checked_mul(kilobytes)
            .ok_or(AmountError::Overflow)
    }
}

/// Estimator for a request's fee policy.
pub fn estimator_for(fee: FeePolicy, policy: &Policy) -> Box<dyn FeeEstimator + Send + Sync> {
    match fee {
        FeePolicy::Fixed(amount) => Box::new(FixedFee(amount)),
        FeePolicy::Auto => Box::new(SizeFee {
            fee_per_kb: policy.fee_per_kb,
        }),
    }
}
