//! Spending policy knobs.
//!
//! The dust threshold and fee formula are era-dependent choices of the node
//! software, so they are carried as values rather than baked into the
//! selector or builder.

use crate::amount::Amount;
use crate::constants::{
    DEFAULT_DUST_THRESHOLD, DEFAULT_FEE_PER_KB, DEFAULT_MAX_FEE, DEFAULT_MIN_CONFIRMATIONS,
    INPUT_BYTES, OUTPUT_BYTES, TX_OVERHEAD_BYTES,
};

/// Policy values shared by selection, building, and the fee guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Outputs with fewer confirmations are not spendable.
    pub min_confirmations: u32,
    /// Change below this is folded into the fee.
    pub dust_threshold: Amount,
    /// Fee per started kilobyte for the auto fee policy and the low-fee guard.
    pub fee_per_kb: Amount,
    /// Transactions paying more than this are rejected before signing.
    pub max_fee: Amount,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            min_confirmations: DEFAULT_MIN_CONFIRMATIONS,
            dust_threshold: Amount::from_units(DEFAULT_DUST_THRESHOLD),
            fee_per_kb: Amount::from_units(DEFAULT_FEE_PER_KB),
            max_fee: Amount::from_units(DEFAULT_MAX_FEE),
        }
    }
}

/// Estimated serialized size in bytes of a transaction with the given shape.
pub fn estimate_tx_size(inputs: usize, outputs: usize) -> u64 {
    TX_OVERHEAD_BYTES
        .saturating_add(INPUT_BYTES.saturating_mul(inputs as u64))
        .saturating_add(OUTPUT_BYTES.saturating_mul(outputs as u64))
}
