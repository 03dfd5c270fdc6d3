//! Greedy coin selection over the catalog.
//!
//! Coins are taken largest first; the fee is recomputed after every added
//! input since each input grows the transaction. Selection stops at the
//! first prefix that covers the target plus its own fee, so no smaller
//! prefix of the catalog would do.

use spendfrom_core::{Amount, AmountError, UnspentOutput};
use tracing::debug;

use crate::error::CoinControlError;
use crate::fee::FeeEstimator;

/// Which coins to spend and the fee computed for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionResult {
    /// Chosen coins, in selection order (largest first).
    pub selected: Vec<UnspentOutput>,
    /// Sum of the chosen coins.
    pub total: Amount,
    /// Fee for `selected.len()` inputs.
    pub fee: Amount,
}

impl SelectionResult {
    /// What is left after paying `target` and the fee.
    pub fn residual(&self, target: Amount) -> Result<Amount, AmountError> {
        target
            .checked_add(self.fee)
            .and_then(|need| self.total.checked_sub(need))
            .ok_or(AmountError::Overflow)
    }
}

/// Greedy largest-first selector.
pub struct CoinSelector;

impl CoinSelector {
    /// Select coins from `catalog` covering `target` plus fee.
    ///
    /// `output_count` is the number of outputs the fee is estimated for. The
    /// catalog is only read; on failure it is left exactly as given.
    pub fn select(
        catalog: &[UnspentOutput],
        target: Amount,
        output_count: usize,
        fee: &dyn FeeEstimator,
    ) -> Result<SelectionResult, CoinControlError> {
        let mut order: Vec<&UnspentOutput> = catalog.iter().collect();
        order.sort_by(|a, b| {
            b.amount
                .cmp(&a.amount)
                .then_with(|| a.outpoint.cmp(&b.outpoint))
        });

        let mut selected: Vec<UnspentOutput> = Vec::new();
        let mut total = Amount::ZERO;

        for coin in order {
            selected.push(coin.clone());
            total = total.checked_add(coin.amount).ok_or(AmountError::Overflow)?;

            let fee_now = fee.estimate(selected.len(), output_count)?;
            let need = target.checked_add(fee_now).ok_or(AmountError::Overflow)?;
            debug!(inputs = selected.len(), %total, %need, "selection step");

            if total >= need {
                return Ok(SelectionResult {
                    selected,
                    total,
                    fee: fee_now,
                });
            }
        }

        let fee_all = fee.estimate(selected.len().max(1), output_count)?;
        let need = target.checked_add(fee_all).ok_or(AmountError::Overflow)?;
        Err(CoinControlError::InsufficientFunds { have: total, need })
    }
}
