//! Assembles a selection and the requested payments into an unsigned
//! transaction, adding a change output when the residual is worth keeping.

use spendfrom_core::{
    Amount, AmountError, Destination, Policy, RawTransaction, TxInput, TxOutput,
};
use tracing::{debug, warn};

use crate::coin_selection::SelectionResult;
use crate::error::CoinControlError;

/// Builds [`RawTransaction`]s from a [`SelectionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionBuilder {
    dust_threshold: Amount,
    locktime: u32,
}

impl TransactionBuilder {
    pub fn new(dust_threshold: Amount) -> Self {
        Self {
            dust_threshold,
            locktime: 0,
        }
    }

    pub fn from_policy(policy: &Policy) -> Self {
        Self::new(policy.dust_threshold)
    }

    pub fn with_locktime(mut self, locktime: u32) -> Self {
        self.locktime = locktime;
        self
    }

    /// Build the transaction.
    ///
    /// Inputs keep selection order; outputs are the destinations in caller
    /// order followed by change, if any. Change below the dust threshold is
    /// not created and its value goes to the fee instead. Change for an
    /// address that is also a destination is added to that payment.
    pub fn build(
        &self,
        selection: &SelectionResult,
        destinations: &[Destination],
        change_address: &str,
    ) -> Result<RawTransaction, CoinControlError> {
        let requested = Amount::checked_sum(destinations.iter().map(|d| d.amount))?;
        let residual = selection.residual(requested).map_err(|_| {
            CoinControlError::AmountOverflow(format!(
                "selected {} does not cover {} plus fee {}",
                selection.total, requested, selection.fee
            ))
        })?;

        let inputs: Vec<TxInput> = selection
            .selected
            .iter()
            .map(|u| TxInput {
                outpoint: u.outpoint.clone(),
                amount: u.amount,
                address: u.address.clone(),
                script_pub_key: u.script_pub_key.clone(),
            })
            .collect();

        let mut outputs: Vec<TxOutput> = destinations
            .iter()
            .map(|d| TxOutput {
                address: d.address.clone(),
                amount: d.amount,
            })
            .collect();

        let keep_change = residual > Amount::ZERO && residual >= self.dust_threshold;
        let paid_index = outputs.iter().position(|o| o.address == change_address);
        let (change_index, fee) = match paid_index {
            Some(i) if keep_change => {
                // Change address is also paid: one output carries both.
                let merged = &mut outputs[i];
                merged.amount = merged
                    .amount
                    .checked_add(residual)
                    .ok_or(AmountError::Overflow)?;
                debug!(change = %residual, address = change_address, "change merged into payment");
                (Some(i), selection.fee)
            }
            None if keep_change => {
                outputs.push(TxOutput {
                    address: change_address.to_string(),
                    amount: residual,
                });
                debug!(change = %residual, address = change_address, "change output added");
                (Some(outputs.len() - 1), selection.fee)
            }
            _ => {
                if residual > Amount::ZERO {
                    warn!(
                        residual = %residual,
                        dust_threshold = %self.dust_threshold,
                        "change below dust threshold, adding it to the fee"
                    );
                }
                let fee = selection
                    .fee
                    .checked_add(residual)
                    .ok_or(AmountError::Overflow)?;
                (None, fee)
            }
        };

        let tx = RawTransaction::new(inputs, outputs, change_index, self.locktime, fee);
        if !tx.is_balanced() {
            return Err(CoinControlError::AmountOverflow(
                "inputs do not equal outputs plus fee".into(),
            ));
        }
        Ok(tx)
    }
}
