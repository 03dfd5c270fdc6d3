//! Checks run against the node before anything is signed.

use spendfrom_core::constants::{LARGE_TX_BYTES, SMALL_INPUT_TOTAL};
use spendfrom_core::policy::estimate_tx_size;
use spendfrom_core::{Amount, Policy, RawTransaction, SpendRequest};
use spendfrom_rpc::{DecodedTransaction, NodeRpc};
use tracing::{debug, warn};

use crate::error::{CoinControlError, Stage};

/// Ask the node to validate every address the request touches.
pub async fn validate_addresses(
    node: &dyn NodeRpc,
    request: &SpendRequest,
) -> Result<(), CoinControlError> {
    let mut addresses: Vec<&str> = request.sources().iter().map(String::as_str).collect();
    addresses.extend(request.destinations().iter().map(|d| d.address.as_str()));
    addresses.push(request.change_address());

    let mut checked: Vec<&str> = Vec::with_capacity(addresses.len());
    for address in addresses {
        if checked.contains(&address) {
            continue;
        }
        let v = node
            .validate_address(address)
            .await
            .map_err(|e| CoinControlError::from_rpc(Stage::ValidateAddresses, e))?;
        if !v.is_valid {
            return Err(CoinControlError::InvalidAddress {
                address: Some(address.to_string()),
                reason: "rejected by node".into(),
            });
        }
        if request.is_source(address) && v.is_mine == Some(false) {
            warn!(address, "source address is not in the node wallet; signing will fail");
        }
        checked.push(address);
    }
    debug!(count = checked.len(), "addresses valid");
    Ok(())
}

/// Compare the node's decoding with what was built.
pub fn verify_round_trip(
    built: &RawTransaction,
    decoded: &DecodedTransaction,
) -> Result<(), CoinControlError> {
    let inputs: Vec<_> = built.inputs().iter().map(|i| &i.outpoint).collect();
    let decoded_inputs: Vec<_> = decoded.inputs.iter().collect();
    if inputs != decoded_inputs {
        return Err(CoinControlError::RoundTripMismatch(format!(
            "inputs differ: built {}, decoded {}",
            inputs.len(),
            decoded_inputs.len()
        )));
    }

    if built.outputs().len() != decoded.outputs.len() {
        return Err(CoinControlError::RoundTripMismatch(format!(
            "built {} outputs, decoded {}",
            built.outputs().len(),
            decoded.outputs.len()
        )));
    }
    for (i, (out, dec)) in built.outputs().iter().zip(&decoded.outputs).enumerate() {
        if dec.index as usize != i {
            return Err(CoinControlError::RoundTripMismatch(format!(
                "output {i} decoded at position {}",
                dec.index
            )));
        }
        if out.amount != dec.amount {
            return Err(CoinControlError::RoundTripMismatch(format!(
                "output {i}: built {}, decoded {}",
                out.amount, dec.amount
            )));
        }
        if dec.addresses.len() != 1 || dec.addresses[0] != out.address {
            return Err(CoinControlError::RoundTripMismatch(format!(
                "output {i}: built for {}, decoded for [{}]",
                out.address,
                dec.addresses.join(", ")
            )));
        }
    }

    if built.locktime() != decoded.locktime {
        return Err(CoinControlError::RoundTripMismatch(format!(
            "locktime: built {}, decoded {}",
            built.locktime(),
            decoded.locktime
        )));
    }
    Ok(())
}

/// Reject fees that are obviously wrong.
///
/// `hex_len` is the length of the encoded transaction; the size used is the
/// larger of the encoded size and the estimate, since signatures are not
/// yet present.
pub fn check_fee(
    tx: &RawTransaction,
    hex_len: usize,
    policy: &Policy,
) -> Result<(), CoinControlError> {
    let fee = tx.fee();
    if fee > policy.max_fee {
        return Err(CoinControlError::FeeRejected(format!(
            "fee {fee} exceeds maximum {}",
            policy.max_fee
        )));
    }

    let size = estimate_tx_size(tx.inputs().len(), tx.outputs().len()).max(hex_len as u64 / 2);
    if size > LARGE_TX_BYTES && fee < policy.fee_per_kb {
        return Err(CoinControlError::FeeRejected(format!(
            "fee {fee} too low for a {size} byte transaction (minimum {})",
            policy.fee_per_kb
        )));
    }

    let total_in = tx.total_in()?;
    if total_in < Amount::from_units(SMALL_INPUT_TOTAL) && fee < policy.fee_per_kb {
        return Err(CoinControlError::FeeRejected(format!(
            "fee {fee} too low for a transaction spending only {total_in} (minimum {})",
            policy.fee_per_kb
        )));
    }
    Ok(())
}
