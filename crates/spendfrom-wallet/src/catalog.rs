//! The selectable coin pool: unspent outputs of the source addresses.

use std::collections::HashSet;

use spendfrom_core::constants::LISTUNSPENT_MAX_CONFIRMATIONS;
use spendfrom_core::{Amount, AmountError, UnspentOutput};
use spendfrom_rpc::NodeRpc;
use tracing::{debug, info};

use crate::error::{CoinControlError, Stage};

/// Fetch the spendable outputs of `addresses` with at least
/// `min_confirmations` confirmations, largest first.
///
/// The node is asked to filter by address, but the result is filtered again
/// locally so a node ignoring the filter cannot leak foreign coins into the
/// pool.
pub async fn list_spendable(
    node: &dyn NodeRpc,
    addresses: &[String],
    min_confirmations: u32,
) -> Result<Vec<UnspentOutput>, CoinControlError> {
    let unspent = node
        .list_unspent(min_confirmations, LISTUNSPENT_MAX_CONFIRMATIONS, addresses)
        .await
        .map_err(|e| CoinControlError::from_rpc(Stage::Catalog, e))?;
    let fetched = unspent.len();

    let catalog = filter_spendable(unspent, addresses, min_confirmations);
    debug!(fetched, kept = catalog.len(), "filtered unspent outputs");

    if catalog.is_empty() {
        return Err(CoinControlError::NoSpendableCoins {
            addresses: addresses.to_vec(),
            min_confirmations,
        });
    }
    info!(coins = catalog.len(), min_confirmations, "catalog ready");
    Ok(catalog)
}

/// Keep outputs owned by `addresses`, confirmed at least `min_confirmations`
/// times and spendable. Duplicate outpoints are dropped. The result is
/// ordered by amount descending, then txid, then output index.
pub fn filter_spendable(
    unspent: Vec<UnspentOutput>,
    addresses: &[String],
    min_confirmations: u32,
) -> Vec<UnspentOutput> {
    let mut seen = HashSet::new();
    let mut out: Vec<UnspentOutput> = unspent
        .into_iter()
        .filter(|u| {
            u.spendable
                && u.confirmations >= min_confirmations
                && addresses.iter().any(|a| *a == u.address)
        })
        .filter(|u| seen.insert(u.outpoint.clone()))
        .collect();
    out.sort_by(|a, b| {
        b.amount
            .cmp(&a.amount)
            .then_with(|| a.outpoint.cmp(&b.outpoint))
    });
    out
}

/// Per-address summary for balance listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressBalance {
    pub address: String,
    pub total: Amount,
    pub outputs: usize,
}

/// Group outputs by address, in order of first appearance.
pub fn summarize_by_address(
    unspent: &[UnspentOutput],
) -> Result<Vec<AddressBalance>, AmountError> {
    let mut balances: Vec<AddressBalance> = Vec::new();
    for u in unspent {
        match balances.iter_mut().find(|b| b.address == u.address) {
            Some(b) => {
                b.total = b.total.checked_add(u.amount).ok_or(AmountError::Overflow)?;
                b.outputs += 1;
            }
            None => balances.push(AddressBalance {
                address: u.address.clone(),
                total: u.amount,
                outputs: 1,
            }),
        }
    }
    Ok(balances)
}

/// Balances of `addresses`, or of every wallet address when empty.
///
/// Unlike [`list_spendable`], an empty result is not an error.
pub async fn list_balances(
    node: &dyn NodeRpc,
    addresses: &[String],
    min_confirmations: u32,
) -> Result<Vec<AddressBalance>, CoinControlError> {
    let unspent = node
        .list_unspent(min_confirmations, LISTUNSPENT_MAX_CONFIRMATIONS, addresses)
        .await
        .map_err(|e| CoinControlError::from_rpc(Stage::Catalog, e))?;
    let kept: Vec<UnspentOutput> = if addresses.is_empty() {
        unspent
            .into_iter()
            .filter(|u| u.spendable && u.confirmations >= min_confirmations)
            .collect()
    } else {
        filter_spendable(unspent, addresses, min_confirmations)
    };
    Ok(summarize_by_address(&kept)?)
}
