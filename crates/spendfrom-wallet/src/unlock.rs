//! Unlocking an encrypted node wallet before signing.

use spendfrom_core::constants::WALLET_UNLOCK_SECS;
use spendfrom_rpc::{NodeRpc, RpcError};
use tracing::{debug, info, warn};

use crate::error::{CoinControlError, Stage};

/// JSON-RPC "method not found".
const RPC_METHOD_NOT_FOUND: i64 = -32601;

/// Make sure the wallet can sign for the next few seconds.
///
/// `passphrase` is only called when the wallet is encrypted and locked; it
/// returns `None` if the user declines. Returns whether an unlock was
/// performed.
pub async fn ensure_unlocked<F>(
    node: &dyn NodeRpc,
    now_secs: u64,
    passphrase: F,
) -> Result<bool, CoinControlError>
where
    F: FnOnce() -> Option<String>,
{
    let info = match node.wallet_info().await {
        Ok(info) => info,
        Err(RpcError::Node { code, .. }) if code == RPC_METHOD_NOT_FOUND => {
            warn!("node has no getwalletinfo, assuming an unencrypted wallet");
            return Ok(false);
        }
        Err(e) => return Err(CoinControlError::from_rpc(Stage::Unlock, e)),
    };

    if !info.is_encrypted() {
        debug!("wallet is not encrypted");
        return Ok(false);
    }
    if !info.needs_unlock(now_secs) {
        debug!(until = ?info.unlocked_until, "wallet already unlocked");
        return Ok(false);
    }

    let Some(secret) = passphrase() else {
        return Err(CoinControlError::SignFailed {
            reason: "wallet is locked and no passphrase was given".into(),
        });
    };

    match node.wallet_passphrase(&secret, WALLET_UNLOCK_SECS).await {
        Ok(()) => {
            info!(seconds = WALLET_UNLOCK_SECS, "wallet unlocked");
            Ok(true)
        }
        Err(e @ RpcError::Node { .. }) => Err(CoinControlError::SignFailed {
            reason: e.to_string(),
        }),
        Err(e) => Err(CoinControlError::from_rpc(Stage::Unlock, e)),
    }
}
