//! Signing and broadcast through the node.
//!
//! Each run moves through `Built -> SignRequested -> Signed` and, when
//! broadcasting, `Signed -> BroadcastRequested -> Broadcast`. Nothing is
//! retried: a failed or timed-out call ends the run, and once signing has
//! succeeded every later error carries the signed hex.

use std::fmt;

use spendfrom_core::RawTransaction;
use spendfrom_rpc::error::{
    RPC_VERIFY_ALREADY_IN_CHAIN, RPC_VERIFY_ERROR, RPC_VERIFY_REJECTED, RPC_WALLET_UNLOCK_NEEDED,
};
use spendfrom_rpc::{NodeRpc, Prevout, RpcError};
use tracing::{info, warn};

use crate::error::{CoinControlError, Stage};

/// What to do with a built transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitMode {
    /// Emit the unsigned hex for offline signing.
    Unsigned,
    /// Sign and emit the signed hex without broadcasting.
    #[default]
    Sign,
    /// Sign and broadcast.
    Broadcast,
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Built,
    SignRequested,
    Signed,
    SignFailed,
    BroadcastRequested,
    Broadcast,
    BroadcastFailed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Terminal output of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Unsigned { hex: String },
    Signed { hex: String },
    Broadcast { txid: String, hex: String },
}

impl Submission {
    /// The line printed to stdout.
    pub fn output(&self) -> &str {
        match self {
            Self::Unsigned { hex } | Self::Signed { hex } => hex,
            Self::Broadcast { txid, .. } => txid,
        }
    }
}

/// Drives one transaction through signing and broadcast.
pub struct Coordinator<'a> {
    node: &'a dyn NodeRpc,
    phase: Phase,
}

impl<'a> Coordinator<'a> {
    pub fn new(node: &'a dyn NodeRpc) -> Self {
        Self {
            node,
            phase: Phase::Built,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        info!(from = %self.phase, to = %phase, "phase");
        self.phase = phase;
    }

    /// Submit `tx`, encoded as `unsigned_hex`, according to `mode`.
    pub async fn submit(
        &mut self,
        tx: &RawTransaction,
        unsigned_hex: &str,
        mode: SubmitMode,
    ) -> Result<Submission, CoinControlError> {
        if mode == SubmitMode::Unsigned {
            return Ok(Submission::Unsigned {
                hex: unsigned_hex.to_string(),
            });
        }

        let signed_hex = self.sign(tx, unsigned_hex).await?;
        if mode == SubmitMode::Sign {
            return Ok(Submission::Signed { hex: signed_hex });
        }

        let txid = self.broadcast(&signed_hex).await?;
        Ok(Submission::Broadcast {
            txid,
            hex: signed_hex,
        })
    }

    async fn sign(&mut self, tx: &RawTransaction, unsigned_hex: &str) -> Result<String, CoinControlError> {
        let prevouts: Vec<Prevout> = tx.inputs().iter().filter_map(Prevout::from_input).collect();
        self.enter(Phase::SignRequested);

        let signed = match self.node.sign_raw_transaction(unsigned_hex, &prevouts).await {
            Ok(signed) => signed,
            Err(e) => {
                self.enter(Phase::SignFailed);
                return Err(sign_error(e));
            }
        };
        if !signed.complete {
            self.enter(Phase::SignFailed);
            return Err(CoinControlError::SignFailed {
                reason: signed.error_summary(),
            });
        }
        self.enter(Phase::Signed);
        Ok(signed.hex)
    }

    async fn broadcast(&mut self, signed_hex: &str) -> Result<String, CoinControlError> {
        self.enter(Phase::BroadcastRequested);
        match self.node.send_raw_transaction(signed_hex).await {
            Ok(txid) => {
                self.enter(Phase::Broadcast);
                info!(%txid, "transaction broadcast");
                Ok(txid)
            }
            Err(e) => {
                self.enter(Phase::BroadcastFailed);
                warn!(error = %e, "broadcast failed; signed transaction kept for resubmission");
                Err(broadcast_error(e, signed_hex))
            }
        }
    }
}

fn sign_error(e: RpcError) -> CoinControlError {
    match e {
        RpcError::Timeout { .. } => CoinControlError::Indeterminate {
            stage: Stage::Sign,
            reason: e.to_string(),
            signed_hex: None,
        },
        RpcError::Node { code: RPC_WALLET_UNLOCK_NEEDED, .. } => CoinControlError::SignFailed {
            reason: format!("wallet is locked: {}", e.node_message().unwrap_or_default()),
        },
        RpcError::Node { .. } | RpcError::Malformed { .. } | RpcError::Http { .. } => {
            CoinControlError::SignFailed {
                reason: e.to_string(),
            }
        }
        other => CoinControlError::from_rpc(Stage::Sign, other),
    }
}

fn broadcast_error(e: RpcError, signed_hex: &str) -> CoinControlError {
    match e {
        RpcError::Timeout { .. } | RpcError::Malformed { .. } => CoinControlError::Indeterminate {
            stage: Stage::Broadcast,
            reason: e.to_string(),
            signed_hex: Some(signed_hex.to_string()),
        },
        RpcError::Authentication { .. } => CoinControlError::from_rpc(Stage::Broadcast, e),
        RpcError::Node { code, .. } => {
            let message = e.node_message().unwrap_or_default();
            let reason = match code {
                RPC_VERIFY_ERROR | RPC_VERIFY_ALREADY_IN_CHAIN => {
                    format!("inputs already spent or transaction already confirmed: {message}")
                }
                RPC_VERIFY_REJECTED => format!("rejected by node: {message}"),
                _ => e.to_string(),
            };
            CoinControlError::BroadcastFailed {
                reason,
                signed_hex: signed_hex.to_string(),
            }
        }
        other => CoinControlError::BroadcastFailed {
            reason: other.to_string(),
            signed_hex: signed_hex.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeNode, Failure};
    use spendfrom_core::{Amount, OutPoint, TxInput, TxOutput};

    fn tx() -> RawTransaction {
        RawTransaction::new(
            vec![TxInput {
                outpoint: OutPoint::new("ab", 0),
                amount: Amount::from_units(5_000_000),
                address: "mA".into(),
                script_pub_key: Some("76a914".into()),
            }],
            vec![TxOutput {
                address: "mX".into(),
                amount: Amount::from_units(4_900_000),
            }],
            None,
            0,
            Amount::from_units(100_000),
        )
    }

    #[tokio::test]
    async fn unsigned_mode_makes_no_calls() {
        let node = FakeNode::default();
        let mut c = Coordinator::new(&node);
        let s = c.submit(&tx(), "0100", SubmitMode::Unsigned).await.unwrap();
        assert_eq!(s, Submission::Unsigned { hex: "0100".into() });
        assert!(node.calls().is_empty());
        assert_eq!(c.phase(), Phase::Built);
    }

    #[tokio::test]
    async fn sign_mode_passes_prevouts_and_stops() {
        let node = FakeNode::default();
        let mut c = Coordinator::new(&node);
        let s = c.submit(&tx(), "0100", SubmitMode::Sign).await.unwrap();
        assert_eq!(s.output(), "0100ff");
        assert_eq!(c.phase(), Phase::Signed);
        assert_eq!(node.calls(), vec!["signrawtransaction 1".to_string()]);
    }

    #[tokio::test]
    async fn broadcast_returns_txid() {
        let node = FakeNode::default();
        let mut c = Coordinator::new(&node);
        let s = c.submit(&tx(), "0100", SubmitMode::Broadcast).await.unwrap();
        assert!(matches!(s, Submission::Broadcast { .. }));
        assert_eq!(c.phase(), Phase::Broadcast);
        assert_eq!(node.broadcasts(), vec!["0100ff".to_string()]);
    }

    #[tokio::test]
    async fn incomplete_signature_is_sign_failure() {
        let node = FakeNode::default().failing(Failure::IncompleteSignature);
        let mut c = Coordinator::new(&node);
        let err = c.submit(&tx(), "0100", SubmitMode::Broadcast).await.unwrap_err();
        assert!(matches!(err, CoinControlError::SignFailed { .. }));
        assert_eq!(c.phase(), Phase::SignFailed);
        assert!(node.broadcasts().is_empty());
    }

    #[tokio::test]
    async fn rejected_broadcast_keeps_signed_hex() {
        let node = FakeNode::default().failing(Failure::BroadcastRejected);
        let mut c = Coordinator::new(&node);
        let err = c.submit(&tx(), "0100", SubmitMode::Broadcast).await.unwrap_err();
        assert_eq!(err.signed_hex(), Some("0100ff"));
        assert!(matches!(err, CoinControlError::BroadcastFailed { .. }));
        assert_eq!(c.phase(), Phase::BroadcastFailed);
    }

    #[tokio::test]
    async fn spent_inputs_are_reported_as_a_double_spend() {
        let node = FakeNode::default().failing(Failure::BroadcastSpent);
        let mut c = Coordinator::new(&node);
        let err = c.submit(&tx(), "0100", SubmitMode::Broadcast).await.unwrap_err();
        let CoinControlError::BroadcastFailed { reason, signed_hex } = err else {
            panic!("expected broadcast failure");
        };
        assert!(reason.starts_with("inputs already spent"));
        assert!(reason.contains("bad-txns-inputs-missingorspent"));
        assert_eq!(signed_hex, "0100ff");
    }

    #[tokio::test]
    async fn policy_rejection_names_the_node_reason() {
        let node = FakeNode::default().failing(Failure::BroadcastRejected);
        let mut c = Coordinator::new(&node);
        let err = c.submit(&tx(), "0100", SubmitMode::Broadcast).await.unwrap_err();
        assert_eq!(err.to_string(), "broadcast failed: rejected by node: min relay fee not met");
    }

    #[tokio::test]
    async fn locked_wallet_during_signing_is_sign_failure() {
        let node = FakeNode::default().failing(Failure::SignLocked);
        let mut c = Coordinator::new(&node);
        let err = c.submit(&tx(), "0100", SubmitMode::Sign).await.unwrap_err();
        match err {
            CoinControlError::SignFailed { reason } => assert!(reason.starts_with("wallet is locked")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(c.phase(), Phase::SignFailed);
    }

    #[tokio::test]
    async fn broadcast_timeout_is_indeterminate() {
        let node = FakeNode::default().failing(Failure::BroadcastTimeout);
        let mut c = Coordinator::new(&node);
        let err = c.submit(&tx(), "0100", SubmitMode::Broadcast).await.unwrap_err();
        assert!(matches!(
            err,
            CoinControlError::Indeterminate { stage: Stage::Broadcast, .. }
        ));
        assert_eq!(err.signed_hex(), Some("0100ff"));
    }

    #[tokio::test]
    async fn sign_timeout_is_indeterminate_without_hex() {
        let node = FakeNode::default().failing(Failure::SignTimeout);
        let mut c = Coordinator::new(&node);
        let err = c.submit(&tx(), "0100", SubmitMode::Sign).await.unwrap_err();
        assert!(matches!(err, CoinControlError::Indeterminate { stage: Stage::Sign, .. }));
        assert_eq!(err.signed_hex(), None);
    }
}
