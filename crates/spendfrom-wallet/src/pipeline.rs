//! One spend run, stage by stage.

use spendfrom_core::{OutPoint, Policy, RawTransaction, SpendRequest};
use spendfrom_rpc::NodeRpc;
use tracing::info;

use crate::builder::TransactionBuilder;
use crate::catalog::{self, AddressBalance};
use crate::coin_selection::{CoinSelector, SelectionResult};
use crate::coordinator::{Coordinator, SubmitMode, Submission};
use crate::error::{CoinControlError, Stage};
use crate::fee::estimator_for;
use crate::unlock::ensure_unlocked;
use crate::validation::{check_fee, validate_addresses, verify_round_trip};

/// A verified, unsigned transaction ready to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub selection: SelectionResult,
    pub transaction: RawTransaction,
    pub unsigned_hex: String,
}

/// Coin control against one node with one policy.
pub struct CoinControl<'a> {
    node: &'a dyn NodeRpc,
    policy: Policy,
}

impl<'a> CoinControl<'a> {
    pub fn new(node: &'a dyn NodeRpc, policy: Policy) -> Self {
        Self { node, policy }
    }

    /// Validate, select, build, encode and verify. Nothing is signed.
    pub async fn prepare(&self, request: &SpendRequest) -> Result<Plan, CoinControlError> {
        validate_addresses(self.node, request).await?;

        let catalog =
            catalog::list_spendable(self.node, request.sources(), request.min_confirmations())
                .await?;

        let target = request.total_requested();
        let fee = estimator_for(request.fee(), &self.policy);
        // One extra output for change, which may not survive the dust check.
        let selection = CoinSelector::select(
            &catalog,
            target,
            request.destinations().len() + 1,
            &*fee,
        )?;
        info!(
            inputs = selection.selected.len(),
            total = %selection.total,
            fee = %selection.fee,
            "coins selected"
        );

        let transaction = TransactionBuilder::from_policy(&self.policy).build(
            &selection,
            request.destinations(),
            request.change_address(),
        )?;

        let outpoints: Vec<OutPoint> = transaction
            .inputs()
            .iter()
            .map(|i| i.outpoint.clone())
            .collect();
        let unsigned_hex = self
            .node
            .create_raw_transaction(&outpoints, transaction.outputs(), transaction.locktime())
            .await
            .map_err(|e| CoinControlError::from_rpc(Stage::Encode, e))?;

        let decoded = self
            .node
            .decode_raw_transaction(&unsigned_hex)
            .await
            .map_err(|e| CoinControlError::from_rpc(Stage::Verify, e))?;
        verify_round_trip(&transaction, &decoded)?;
        check_fee(&transaction, unsigned_hex.len(), &self.policy)?;
        info!(txid = %decoded.txid, fee = %transaction.fee(), "transaction built");

        Ok(Plan {
            selection,
            transaction,
            unsigned_hex,
        })
    }

    /// Unlock the wallet if it is locked. See [`ensure_unlocked`].
    pub async fn unlock<F>(&self, now_secs: u64, passphrase: F) -> Result<bool, CoinControlError>
    where
        F: FnOnce() -> Option<String>,
    {
        ensure_unlocked(self.node, now_secs, passphrase).await
    }

    /// Sign and optionally broadcast a prepared plan.
    pub async fn submit(&self, plan: &Plan, mode: SubmitMode) -> Result<Submission, CoinControlError> {
        Coordinator::new(self.node)
            .submit(&plan.transaction, &plan.unsigned_hex, mode)
            .await
    }

    /// Full run: prepare, unlock when signing, submit.
    pub async fn spend<F>(
        &self,
        request: &SpendRequest,
        mode: SubmitMode,
        now_secs: u64,
        passphrase: F,
    ) -> Result<Submission, CoinControlError>
    where
        F: FnOnce() -> Option<String>,
    {
        let plan = self.prepare(request).await?;
        if mode != SubmitMode::Unsigned {
            self.unlock(now_secs, passphrase).await?;
        }
        self.submit(&plan, mode).await
    }

    /// Per-address balances of `addresses`, or of the whole wallet.
    pub async fn balances(&self, addresses: &[String]) -> Result<Vec<AddressBalance>, CoinControlError> {
        catalog::list_balances(self.node, addresses, self.policy.min_confirmations).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Failure, FakeNode, utxo};
    use spendfrom_core::{Amount, Destination, FeePolicy};

    fn request(to: u64, fee: u64) -> SpendRequest {
        SpendRequest::new(
            vec!["mA".into()],
            vec![Destination {
                address: "mX".into(),
                amount: Amount::from_units(to),
            }],
            FeePolicy::Fixed(Amount::from_units(fee)),
            1,
            None,
        )
        .unwrap()
    }

    fn funded() -> FakeNode {
        FakeNode::with_unspent(vec![
            utxo("mA", "01", 0, 5_000_000, 6),
            utxo("mA", "02", 0, 3_000_000, 6),
            utxo("mB", "03", 0, 9_000_000, 6),
        ])
    }

    #[tokio::test]
    async fn prepare_builds_verified_plan() {
        let node = funded();
        let cc = CoinControl::new(&node, Policy::default());
        let plan = cc.prepare(&request(4_000_000, 100_000)).await.unwrap();
        assert_eq!(plan.transaction.inputs().len(), 1);
        assert_eq!(
            plan.transaction.change().map(|c| c.amount),
            Some(Amount::from_units(900_000))
        );
        assert_eq!(
            node.calls(),
            vec![
                "validateaddress mA",
                "validateaddress mX",
                "listunspent 1 mA",
                "createrawtransaction",
                "decoderawtransaction",
            ]
        );
    }

    #[tokio::test]
    async fn decoder_disagreement_stops_before_signing() {
        let node = funded().failing(Failure::DecodeDropsChange);
        let cc = CoinControl::new(&node, Policy::default());
        let err = cc
            .spend(&request(4_000_000, 100_000), SubmitMode::Broadcast, 0, || None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoinControlError::RoundTripMismatch(_)));
        assert!(!node.calls().iter().any(|c| c.starts_with("sign")));
    }

    #[tokio::test]
    async fn excessive_fee_rejected() {
        let node = funded();
        let cc = CoinControl::new(&node, Policy::default());
        let err = cc.prepare(&request(1_000_000, 2_000_000)).await.unwrap_err();
        assert!(matches!(err, CoinControlError::FeeRejected(_)));
    }

    #[tokio::test]
    async fn spend_unlocks_then_broadcasts() {
        let node = funded().with_locked_wallet("pw");
        let cc = CoinControl::new(&node, Policy::default());
        let s = cc
            .spend(&request(4_000_000, 100_000), SubmitMode::Broadcast, 10, || {
                Some("pw".into())
            })
            .await
            .unwrap();
        assert!(matches!(s, Submission::Broadcast { .. }));
        let calls = node.calls();
        let unlock = calls.iter().position(|c| c == "walletpassphrase 5").unwrap();
        let sign = calls.iter().position(|c| c.starts_with("signraw")).unwrap();
        assert!(unlock < sign);
    }

    #[tokio::test]
    async fn unsigned_mode_skips_wallet() {
        let node = funded().with_locked_wallet("pw");
        let cc = CoinControl::new(&node, Policy::default());
        let s = cc
            .spend(&request(4_000_000, 100_000), SubmitMode::Unsigned, 10, || None)
            .await
            .unwrap();
        assert!(matches!(s, Submission::Unsigned { .. }));
        assert!(!node.calls().iter().any(|c| c == "getwalletinfo"));
    }

    #[tokio::test]
    async fn balances_of_selected_addresses() {
        let node = funded();
        let cc = CoinControl::new(&node, Policy::default());
        let b = cc.balances(&["mA".to_string()]).await.unwrap();
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].total, Amount::from_units(8_000_000));
        assert_eq!(b[0].outputs, 2);
    }
}
