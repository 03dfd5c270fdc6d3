//! In-memory node for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use spendfrom_core::{Amount, OutPoint, RawTransaction, TxOutput, UnspentOutput};
use spendfrom_rpc::{
    AddressValidation, DecodedOutput, DecodedTransaction, NodeRpc, Prevout, RpcError,
    SignedTransaction, WalletInfo,
};

pub fn utxo(address: &str, txid: &str, vout: u32, amount: u64, confirmations: u32) -> UnspentOutput {
    UnspentOutput {
        outpoint: OutPoint::new(txid, vout),
        address: address.to_string(),
        amount: Amount::from_units(amount),
        confirmations,
        spendable: true,
        script_pub_key: Some(format!("76a914{txid}88ac")),
    }
}

/// What the node's decoder would report for `tx`.
pub fn decode_locally(tx: &RawTransaction) -> DecodedTransaction {
    decoded(
        tx.inputs().iter().map(|i| i.outpoint.clone()).collect(),
        tx.outputs(),
        tx.locktime(),
    )
}

fn decoded(inputs: Vec<OutPoint>, outputs: &[TxOutput], locktime: u32) -> DecodedTransaction {
    DecodedTransaction {
        txid: "00".repeat(32),
        locktime,
        inputs,
        outputs: outputs
            .iter()
            .enumerate()
            .map(|(i, o)| DecodedOutput {
                index: i as u32,
                amount: o.amount,
                addresses: vec![o.address.clone()],
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    IncompleteSignature,
    SignTimeout,
    SignLocked,
    BroadcastRejected,
    BroadcastSpent,
    BroadcastTimeout,
    DecodeDropsChange,
}

#[derive(Default)]
struct State {
    calls: Vec<String>,
    broadcasts: Vec<String>,
    created: HashMap<String, DecodedTransaction>,
    unlocked: bool,
}

#[derive(Default)]
pub struct FakeNode {
    unspent: Vec<UnspentOutput>,
    invalid: Vec<String>,
    passphrase: Option<String>,
    failure: Option<Failure>,
    state: Mutex<State>,
}

impl FakeNode {
    pub fn with_unspent(unspent: Vec<UnspentOutput>) -> Self {
        Self {
            unspent,
            ..Self::default()
        }
    }

    pub fn with_invalid_address(mut self, address: &str) -> Self {
        self.invalid.push(address.to_string());
        self
    }

    pub fn with_locked_wallet(mut self, passphrase: &str) -> Self {
        self.passphrase = Some(passphrase.to_string());
        self
    }

    pub fn failing(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.state.lock().unwrap().broadcasts.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn fails(&self, f: Failure) -> bool {
        self.failure == Some(f)
    }
}

fn timeout(method: &str) -> RpcError {
    RpcError::Timeout {
        method: method.into(),
        timeout_ms: 30_000,
    }
}

#[async_trait]
impl NodeRpc for FakeNode {
    async fn list_unspent(
        &self,
        min_conf: u32,
        _max_conf: u32,
        addresses: &[String],
    ) -> Result<Vec<UnspentOutput>, RpcError> {
        self.record(format!("listunspent {min_conf} {}", addresses.join(",")));
        Ok(self
            .unspent
            .iter()
            .filter(|u| u.confirmations >= min_conf)
            .filter(|u| addresses.is_empty() || addresses.contains(&u.address))
            .cloned()
            .collect())
    }

    async fn create_raw_transaction(
        &self,
        inputs: &[OutPoint],
        outputs: &[TxOutput],
        locktime: u32,
    ) -> Result<String, RpcError> {
        self.record("createrawtransaction".into());
        let mut state = self.state.lock().unwrap();
        let hex = format!("{:08x}", state.created.len() + 1);
        let mut d = decoded(inputs.to_vec(), outputs, locktime);
        if self.fails(Failure::DecodeDropsChange) {
            d.outputs.pop();
        }
        state.created.insert(hex.clone(), d);
        Ok(hex)
    }

    async fn sign_raw_transaction(
        &self,
        hex: &str,
        prevouts: &[Prevout],
    ) -> Result<SignedTransaction, RpcError> {
        self.record(format!("signrawtransaction {}", prevouts.len()));
        if self.fails(Failure::SignTimeout) {
            return Err(timeout("signrawtransaction"));
        }
        if self.fails(Failure::SignLocked) {
            return Err(RpcError::Node {
                method: "signrawtransaction".into(),
                code: -13,
                message: "Please enter the wallet passphrase with walletpassphrase first.".into(),
            });
        }
        Ok(SignedTransaction {
            hex: format!("{hex}ff"),
            complete: !self.fails(Failure::IncompleteSignature),
            errors: Vec::new(),
        })
    }

    async fn send_raw_transaction(&self, hex: &str) -> Result<String, RpcError> {
        self.record("sendrawtransaction".into());
        if self.fails(Failure::BroadcastTimeout) {
            return Err(timeout("sendrawtransaction"));
        }
        if self.fails(Failure::BroadcastRejected) {
            return Err(RpcError::Node {
                method: "sendrawtransaction".into(),
                code: -26,
                message: "min relay fee not met".into(),
            });
        }
        if self.fails(Failure::BroadcastSpent) {
            return Err(RpcError::Node {
                method: "sendrawtransaction".into(),
                code: -25,
                message: "bad-txns-inputs-missingorspent".into(),
            });
        }
        self.state.lock().unwrap().broadcasts.push(hex.to_string());
        Ok(format!("{:0>64}", hex))
    }

    async fn decode_raw_transaction(&self, hex: &str) -> Result<DecodedTransaction, RpcError> {
        self.record("decoderawtransaction".into());
        self.state
            .lock()
            .unwrap()
            .created
            .get(hex)
            .cloned()
            .ok_or_else(|| RpcError::Node {
                method: "decoderawtransaction".into(),
                code: -22,
                message: "TX decode failed".into(),
            })
    }

    async fn validate_address(&self, address: &str) -> Result<AddressValidation, RpcError> {
        self.record(format!("validateaddress {address}"));
        Ok(AddressValidation {
            is_valid: !self.invalid.iter().any(|a| a == address),
            address: Some(address.to_string()),
            is_mine: None,
        })
    }

    async fn wallet_info(&self) -> Result<WalletInfo, RpcError> {
        self.record("getwalletinfo".into());
        let unlocked = self.state.lock().unwrap().unlocked;
        Ok(WalletInfo {
            unlocked_until: self
                .passphrase
                .as_ref()
                .map(|_| if unlocked { u64::MAX } else { 0 }),
        })
    }

    async fn wallet_passphrase(&self, passphrase: &str, timeout_secs: u64) -> Result<(), RpcError> {
        self.record(format!("walletpassphrase {timeout_secs}"));
        if self.passphrase.as_deref() != Some(passphrase) {
            return Err(RpcError::Node {
                method: "walletpassphrase".into(),
                code: -14,
                message: "Error: The wallet passphrase entered was incorrect.".into(),
            });
        }
        self.state.lock().unwrap().unlocked = true;
        Ok(())
    }
}
