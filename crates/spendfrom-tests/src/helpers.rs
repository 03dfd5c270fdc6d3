//! Shared test helpers: an in-memory wallet node and request builders.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spendfrom_core::{
    Amount, Destination, FeePolicy, OutPoint, SpendRequest, TxOutput, UnspentOutput,
};
use spendfrom_rpc::types::SignInputError;
use spendfrom_rpc::{
    AddressValidation, DecodedOutput, DecodedTransaction, NodeRpc, Prevout, RpcError,
    SignedTransaction, WalletInfo,
};

/// Appended to unsigned hex to mark it signed.
pub const SIGNATURE_MARKER: &str = "5151";

/// One coin = 10^8 units.
pub fn coins(n: u64) -> Amount {
    Amount::from_units(n * 100_000_000)
}

pub fn units(n: u64) -> Amount {
    Amount::from_units(n)
}

pub fn dest(address: &str, amount: Amount) -> Destination {
    Destination {
        address: address.to_string(),
        amount,
    }
}

/// Request spending from `sources` with a fixed fee and one confirmation.
pub fn request(sources: &[&str], to: Vec<Destination>, fee: Amount) -> SpendRequest {
    SpendRequest::new(
        sources.iter().map(|s| s.to_string()).collect(),
        to,
        FeePolicy::Fixed(fee),
        1,
        None,
    )
    .expect("valid request")
}

pub fn script_for(address: &str) -> String {
    format!("76a914{}88ac", hex::encode(address))
}

/// What `createrawtransaction` encodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct WireTx {
    inputs: Vec<(String, u32)>,
    outputs: Vec<(String, u64)>,
    locktime: u32,
}

impl WireTx {
    fn encode(&self) -> String {
        hex::encode(serde_json::to_vec(self).expect("serializable"))
    }

    fn decode(method: &str, hex_str: &str) -> Result<Self, RpcError> {
        let bytes = hex::decode(hex_str).map_err(|_| decode_failed(method))?;
        serde_json::from_slice(&bytes).map_err(|_| decode_failed(method))
    }

    fn txid(&self) -> String {
        let digest = self
            .encode()
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
                (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
            });
        format!("{digest:016x}").repeat(4)
    }
}

fn decode_failed(method: &str) -> RpcError {
    RpcError::Node {
        method: method.to_string(),
        code: -22,
        message: "TX decode failed".into(),
    }
}

#[derive(Default)]
struct State {
    utxos: BTreeMap<OutPoint, UnspentOutput>,
    spent: BTreeMap<OutPoint, UnspentOutput>,
    next_txid: u64,
    unlocked: bool,
    calls: Vec<String>,
    broadcasts: Vec<String>,
    failures: HashMap<&'static str, RpcError>,
}

/// An in-memory wallet node.
///
/// Every address that received a coin through [`MemoryNode::with_coin`] is
/// owned by the wallet unless marked foreign. Broadcasts spend their inputs
/// and add their outputs as unconfirmed coins.
#[derive(Default)]
pub struct MemoryNode {
    foreign: Vec<String>,
    invalid: Vec<String>,
    passphrase: Option<String>,
    state: Mutex<State>,
}

impl MemoryNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a coin paying `address`.
    pub fn with_coin(self, address: &str, amount: Amount, confirmations: u32) -> Self {
        self.add_coin(address, amount, confirmations);
        self
    }

    pub fn with_foreign_address(mut self, address: &str) -> Self {
        self.foreign.push(address.to_string());
        self
    }

    pub fn with_invalid_address(mut self, address: &str) -> Self {
        self.invalid.push(address.to_string());
        self
    }

    pub fn with_locked_wallet(mut self, passphrase: &str) -> Self {
        self.passphrase = Some(passphrase.to_string());
        self
    }

    /// Make every call to `method` fail with `error`.
    pub fn failing(self, method: &'static str, error: RpcError) -> Self {
        self.state().failures.insert(method, error);
        self
    }

    pub fn add_coin(&self, address: &str, amount: Amount, confirmations: u32) -> OutPoint {
        let mut state = self.state();
        state.next_txid += 1;
        let outpoint = OutPoint::new(format!("{:064x}", state.next_txid), 0);
        state.utxos.insert(
            outpoint.clone(),
            UnspentOutput {
                outpoint: outpoint.clone(),
                address: address.to_string(),
                amount,
                confirmations,
                spendable: true,
                script_pub_key: Some(script_for(address)),
            },
        );
        outpoint
    }

    /// Confirm everything by `blocks` more blocks.
    pub fn mine(&self, blocks: u32) {
        for u in self.state().utxos.values_mut() {
            u.confirmations = u.confirmations.saturating_add(blocks);
        }
    }

    pub fn utxos(&self) -> Vec<UnspentOutput> {
        self.state().utxos.values().cloned().collect()
    }

    pub fn balance_of(&self, address: &str) -> Amount {
        Amount::checked_sum(
            self.state()
                .utxos
                .values()
                .filter(|u| u.address == address)
                .map(|u| u.amount),
        )
        .expect("no overflow")
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Signed hex of every accepted broadcast.
    pub fn broadcasts(&self) -> Vec<String> {
        self.state().broadcasts.clone()
    }

    /// Decode hex produced by this node, signed or not.
    pub fn decode(&self, hex_str: &str) -> Option<DecodedTransaction> {
        let unsigned = hex_str.strip_suffix(SIGNATURE_MARKER).unwrap_or(hex_str);
        WireTx::decode("decode", unsigned).ok().map(|w| to_decoded(&w))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("node state poisoned")
    }

    fn enter(&self, method: &'static str, detail: String) -> Result<(), RpcError> {
        let mut state = self.state();
        state.calls.push(if detail.is_empty() {
            method.to_string()
        } else {
            format!("{method} {detail}")
        });
        match state.failures.get(method) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn owns(&self, address: &str) -> bool {
        !self.foreign.iter().any(|a| a == address)
    }
}

fn to_decoded(w: &WireTx) -> DecodedTransaction {
    DecodedTransaction {
        txid: w.txid(),
        locktime: w.locktime,
        inputs: w
            .inputs
            .iter()
            .map(|(txid, vout)| OutPoint::new(txid.clone(), *vout))
            .collect(),
        outputs: w
            .outputs
            .iter()
            .enumerate()
            .map(|(i, (address, amount))| DecodedOutput {
                index: i as u32,
                amount: Amount::from_units(*amount),
                addresses: vec![address.clone()],
            })
            .collect(),
    }
}

#[async_trait]
impl NodeRpc for MemoryNode {
    async fn list_unspent(
        &self,
        min_conf: u32,
        max_conf: u32,
        addresses: &[String],
    ) -> Result<Vec<UnspentOutput>, RpcError> {
        self.enter("listunspent", format!("{min_conf} {}", addresses.join(",")))?;
        Ok(self
            .state()
            .utxos
            .values()
            .filter(|u| u.confirmations >= min_conf && u.confirmations <= max_conf)
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
        self.enter("createrawtransaction", String::new())?;
        if let Some(o) = outputs.iter().find(|o| self.invalid.contains(&o.address)) {
            return Err(RpcError::Node {
                method: "createrawtransaction".into(),
                code: -5,
                message: format!("Invalid Bitcoin address: {}", o.address),
            });
        }
        let wire = WireTx {
            inputs: inputs.iter().map(|o| (o.txid.clone(), o.vout)).collect(),
            outputs: outputs
                .iter()
                .map(|o| (o.address.clone(), o.amount.units()))
                .collect(),
            locktime,
        };
        Ok(wire.encode())
    }

    async fn sign_raw_transaction(
        &self,
        hex_str: &str,
        prevouts: &[Prevout],
    ) -> Result<SignedTransaction, RpcError> {
        self.enter("signrawtransaction", prevouts.len().to_string())?;
        let wire = WireTx::decode("signrawtransaction", hex_str)?;
        let state = self.state();
        if self.passphrase.is_some() && !state.unlocked {
            return Err(RpcError::Node {
                method: "signrawtransaction".into(),
                code: -13,
                message: "Error: Please enter the wallet passphrase with walletpassphrase first."
                    .into(),
            });
        }
        // Spent coins are still known from their prevout, so they sign; the
        // broadcast is what rejects them.
        let errors: Vec<SignInputError> = wire
            .inputs
            .iter()
            .filter_map(|(txid, vout)| {
                let op = OutPoint::new(txid.clone(), *vout);
                let error = match state.utxos.get(&op).or_else(|| state.spent.get(&op)) {
                    None => "Input not found or already spent",
                    Some(u) if !self.owns(&u.address) => "Unable to sign input, missing key",
                    Some(_) => return None,
                };
                Some(SignInputError {
                    txid: txid.clone(),
                    vout: *vout,
                    error: error.into(),
                })
            })
            .collect();
        Ok(SignedTransaction {
            hex: format!("{hex_str}{SIGNATURE_MARKER}"),
            complete: errors.is_empty(),
            errors,
        })
    }

    async fn send_raw_transaction(&self, hex_str: &str) -> Result<String, RpcError> {
        self.enter("sendrawtransaction", String::new())?;
        let unsigned = hex_str
            .strip_suffix(SIGNATURE_MARKER)
            .ok_or_else(|| RpcError::Node {
                method: "sendrawtransaction".into(),
                code: -26,
                message: "mandatory-script-verify-flag-failed".into(),
            })?;
        let wire = WireTx::decode("sendrawtransaction", unsigned)?;
        let mut state = self.state();

        let spent: Vec<OutPoint> = wire
            .inputs
            .iter()
            .map(|(txid, vout)| OutPoint::new(txid.clone(), *vout))
            .collect();
        if spent.iter().any(|op| !state.utxos.contains_key(op)) {
            return Err(RpcError::Node {
                method: "sendrawtransaction".into(),
                code: -25,
                message: "bad-txns-inputs-missingorspent".into(),
            });
        }
        for op in spent {
            if let Some(u) = state.utxos.remove(&op) {
                state.spent.insert(op, u);
            }
        }
        let txid = wire.txid();
        for (vout, (address, amount)) in wire.outputs.iter().enumerate() {
            let outpoint = OutPoint::new(txid.clone(), vout as u32);
            state.utxos.insert(
                outpoint.clone(),
                UnspentOutput {
                    outpoint,
                    address: address.clone(),
                    amount: Amount::from_units(*amount),
                    confirmations: 0,
                    spendable: true,
                    script_pub_key: Some(script_for(address)),
                },
            );
        }
        state.broadcasts.push(hex_str.to_string());
        Ok(txid)
    }

    async fn decode_raw_transaction(&self, hex_str: &str) -> Result<DecodedTransaction, RpcError> {
        self.enter("decoderawtransaction", String::new())?;
        let unsigned = hex_str.strip_suffix(SIGNATURE_MARKER).unwrap_or(hex_str);
        Ok(to_decoded(&WireTx::decode("decoderawtransaction", unsigned)?))
    }

    async fn validate_address(&self, address: &str) -> Result<AddressValidation, RpcError> {
        self.enter("validateaddress", address.to_string())?;
        let is_valid = !self.invalid.iter().any(|a| a == address);
        Ok(AddressValidation {
            is_valid,
            address: is_valid.then(|| address.to_string()),
            is_mine: is_valid.then(|| self.owns(address)),
        })
    }

    async fn wallet_info(&self) -> Result<WalletInfo, RpcError> {
        self.enter("getwalletinfo", String::new())?;
        let unlocked = self.state().unlocked;
        Ok(WalletInfo {
            unlocked_until: self
                .passphrase
                .as_ref()
                .map(|_| if unlocked { u64::MAX } else { 0 }),
        })
    }

    async fn wallet_passphrase(&self, passphrase: &str, timeout_secs: u64) -> Result<(), RpcError> {
        self.enter("walletpassphrase", timeout_secs.to_string())?;
        if self.passphrase.as_deref() != Some(passphrase) {
            return Err(RpcError::Node {
                method: "walletpassphrase".into(),
                code: -14,
                message: "Error: The wallet passphrase entered was incorrect.".into(),
            });
        }
        self.state().unlocked = true;
        Ok(())
    }
}
