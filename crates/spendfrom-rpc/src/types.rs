//! Result shapes returned by the node, and their conversion into core types.
//!
//! Wire structs are private; callers receive only the parsed forms. Amounts
//! are read from the JSON number text, never through `f64`.

use serde::Deserialize;
use spendfrom_core::{Amount, OutPoint, TxInput, UnspentOutput};

use crate::error::RpcError;

/// One entry of `listunspent`.
#[derive(Debug, Deserialize)]
pub(crate) struct WireUnspent {
    txid: String,
    vout: u32,
    #[serde(default)]
    address: Option<String>,
    #[serde(rename = "scriptPubKey", default)]
    script_pub_key: Option<String>,
    amount: serde_json::Number,
    #[serde(default)]
    confirmations: i64,
    #[serde(default = "default_spendable")]
    spendable: bool,
}

fn default_spendable() -> bool {
    true
}

impl WireUnspent {
    /// Outputs without an address (bare scripts) cannot be matched against
    /// source addresses and are dropped.
    pub(crate) fn into_unspent(self, method: &str) -> Result<Option<UnspentOutput>, RpcError> {
        let Some(address) = self.address else {
            return Ok(None);
        };
        let amount = Amount::from_json_number(&self.amount)
            .map_err(|e| RpcError::malformed(method, format!("amount of {}:{}: {e}", self.txid, self.vout)))?;
        Ok(Some(UnspentOutput {
            outpoint: OutPoint::new(self.txid, self.vout),
            address,
            amount,
            confirmations: u32::try_from(self.confirmations.max(0)).unwrap_or(u32::MAX),
            spendable: self.spendable,
            script_pub_key: self.script_pub_key,
        }))
    }
}

/// Previous-output descriptor handed to the signer so it can sign inputs
/// without looking them up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prevout {
    pub outpoint: OutPoint,
    pub script_pub_key: String,
    pub amount: Amount,
}

impl Prevout {
    /// Descriptor for an input, if its locking script is known.
    pub fn from_input(input: &TxInput) -> Option<Self> {
        input.script_pub_key.as_ref().map(|script| Self {
            outpoint: input.outpoint.clone(),
            script_pub_key: script.clone(),
            amount: input.amount,
        })
    }
}

/// Per-input failure reported by the signer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignInputError {
    #[serde(default)]
    pub txid: String,
    #[serde(default)]
    pub vout: u32,
    #[serde(default)]
    pub error: String,
}

/// Result of `signrawtransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignedTransaction {
    pub hex: String,
    /// False if any input is still missing a signature.
    pub complete: bool,
    #[serde(default)]
    pub errors: Vec<SignInputError>,
}

impl SignedTransaction {
    /// Human-readable summary of per-input errors.
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return "signature incomplete".to_string();
        }
        self.errors
            .iter()
            .map(|e| format!("{}:{}: {}", e.txid, e.vout, e.error))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Deserialize)]
struct WireVin {
    #[serde(default)]
    txid: Option<String>,
    #[serde(default)]
    vout: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct WireScript {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    addresses: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireVout {
    value: serde_json::Number,
    n: u32,
    #[serde(rename = "scriptPubKey", default)]
    script: WireScript,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireDecoded {
    txid: String,
    #[serde(default)]
    locktime: u32,
    vin: Vec<WireVin>,
    vout: Vec<WireVout>,
}

/// A decoded output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedOutput {
    pub index: u32,
    pub amount: Amount,
    /// Addresses paid by the output script; one for standard outputs.
    pub addresses: Vec<String>,
}

/// Result of `decoderawtransaction`, reduced to what round-trip checks need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransaction {
    pub txid: String,
    pub locktime: u32,
    pub inputs: Vec<OutPoint>,
    pub outputs: Vec<DecodedOutput>,
}

impl WireDecoded {
    pub(crate) fn into_decoded(self, method: &str) -> Result<DecodedTransaction, RpcError> {
        let inputs = self
            .vin
            .into_iter()
            .map(|vin| match (vin.txid, vin.vout) {
                (Some(txid), Some(vout)) => Ok(OutPoint::new(txid, vout)),
                _ => Err(RpcError::malformed(method, "input without txid/vout")),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let outputs = self
            .vout
            .into_iter()
            .map(|vout| {
                let amount = Amount::from_json_number(&vout.value)
                    .map_err(|e| RpcError::malformed(method, format!("output {}: {e}", vout.n)))?;
                let mut addresses = vout.script.addresses;
                if let Some(a) = vout.script.address {
                    if !addresses.contains(&a) {
                        addresses.push(a);
                    }
                }
                Ok(DecodedOutput {
                    index: vout.n,
                    amount,
                    addresses,
                })
            })
            .collect::<Result<Vec<_>, RpcError>>()?;

        Ok(DecodedTransaction {
            txid: self.txid,
            locktime: self.locktime,
            inputs,
            outputs,
        })
    }
}

/// Result of `validateaddress`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AddressValidation {
    #[serde(rename = "isvalid")]
    pub is_valid: bool,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(rename = "ismine", default)]
    pub is_mine: Option<bool>,
}

/// Subset of `getwalletinfo` needed to decide whether to unlock.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct WalletInfo {
    /// Present only for encrypted wallets; 0 when locked.
    #[serde(default)]
    pub unlocked_until: Option<u64>,
}

impl WalletInfo {
    pub fn is_encrypted(&self) -> bool {
        self.unlocked_until.is_some()
    }

    /// True if the wallet is encrypted and its unlock window has passed.
    pub fn needs_unlock(&self, now_secs: u64) -> bool {
        matches!(self.unlocked_until, Some(t) if t <= now_secs)
    }
}
