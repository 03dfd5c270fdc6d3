//! Spend requests, unspent outputs, and raw transactions.
//!
//! Every value here is an immutable snapshot: outputs come from the node,
//! requests from the user, and transactions are built once per run.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::{AmountError, RequestError};

/// Reference to a transaction output: `(txid, vout)`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    /// Transaction id in display (big-endian hex) order.
    pub txid: String,
    /// Output index within the transaction.
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: impl Into<String>, vout: u32) -> Self {
        Self {
            txid: txid.into(),
            vout,
        }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// An unspent output as reported by the node's `listunspent`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnspentOutput {
    pub outpoint: OutPoint,
    /// Address that owns the output.
    pub address: String,
    pub amount: Amount,
    pub confirmations: u32,
    /// False for watch-only outputs the node cannot sign for.
    pub spendable: bool,
    /// Locking script hex, forwarded to the signer when present.
    pub script_pub_key: Option<String>,
}

/// A payment: address plus amount.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    pub address: String,
    pub amount: Amount,
}

impl FromStr for Destination {
    type Err = RequestError;

    /// Parse `<address>:<amount>` where amount is in whole coins.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, amount) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| RequestError::MalformedDestination(s.to_string()))?;
        let address = address.trim();
        if address.is_empty() {
            return Err(RequestError::EmptyAddress);
        }
        Ok(Self {
            address: address.to_string(),
            amount: amount.parse()?,
        })
    }
}

/// How the transaction fee is determined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeePolicy {
    /// Pay exactly this fee regardless of size.
    Fixed(Amount),
    /// Estimate from transaction size using the policy's fee rate.
    Auto,
}

impl FromStr for FeePolicy {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(Self::Auto)
        } else {
            Ok(Self::Fixed(s.parse()?))
        }
    }
}

/// One user invocation: which coins may be spent and where they go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpendRequest {
    sources: Vec<String>,
    destinations: Vec<Destination>,
    fee: FeePolicy,
    min_confirmations: u32,
    change_address: Option<String>,
}

impl SpendRequest {
    /// Validate and freeze a request.
    ///
    /// Source addresses are de-duplicated keeping first occurrence order.
    /// Without an explicit change address, change returns to the last source.
    pub fn new(
        sources: Vec<String>,
        destinations: Vec<Destination>,
        fee: FeePolicy,
        min_confirmations: u32,
        change_address: Option<String>,
    ) -> Result<Self, RequestError> {
        let mut deduped: Vec<String> = Vec::with_capacity(sources.len());
        for s in sources {
            let s = s.trim().to_string();
            if s.is_empty() {
                return Err(RequestError::EmptyAddress);
            }
            if !deduped.contains(&s) {
                deduped.push(s);
            }
        }
        if deduped.is_empty() {
            return Err(RequestError::NoSources);
        }
        if destinations.is_empty() {
            return Err(RequestError::NoDestinations);
        }

        for (i, d) in destinations.iter().enumerate() {
            if d.amount == Amount::ZERO {
                return Err(RequestError::ZeroAmount(d.address.clone()));
            }
            if destinations[..i].iter().any(|p| p.address == d.address) {
                return Err(RequestError::DuplicateDestination(d.address.clone()));
            }
        }
        Amount::checked_sum(destinations.iter().map(|d| d.amount))?;

        Ok(Self {
            sources: deduped,
            destinations,
            fee,
            min_confirmations,
            change_address: change_address.map(|c| c.trim().to_string()),
        })
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn is_source(&self, address: &str) -> bool {
        self.sources.iter().any(|s| s == address)
    }

    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    pub fn fee(&self) -> FeePolicy {
        self.fee
    }

    pub fn min_confirmations(&self) -> u32 {
        self.min_confirmations
    }

    /// Address receiving change: explicit, or the last source address.
    pub fn change_address(&self) -> &str {
        match &self.change_address {
            Some(c) => c,
            None => self.sources.last().map(String::as_str).unwrap_or_default(),
        }
    }

    /// Sum of all destination amounts. Overflow was rejected by [`SpendRequest::new`].
    pub fn total_requested(&self) -> Amount {
        Amount::checked_sum(self.destinations.iter().map(|d| d.amount)).unwrap_or(Amount::ZERO)
    }
}

/// Transaction input: the spent outpoint plus what it is worth.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxInput {
    pub outpoint: OutPoint,
    pub amount: Amount,
    /// Address owning the spent output; its key signs this input.
    pub address: String,
    pub script_pub_key: Option<String>,
}

/// Transaction output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOutput {
    pub address: String,
    pub amount: Amount,
}

/// An unsigned transaction, built once and never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawTransaction {
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    change_index: Option<usize>,
    locktime: u32,
    fee: Amount,
}

impl RawTransaction {
    /// Assemble a transaction. Callers are responsible for the balance
    /// equation; [`RawTransaction::is_balanced`] checks it.
    pub fn new(
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        change_index: Option<usize>,
        locktime: u32,
        fee: Amount,
    ) -> Self {
        Self {
            inputs,
            outputs,
            change_index,
            locktime,
            fee,
        }
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn locktime(&self) -> u32 {
        self.locktime
    }

    pub fn fee(&self) -> Amount {
        self.fee
    }

    /// The output carrying change, if any. When the change address is also
    /// a destination this is that payment output.
    pub fn change(&self) -> Option<&TxOutput> {
        self.change_index.and_then(|i| self.outputs.get(i))
    }

    pub fn total_in(&self) -> Result<Amount, AmountError> {
        Amount::checked_sum(self.inputs.iter().map(|i| i.amount))
    }

    pub fn total_out(&self) -> Result<Amount, AmountError> {
        Amount::checked_sum(self.outputs.iter().map(|o| o.amount))
    }

    /// `sum(inputs) == sum(outputs) + fee`, exactly.
    pub fn is_balanced(&self) -> bool {
        match (self.total_in(), self.total_out()) {
            (Ok(i), Ok(o)) => o.checked_add(self.fee) == Some(i),
            _ => false,
        }
    }
}
