//! Error taxonomy for a spend run.
//!
//! Every variant names the stage it came from and keeps the node's raw
//! error text, so a failure can be diagnosed without re-running.

use std::fmt;

use spendfrom_core::{Amount, AmountError, RequestError};
use spendfrom_rpc::RpcError;
use spendfrom_rpc::error::RPC_INVALID_ADDRESS_OR_KEY;
use thiserror::Error;

/// Pipeline stage in which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ValidateAddresses,
    Catalog,
    Encode,
    Verify,
    Unlock,
    Sign,
    Broadcast,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ValidateAddresses => "address validation",
            Self::Catalog => "listing unspent outputs",
            Self::Encode => "encoding transaction",
            Self::Verify => "verifying transaction",
            Self::Unlock => "unlocking wallet",
            Self::Sign => "signing",
            Self::Broadcast => "broadcast",
        };
        f.write_str(name)
    }
}

/// Errors that end a spend run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoinControlError {
    /// The node could not be reached (or did not answer in time) before
    /// anything irreversible happened.
    #[error("{stage}: cannot reach node: {source}")]
    Connection {
        /// Stage whose call failed.
        stage: Stage,
        /// Transport error from the client.
        source: RpcError,
    },

    /// The node rejected the RPC credentials.
    #[error("{stage}: {source}")]
    Authentication {
        /// Stage whose call was refused.
        stage: Stage,
        /// The HTTP 401/403 reply.
        source: RpcError,
    },

    /// An address was rejected locally or by the node.
    #[error("invalid address {}: {reason}", .address.as_deref().unwrap_or("(see node message)"))]
    InvalidAddress {
        /// The offending address, when known without parsing node text.
        address: Option<String>,
        /// Why it was rejected.
        reason: String,
    },

    /// No unspent output of the source addresses qualifies.
    #[error(
        "no spendable coins at {} with at least {min_confirmations} confirmation(s)",
        .addresses.join(", ")
    )]
    NoSpendableCoins {
        /// Source addresses that were searched.
        addresses: Vec<String>,
        /// Confirmation threshold in force.
        min_confirmations: u32,
    },

    /// The whole catalog does not cover payment plus fee.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds {
        /// Spendable total of the source addresses.
        have: Amount,
        /// Requested amount plus the fee for spending every coin.
        need: Amount,
    },

    /// An amount computation went negative or overflowed.
    #[error("amount overflow: {0}")]
    AmountOverflow(String),

    /// The node could not sign (locked wallet, missing key, incomplete).
    #[error("signing failed: {reason}")]
    SignFailed {
        /// Node error text or per-input signing errors.
        reason: String,
    },

    /// The node refused the signed transaction. The signed hex is kept for
    /// manual resubmission.
    #[error("broadcast failed: {reason}")]
    BroadcastFailed {
        /// Node rejection reason.
        reason: String,
        /// Fully signed transaction, ready to resubmit.
        signed_hex: String,
    },

    /// A sign or broadcast call timed out; whether it took effect is unknown.
    #[error("{stage} outcome unknown: {reason}")]
    Indeterminate {
        /// Sign or broadcast.
        stage: Stage,
        /// The timeout or unreadable reply.
        reason: String,
        /// Signed transaction, if signing had completed.
        signed_hex: Option<String>,
    },

    /// The fee failed the sanity guard.
    #[error("fee rejected: {0}")]
    FeeRejected(String),

    /// The node's decoding of the transaction differs from what was built.
    #[error("decoded transaction does not match the built one: {0}")]
    RoundTripMismatch(String),

    /// Any other node error.
    #[error("{stage}: {source}")]
    Rpc {
        /// Stage whose call failed.
        stage: Stage,
        /// Node-reported error, code and message verbatim.
        source: RpcError,
    },

    /// The request itself was malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),
}

impl CoinControlError {
    /// Classify a transport error raised during `stage`.
    ///
    /// Sign and broadcast have their own mapping in the coordinator because
    /// a timeout there leaves the outcome unknown.
    pub fn from_rpc(stage: Stage, err: RpcError) -> Self {
        match err {
            RpcError::Connection { .. } | RpcError::Timeout { .. } => {
                Self::Connection { stage, source: err }
            }
            RpcError::Authentication { .. } => Self::Authentication { stage, source: err },
            RpcError::Node { code, .. } if code == RPC_INVALID_ADDRESS_OR_KEY => {
                Self::InvalidAddress {
                    address: None,
                    reason: err.to_string(),
                }
            }
            other => Self::Rpc {
                stage,
                source: other,
            },
        }
    }

    /// Process exit code for this failure kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidRequest(_) => 1,
            Self::Connection { .. } => 2,
            Self::Authentication { .. } => 3,
            Self::InvalidAddress { .. } => 4,
            Self::NoSpendableCoins { .. } => 5,
            Self::InsufficientFunds { .. } => 6,
            Self::AmountOverflow(_) => 7,
            Self::SignFailed { .. } => 8,
            Self::BroadcastFailed { .. } => 9,
            Self::FeeRejected(_) => 10,
            Self::RoundTripMismatch(_) => 11,
            Self::Indeterminate { .. } => 12,
            Self::Rpc { .. } => 13,
        }
    }

    /// Signed transaction hex carried by the error, if signing had succeeded.
    pub fn signed_hex(&self) -> Option<&str> {
        match self {
            Self::BroadcastFailed { signed_hex, .. } => Some(signed_hex),
            Self::Indeterminate { signed_hex, .. } => signed_hex.as_deref(),
            _ => None,
        }
    }
}

impl From<AmountError> for CoinControlError {
    fn from(e: AmountError) -> Self {
        Self::AmountOverflow(e.to_string())
    }
}
