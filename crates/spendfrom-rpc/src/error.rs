//! Transport and configuration errors.

use thiserror::Error;

/// Node error code for an invalid address or key.
pub const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;

/// Node error code for a locked wallet.
pub const RPC_WALLET_UNLOCK_NEEDED: i64 = -13;

/// Node error code for a transaction that failed verification, including
/// missing or spent inputs.
pub const RPC_VERIFY_ERROR: i64 = -25;

/// Node error code for a rejected transaction (fee, policy).
pub const RPC_VERIFY_REJECTED: i64 = -26;

/// Node error code for a transaction already in the chain.
pub const RPC_VERIFY_ALREADY_IN_CHAIN: i64 = -27;

/// Failure of a single RPC round trip.
///
/// Node-reported errors keep the node's code and message verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// The node could not be reached.
    #[error("cannot reach node at {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    /// The node rejected the RPC credentials.
    #[error("node rejected RPC credentials (HTTP {status})")]
    Authentication { status: u16 },

    /// No response within the configured timeout. The call may or may not
    /// have taken effect on the node.
    #[error("{method} timed out after {timeout_ms} ms")]
    Timeout { method: String, timeout_ms: u64 },

    /// The node answered with a JSON-RPC error object.
    #[error("{method} failed: code {code}: {message}")]
    Node {
        method: String,
        code: i64,
        message: String,
    },

    /// Non-JSON reply with an HTTP error status.
    #[error("{method} failed: HTTP {status}: {body}")]
    Http {
        method: String,
        status: u16,
        body: String,
    },

    /// The result did not have the expected shape.
    #[error("{method} returned a malformed result: {reason}")]
    Malformed { method: String, reason: String },
}

impl RpcError {
    /// Node error code, when the node supplied one.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Node { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Node error message, when the node supplied one.
    pub fn node_message(&self) -> Option<&str> {
        match self {
            Self::Node { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub(crate) fn malformed(method: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure while assembling the connection configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("reading {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("cookie file {path}: {reason}")]
    Cookie { path: String, reason: String },

    #[error("no RPC credentials: set rpcuser/rpcpassword in {conf_path} or start the node to create a cookie")]
    NoCredentials { conf_path: String },

    #[error("cannot determine the node data directory")]
    NoDataDir,

    #[error("HTTP client: {0}")]
    Client(String),
}
