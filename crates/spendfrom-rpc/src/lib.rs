//! # spendfrom-rpc: typed client for the wallet node's JSON-RPC surface.
//!
//! All assumptions about the node's wire schema live in this crate. The rest
//! of the workspace talks to the node through [`NodeRpc`], one method per
//! RPC call, and sees only `spendfrom-core` types.
//!
//! # Modules
//!
//! - [`error`]: `RpcError`, `ConfigError`
//! - [`types`]: result shapes for sign/decode/wallet-info calls
//! - [`client`]: `NodeRpc` trait and the HTTP `RpcClient`
//! - [`config`]: `RpcConfig` and node configuration file loading

pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use client::{NodeRpc, RpcClient};
pub use config::{ConnectionOverrides, NodeConf, NodeFlavor, RpcConfig, SignMethod};
pub use error::{ConfigError, RpcError};
pub use types::{
    AddressValidation, DecodedOutput, DecodedTransaction, Prevout, SignedTransaction, WalletInfo,
};
