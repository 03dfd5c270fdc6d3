//! # spendfrom-wallet: coin control on top of a wallet node.
//!
//! Catalog, selection, building, verification, and signing/broadcast for a
//! spend restricted to chosen source addresses. All node access goes
//! through [`spendfrom_rpc::NodeRpc`].
//!
//! # Modules
//!
//! - [`error`]: `CoinControlError` and exit codes
//! - [`fee`]: fee estimators
//! - [`catalog`]: spendable outputs of the source addresses
//! - [`coin_selection`]: greedy largest-first `CoinSelector`
//! - [`builder`]: `TransactionBuilder` with change and dust handling
//! - [`validation`]: address, round-trip and fee checks
//! - [`unlock`]: wallet passphrase handling
//! - [`coordinator`]: signing/broadcast state machine
//! - [`pipeline`]: `CoinControl`, the whole run

pub mod builder;
pub mod catalog;
pub mod coin_selection;
pub mod coordinator;
pub mod error;
pub mod fee;
pub mod pipeline;
pub mod unlock;
pub mod validation;

#[cfg(test)]
mod testutil;

pub use builder::TransactionBuilder;
pub use catalog::{AddressBalance, filter_spendable, list_spendable};
pub use coin_selection::{CoinSelector, SelectionResult};
pub use coordinator::{Coordinator, Phase, SubmitMode, Submission};
pub use error::{CoinControlError, Stage};
pub use fee::{FeeEstimator, FixedFee, SizeFee, estimator_for};
pub use pipeline::{CoinControl, Plan};
