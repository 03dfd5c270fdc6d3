//! # spendfrom-core
//! Foundation types for coin-control spending: fixed-point amounts, spend
//! requests, unspent outputs, raw transactions, and policy constants.
//!
//! Nothing in this crate performs I/O. All monetary values are integer
//! counts of the smallest on-chain unit (1 coin = 10^8 units).

pub mod amount;
pub mod constants;
pub mod error;
pub mod policy;
pub mod types;

pub use amount::Amount;
pub use error::{AmountError, RequestError};
pub use policy::Policy;
pub use types::{
    Destination, FeePolicy, OutPoint, RawTransaction, SpendRequest, TxInput, TxOutput,
    UnspentOutput,
};
