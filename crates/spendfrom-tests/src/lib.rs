//! Integration and property tests for spendfrom.
//!
//! The tests drive the full pipeline against [`helpers::MemoryNode`], an
//! in-memory wallet node that keeps a UTXO set, encodes transactions it can
//! decode again, and applies broadcasts to its own coins.

pub mod helpers;
