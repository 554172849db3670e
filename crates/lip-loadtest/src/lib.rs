//! Load-test replay for the Ledger Ingestion Pipeline.
//!
//! [`ReplaySource`] wraps any [`lip_backend::LedgerSource`] and splices
//! recorded [`ReplayFixtures`] into the ledgers it serves, at a configurable
//! close rate, so ingestion can be driven with more transactions per ledger
//! than the underlying network produced.

pub mod config;
pub mod fixtures;
pub mod replay;

pub use config::{ConfigError, ReplayConfig};
pub use fixtures::ReplayFixtures;
pub use replay::ReplaySource;
