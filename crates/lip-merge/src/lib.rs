//! Ledger merging for the Ledger Ingestion Pipeline.
//!
//! [`LedgerMerger`] turns many small ledgers into fewer ledgers of a fixed
//! transaction count, for load testing ingestion at higher throughput than
//! the recorded network produced. [`verify_equivalence`] checks that the
//! result decodes to the same changes and transactions as its sources.

pub mod error;
pub mod merger;
pub mod verify;

pub use error::{MergeError, Result};
pub use merger::{append_ledger, check_appendable, LedgerMerger};
pub use verify::verify_equivalence;
