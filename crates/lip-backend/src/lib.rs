//! Ledger sources for the Ledger Ingestion Pipeline.
//!
//! A [`LedgerSource`] hands out raw ledgers over a prepared range, in
//! increasing sequence order, and honours caller cancellation on every
//! blocking call.
//!
//! - [`CaptiveSource`]: Streams ledgers from a validating node via a [`NodeRunner`]
//! - [`ArchiveSource`]: Point lookups against an [`ArchiveReader`]
//! - [`MemoryRunner`] / [`MemoryArchive`]: In-process collaborators

pub mod archive;
pub mod captive;
pub mod config;
pub mod error;
pub mod memory;
pub mod runner;
pub mod state;
pub mod traits;

pub use archive::{ArchiveReader, ArchiveSource};
pub use captive::CaptiveSource;
pub use config::CaptiveConfig;
pub use error::{Result, SourceError};
pub use memory::MemoryArchive;
pub use runner::{MemoryRunner, MetaStream, NodeRunner};
pub use state::SourceState;
pub use traits::{guarded, LedgerSource};
