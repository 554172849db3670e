//! Framed, checksummed, zstd-compressed record streams.
//!
//! Load-test fixtures and merged ledger sets are persisted as streams of
//! [`LedgerCloseMeta`] or [`LedgerEntry`] records. See [`format`] for the
//! byte layout.

pub mod config;
pub mod error;
pub mod format;
pub mod reader;
pub mod writer;

use std::path::Path;

use lip_types::{LedgerCloseMeta, LedgerEntry};

pub use config::StreamConfig;
pub use error::{Result, StreamError};
pub use format::RecordKind;
pub use reader::{Records, StreamReader};
pub use writer::StreamWriter;

/// Write `ledgers` to a new ledger stream file.
pub fn write_ledgers(path: &Path, ledgers: &[LedgerCloseMeta], config: &StreamConfig) -> Result<()> {
    let mut writer = StreamWriter::create(path, RecordKind::Ledger, config)?;
    writer.append_all(ledgers)?;
    writer.finish()?;
    Ok(())
}

/// Read every ledger of a ledger stream file.
pub fn read_ledgers(path: &Path, config: &StreamConfig) -> Result<Vec<LedgerCloseMeta>> {
    StreamReader::open(path, RecordKind::Ledger, config)?.read_all()
}

/// Write `entries` to a new ledger entry stream file.
pub fn write_entries(path: &Path, entries: &[LedgerEntry], config: &StreamConfig) -> Result<()> {
    let mut writer = StreamWriter::create(path, RecordKind::LedgerEntry, config)?;
    writer.append_all(entries)?;
    writer.finish()?;
    Ok(())
}

/// Read every entry of a ledger entry stream file.
pub fn read_entries(path: &Path, config: &StreamConfig) -> Result<Vec<LedgerEntry>> {
    StreamReader::open(path, RecordKind::LedgerEntry, config)?.read_all()
}
