use std::path::Path;

use lip_stream::{StreamConfig, StreamError};
use lip_types::{
    LedgerCloseMeta, LedgerEntry, LedgerEntryChange, LedgerUpgrade, UpgradeEntryMeta,
};
use tracing::info;

/// Recorded load-test data: ledgers whose transactions are spliced into
/// replayed ledgers, and the entries those transactions expect to exist.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplayFixtures {
    pub ledgers: Vec<LedgerCloseMeta>,
    pub entries: Vec<LedgerEntry>,
}

impl ReplayFixtures {
    pub fn new(ledgers: Vec<LedgerCloseMeta>, entries: Vec<LedgerEntry>) -> Self {
        Self { ledgers, entries }
    }

    /// Read fixtures from a ledger stream file and an entry stream file.
    pub fn load(
        ledgers_path: &Path,
        entries_path: &Path,
        config: &StreamConfig,
    ) -> Result<Self, StreamError> {
        let ledgers = lip_stream::read_ledgers(ledgers_path, config)?;
        let entries = lip_stream::read_entries(entries_path, config)?;
        info!(
            ledgers = ledgers.len(),
            entries = entries.len(),
            "loaded replay fixtures"
        );
        Ok(Self { ledgers, entries })
    }

    /// Write both fixture files.
    pub fn save(
        &self,
        ledgers_path: &Path,
        entries_path: &Path,
        config: &StreamConfig,
    ) -> Result<(), StreamError> {
        lip_stream::write_ledgers(ledgers_path, &self.ledgers, config)?;
        lip_stream::write_entries(entries_path, &self.entries, config)
    }

    /// Total transactions across all fixture ledgers.
    pub fn transaction_count(&self) -> usize {
        self.ledgers.iter().map(LedgerCloseMeta::count_transactions).sum()
    }

    /// Upgrade that creates every fixture entry, for the first replayed
    /// ledger.
    pub fn seed_upgrade(&self) -> UpgradeEntryMeta {
        UpgradeEntryMeta {
            upgrade: LedgerUpgrade::Flags(1),
            changes: self
                .entries
                .iter()
                .cloned()
                .map(LedgerEntryChange::Created)
                .collect(),
        }
    }
}
