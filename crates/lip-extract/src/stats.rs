use std::collections::BTreeMap;
use std::fmt;

use lip_types::LedgerEntryType;
use serde::{Deserialize, Serialize};

use crate::change::{Change, ChangeKind, ChangeReason};

/// Counts of extracted changes, by cause and by what they touched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStats {
    pub total: u64,
    pub by_reason: BTreeMap<ChangeReason, u64>,
    pub by_entry_type: BTreeMap<LedgerEntryType, u64>,
    pub by_kind: BTreeMap<ChangeKind, u64>,
    /// Keys evicted by the ledgers seen. Evictions are not changes and are
    /// not part of `total`.
    pub evicted: u64,
}

impl ChangeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, change: &Change) {
        self.total += 1;
        *self.by_reason.entry(change.reason).or_default() += 1;
        *self.by_entry_type.entry(change.entry_type).or_default() += 1;
        *self.by_kind.entry(change.kind()).or_default() += 1;
    }

    pub fn record_all<'a>(&mut self, changes: impl IntoIterator<Item = &'a Change>) {
        for change in changes {
            self.record(change);
        }
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evicted += count as u64;
    }

    pub fn reason(&self, reason: ChangeReason) -> u64 {
        self.by_reason.get(&reason).copied().unwrap_or(0)
    }

    pub fn entry_type(&self, entry_type: LedgerEntryType) -> u64 {
        self.by_entry_type.get(&entry_type).copied().unwrap_or(0)
    }

    pub fn kind(&self, kind: ChangeKind) -> u64 {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }

    /// Add another set of counts into this one.
    pub fn merge(&mut self, other: &ChangeStats) {
        self.total += other.total;
        self.evicted += other.evicted;
        for (k, v) in &other.by_reason {
            *self.by_reason.entry(*k).or_default() += v;
        }
        for (k, v) in &other.by_entry_type {
            *self.by_entry_type.entry(*k).or_default() += v;
        }
        for (k, v) in &other.by_kind {
            *self.by_kind.entry(*k).or_default() += v;
        }
    }
}

impl fmt::Display for ChangeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} changes (fee={}, operation={}, transaction={}, upgrade={})",
            self.total,
            self.reason(ChangeReason::Fee),
            self.reason(ChangeReason::Operation),
            self.reason(ChangeReason::Transaction),
            self.reason(ChangeReason::Upgrade),
        )
    }
}
