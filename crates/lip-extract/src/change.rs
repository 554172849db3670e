use std::fmt;

use lip_types::{
    Hash, LedgerCloseMeta, LedgerEntry, LedgerEntryChange, LedgerEntryType, LedgerKey,
    LedgerUpgrade,
};
use serde::{Deserialize, Serialize};

/// Why a ledger entry changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangeReason {
    /// Caused by one operation of a successful transaction.
    Operation,
    /// Caused by the transaction as a whole, e.g. the sequence number bump.
    Transaction,
    /// Fee charge or refund.
    Fee,
    /// Caused by a protocol upgrade, outside any transaction.
    Upgrade,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Operation => "operation",
            Self::Transaction => "transaction",
            Self::Fee => "fee",
            Self::Upgrade => "upgrade",
        };
        f.write_str(s)
    }
}

/// Shape of a change, derived from which of pre/post are present.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Updated,
    Removed,
}

/// Back-reference to the ledger that produced a change or transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRef {
    pub sequence: u32,
    pub hash: Hash,
    pub protocol_version: u32,
    pub close_time: u64,
}

impl LedgerRef {
    pub fn of(ledger: &LedgerCloseMeta) -> Self {
        Self {
            sequence: ledger.sequence(),
            hash: ledger.hash(),
            protocol_version: ledger.protocol_version(),
            close_time: ledger.close_time(),
        }
    }
}

/// Back-reference to the transaction that caused a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRef {
    /// 1-based position in the ledger's apply order.
    pub index: u32,
    pub hash: Hash,
}

/// A single ledger entry mutation tagged with its cause.
///
/// Creation has no `pre`, removal has no `post`, mutation has both. Upgrade
/// changes carry no transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub entry_type: LedgerEntryType,
    pub reason: ChangeReason,
    pub pre: Option<LedgerEntry>,
    pub post: Option<LedgerEntry>,
    /// Set only for [`ChangeReason::Operation`].
    pub operation_index: Option<u32>,
    pub ledger: LedgerRef,
    pub transaction: Option<TransactionRef>,
    /// Set only for [`ChangeReason::Upgrade`].
    pub upgrade: Option<LedgerUpgrade>,
}

impl Change {
    /// The key of the entry this change touches.
    ///
    /// `None` only for a hand-built change with neither side set; readers
    /// never produce one.
    pub fn ledger_key(&self) -> Option<LedgerKey> {
        self.pre.as_ref().or(self.post.as_ref()).map(LedgerEntry::key)
    }

    pub fn kind(&self) -> ChangeKind {
        match (&self.pre, &self.post) {
            (None, _) => ChangeKind::Created,
            (Some(_), Some(_)) => ChangeKind::Updated,
            (Some(_), None) => ChangeKind::Removed,
        }
    }
}

/// A pre/post pair taken from a recorded change list.
pub(crate) type EntryPair = (Option<LedgerEntry>, Option<LedgerEntry>);

/// Fold a recorded change list into pre/post pairs, keeping recorded order.
///
/// Every `Updated` and `Removed` must directly follow a `State` snapshot of
/// the same key; anything else is reported as an error string.
pub(crate) fn pair_entry_changes(changes: &[LedgerEntryChange]) -> Result<Vec<EntryPair>, String> {
    let mut pairs = Vec::with_capacity(changes.len());
    let mut state: Option<&LedgerEntry> = None;
    for (i, change) in changes.iter().enumerate() {
        match change {
            LedgerEntryChange::State(entry) => {
                state = Some(entry);
                continue;
            }
            LedgerEntryChange::Created(entry) => {
                pairs.push((None, Some(entry.clone())));
            }
            LedgerEntryChange::Updated(entry) => {
                let pre = take_state(state, &entry.key(), i, "update")?;
                pairs.push((Some(pre.clone()), Some(entry.clone())));
            }
            LedgerEntryChange::Removed(key) => {
                let pre = take_state(state, key, i, "removal")?;
                pairs.push((Some(pre.clone()), None));
            }
        }
        state = None;
    }
    Ok(pairs)
}

fn take_state<'a>(
    state: Option<&'a LedgerEntry>,
    key: &LedgerKey,
    position: usize,
    what: &str,
) -> Result<&'a LedgerEntry, String> {
    match state {
        Some(entry) if entry.key() == *key => Ok(entry),
        Some(_) => Err(format!(
            "{what} at position {position} follows a state snapshot of a different entry"
        )),
        None => Err(format!(
            "{what} at position {position} is not preceded by a state snapshot"
        )),
    }
}
