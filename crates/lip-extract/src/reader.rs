use std::collections::{HashMap, VecDeque};

use lip_crypto::transaction_hash;
use lip_types::{Hash, LedgerCloseMeta, NetworkId, TransactionEnvelope, UpgradeEntryMeta};
use tracing::debug;

use crate::change::{pair_entry_changes, Change, ChangeReason, LedgerRef};
use crate::error::ExtractError;
use crate::transaction::LedgerTransaction;

/// Iterator over the transactions of one ledger, in apply order.
///
/// Construction matches every processing record to its envelope by hash, so
/// a ledger whose transaction set and processing list disagree is rejected
/// before anything is yielded. Per-transaction consistency errors are yielded
/// in place; after the first error the iterator is exhausted.
pub struct TransactionReader<'a> {
    ledger: &'a LedgerCloseMeta,
    ledger_ref: LedgerRef,
    envelopes: HashMap<Hash, &'a TransactionEnvelope>,
    next: usize,
    failed: bool,
}

impl<'a> TransactionReader<'a> {
    pub fn new(ledger: &'a LedgerCloseMeta, network: &NetworkId) -> Result<Self, ExtractError> {
        let seq = ledger.sequence();
        let in_set = ledger.tx_set.len();
        if in_set != ledger.tx_processing.len() {
            return Err(ExtractError::malformed(
                seq,
                format!(
                    "transaction set has {in_set} envelopes but {} processing records",
                    ledger.tx_processing.len()
                ),
            ));
        }

        let mut envelopes = HashMap::with_capacity(in_set);
        for env in ledger.envelopes() {
            envelopes.insert(transaction_hash(network, env)?, env);
        }
        debug!(seq, transactions = in_set, "transaction reader ready");

        Ok(Self {
            ledger,
            ledger_ref: LedgerRef::of(ledger),
            envelopes,
            next: 0,
            failed: false,
        })
    }

    pub fn ledger(&self) -> &LedgerCloseMeta {
        self.ledger
    }

    /// Number of transactions in the ledger, read or not.
    pub fn len(&self) -> usize {
        self.ledger.tx_processing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self, position: usize) -> Result<LedgerTransaction, ExtractError> {
        let processing = &self.ledger.tx_processing[position];
        let hash = processing.result.transaction_hash;
        let envelope = self.envelopes.get(&hash).ok_or_else(|| {
            ExtractError::malformed(
                self.ledger_ref.sequence,
                format!(
                    "processed transaction {} matches no envelope in the set",
                    hash.short_hex()
                ),
            )
        })?;
        let tx = LedgerTransaction {
            index: position as u32 + 1,
            hash,
            envelope: (*envelope).clone(),
            result: processing.result.clone(),
            unsafe_meta: processing.tx_apply_processing.clone(),
            fee_changes: processing.fee_processing.clone(),
            ledger: self.ledger_ref,
            ledger_version: self.ledger_ref.protocol_version,
        };
        tx.validate()?;
        Ok(tx)
    }
}

impl Iterator for TransactionReader<'_> {
    type Item = Result<LedgerTransaction, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.next >= self.len() {
            return None;
        }
        let result = self.read(self.next);
        self.next += 1;
        self.failed = result.is_err();
        Some(result)
    }
}

/// Iterator over every change one ledger caused, in causal order.
///
/// Upgrade changes come first. Then, per transaction in apply order: fee
/// changes, operation changes (successful transactions only), and
/// transaction-level changes. After the first error the iterator is
/// exhausted.
pub struct ChangeReader<'a> {
    upgrades: std::slice::Iter<'a, UpgradeEntryMeta>,
    transactions: TransactionReader<'a>,
    ledger_ref: LedgerRef,
    pending: VecDeque<Change>,
    done: bool,
}

impl<'a> ChangeReader<'a> {
    pub fn new(ledger: &'a LedgerCloseMeta, network: &NetworkId) -> Result<Self, ExtractError> {
        let transactions = TransactionReader::new(ledger, network)?;
        Ok(Self {
            upgrades: ledger.upgrades_processing.iter(),
            ledger_ref: LedgerRef::of(ledger),
            transactions,
            pending: VecDeque::new(),
            done: false,
        })
    }

    fn upgrade_changes(&self, meta: &UpgradeEntryMeta) -> Result<Vec<Change>, ExtractError> {
        let pairs = pair_entry_changes(&meta.changes).map_err(|reason| {
            ExtractError::malformed(
                self.ledger_ref.sequence,
                format!("upgrade {:?}: {reason}", meta.upgrade),
            )
        })?;
        Ok(pairs
            .into_iter()
            .filter_map(|(pre, post)| {
                let entry_type = pre.as_ref().or(post.as_ref())?.entry_type();
                Some(Change {
                    entry_type,
                    reason: ChangeReason::Upgrade,
                    pre,
                    post,
                    operation_index: None,
                    ledger: self.ledger_ref,
                    transaction: None,
                    upgrade: Some(meta.upgrade.clone()),
                })
            })
            .collect())
    }

    /// Refill `pending` from the next upgrade or transaction.
    /// Returns `Ok(false)` once the ledger is exhausted.
    fn refill(&mut self) -> Result<bool, ExtractError> {
        if let Some(meta) = self.upgrades.next() {
            let changes = self.upgrade_changes(meta)?;
            self.pending.extend(changes);
            return Ok(true);
        }
        match self.transactions.next() {
            Some(tx) => {
                let tx = tx?;
                let fee = tx.fee_changes()?;
                let rest = tx.changes()?;
                self.pending.extend(fee);
                self.pending.extend(rest);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Iterator for ChangeReader<'_> {
    type Item = Result<Change, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(change) = self.pending.pop_front() {
                return Some(Ok(change));
            }
            if self.done {
                return None;
            }
            match self.refill() {
                Ok(true) => continue,
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Collect every change of `ledger`, failing on the first error.
pub fn ledger_changes(
    ledger: &LedgerCloseMeta,
    network: &NetworkId,
) -> Result<Vec<Change>, ExtractError> {
    ChangeReader::new(ledger, network)?.collect()
}

/// Collect every transaction of `ledger`, failing on the first error.
pub fn ledger_transactions(
    ledger: &LedgerCloseMeta,
    network: &NetworkId,
) -> Result<Vec<LedgerTransaction>, ExtractError> {
    TransactionReader::new(ledger, network)?.collect()
}
