//! Equivalence check between source ledgers and their merged form.
//!
//! Merging is correct when downstream consumers cannot tell the difference:
//! every ledger entry sees the same ordered sequence of changes, and the
//! flattened transaction list is identical apart from ledger back-references
//! and positions.

use std::collections::BTreeMap;

use lip_extract::{ChangeReader, ChangeReason, LedgerTransaction, TransactionReader};
use lip_types::{LedgerCloseMeta, LedgerEntry, LedgerEntryType, LedgerKey, NetworkId};
use tracing::debug;

use crate::error::{MergeError, Result};

/// The parts of a change that survive merging.
#[derive(Clone, Debug, PartialEq, Eq)]
struct ChangeFingerprint {
    reason: ChangeReason,
    entry_type: LedgerEntryType,
    pre: Option<LedgerEntry>,
    post: Option<LedgerEntry>,
}

type ChangesByKey = BTreeMap<LedgerKey, Vec<ChangeFingerprint>>;

/// Check that `merged` decodes to the same changes and transactions as
/// `sources`, or describe the first difference.
pub fn verify_equivalence(
    sources: &[LedgerCloseMeta],
    merged: &[LedgerCloseMeta],
    network: &NetworkId,
) -> Result<()> {
    let mut sorted: Vec<&LedgerCloseMeta> = sources.iter().collect();
    sorted.sort_by_key(|l| l.sequence());

    let expected = changes_by_key(sorted.iter().copied(), network)?;
    let actual = changes_by_key(merged.iter(), network)?;
    compare_changes(&expected, &actual)?;
    let keys = expected.len();

    let expected = transactions(sorted.iter().copied(), network)?;
    let actual = transactions(merged.iter(), network)?;
    compare_transactions(&expected, &actual)?;

    debug!(keys, transactions = actual.len(), "merge equivalence verified");
    Ok(())
}

fn changes_by_key<'a>(
    ledgers: impl Iterator<Item = &'a LedgerCloseMeta>,
    network: &NetworkId,
) -> Result<ChangesByKey> {
    let mut grouped = ChangesByKey::new();
    for ledger in ledgers {
        for change in ChangeReader::new(ledger, network)? {
            let change = change?;
            let Some(key) = change.ledger_key() else {
                continue;
            };
            grouped.entry(key).or_default().push(ChangeFingerprint {
                reason: change.reason,
                entry_type: change.entry_type,
                pre: change.pre,
                post: change.post,
            });
        }
    }
    Ok(grouped)
}

fn transactions<'a>(
    ledgers: impl Iterator<Item = &'a LedgerCloseMeta>,
    network: &NetworkId,
) -> Result<Vec<LedgerTransaction>> {
    let mut all = Vec::new();
    for ledger in ledgers {
        for tx in TransactionReader::new(ledger, network)? {
            all.push(tx?);
        }
    }
    Ok(all)
}

fn compare_changes(expected: &ChangesByKey, actual: &ChangesByKey) -> Result<()> {
    if expected.len() != actual.len() {
        return Err(MergeError::NotEquivalent(format!(
            "{} entries changed in sources, {} in merged ledgers",
            expected.len(),
            actual.len()
        )));
    }
    for (key, want) in expected {
        let Some(got) = actual.get(key) else {
            return Err(MergeError::NotEquivalent(format!(
                "{key:?} has no changes in merged ledgers"
            )));
        };
        if want.len() != got.len() {
            return Err(MergeError::NotEquivalent(format!(
                "{key:?} changed {} times in sources, {} in merged ledgers",
                want.len(),
                got.len()
            )));
        }
        if let Some(i) = want.iter().zip(got).position(|(w, g)| w != g) {
            return Err(MergeError::NotEquivalent(format!(
                "change {i} of {key:?} differs"
            )));
        }
    }
    Ok(())
}

fn compare_transactions(expected: &[LedgerTransaction], actual: &[LedgerTransaction]) -> Result<()> {
    if expected.len() != actual.len() {
        return Err(MergeError::NotEquivalent(format!(
            "{} transactions in sources, {} in merged ledgers",
            expected.len(),
            actual.len()
        )));
    }
    for (i, (want, got)) in expected.iter().zip(actual).enumerate() {
        let field = if want.hash != got.hash {
            "hash"
        } else if want.envelope != got.envelope {
            "envelope"
        } else if want.result != got.result {
            "result"
        } else if want.unsafe_meta != got.unsafe_meta {
            "meta"
        } else if want.fee_changes != got.fee_changes {
            "fee changes"
        } else if want.ledger_version != got.ledger_version {
            "ledger version"
        } else {
            continue;
        };
        return Err(MergeError::NotEquivalent(format!(
            "transaction {i} ({}) differs in {field}",
            want.hash.short_hex()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merger::{append_ledger, LedgerMerger};
    use lip_extract::PaymentWorkload;
    use lip_types::{LedgerEntryChange, LedgerEntryData};

    fn net() -> NetworkId {
        NetworkId::testnet()
    }

    #[test]
    fn honest_merge_is_equivalent() {
        let ledgers = PaymentWorkload::new(net(), 3, 5).ledgers(12, 3).unwrap();
        for batch_size in [3, 6, 12, 36] {
            let merged = LedgerMerger::new(batch_size).unwrap().merge(&ledgers).unwrap();
            verify_equivalence(&ledgers, &merged, &net()).unwrap();
        }
    }

    #[test]
    fn tampered_change_is_detected() {
        let ledgers = PaymentWorkload::new(net(), 3, 2).ledgers(2, 1).unwrap();
        let mut merged = LedgerMerger::new(2).unwrap().merge(&ledgers).unwrap();
        let fee = &mut merged[0].tx_processing[1].fee_processing;
        let Some(LedgerEntryChange::Updated(entry)) = fee.last_mut() else {
            panic!("fee processing should end with an update");
        };
        let LedgerEntryData::Account(account) = &mut entry.data else {
            panic!("fee is charged to an account");
        };
        account.balance -= 1;

        let err = verify_equivalence(&ledgers, &merged, &net()).unwrap_err();
        assert!(matches!(err, MergeError::NotEquivalent(_)));
    }

    #[test]
    fn dropped_transaction_is_detected() {
        let ledgers = PaymentWorkload::new(net(), 3, 2).ledgers(3, 1).unwrap();
        let mut merged = ledgers[0].clone();
        append_ledger(&mut merged, &ledgers[1]);
        let err = verify_equivalence(&ledgers, &[merged], &net()).unwrap_err();
        assert!(matches!(err, MergeError::NotEquivalent(_)));
    }

    #[test]
    fn reordered_transactions_are_detected() {
        let ledgers = PaymentWorkload::new(net(), 3, 4).ledgers(2, 1).unwrap();
        let mut merged = ledgers[1].clone();
        append_ledger(&mut merged, &ledgers[0]);
        let err = verify_equivalence(&ledgers, &[merged], &net()).unwrap_err();
        assert!(matches!(err, MergeError::NotEquivalent(_)));
    }
}
