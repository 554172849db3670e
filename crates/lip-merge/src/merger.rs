use lip_types::{LedgerCloseMeta, NetworkId};
use tracing::{debug, info};

use crate::error::{MergeError, Result};
use crate::verify::verify_equivalence;

/// Packs the transactions of many small ledgers into ledgers of exactly
/// `batch_size` transactions each.
///
/// The first ledger contributing to a batch is copied as its base, header
/// included; later contributors have their transaction-set phases and
/// processing results appended. Ledgers without transactions contribute
/// nothing and are skipped.
#[derive(Clone, Copy, Debug)]
pub struct LedgerMerger {
    batch_size: usize,
}

impl LedgerMerger {
    pub fn new(batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(MergeError::InvalidBatchSize);
        }
        Ok(Self { batch_size })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Merge `ledgers`, taken in ascending sequence order.
    ///
    /// Fails without output if any ledger carries evictions or upgrades,
    /// if a ledger does not fit the remaining room of the current batch, or
    /// if the last batch comes up short.
    pub fn merge(&self, ledgers: &[LedgerCloseMeta]) -> Result<Vec<LedgerCloseMeta>> {
        check_supported(ledgers)?;

        let mut sorted: Vec<&LedgerCloseMeta> = ledgers.iter().collect();
        sorted.sort_by_key(|l| l.sequence());

        let mut merged = Vec::new();
        let mut current: Option<LedgerCloseMeta> = None;
        let mut accumulated = 0;

        for ledger in sorted {
            let transactions = ledger.count_transactions();
            if transactions == 0 {
                debug!(seq = ledger.sequence(), "skipping empty ledger");
                continue;
            }
            if accumulated + transactions > self.batch_size {
                return Err(MergeError::BatchOverflow {
                    seq: ledger.sequence(),
                    transactions,
                    accumulated,
                    batch_size: self.batch_size,
                });
            }
            match current.as_mut() {
                None => current = Some(ledger.clone()),
                Some(batch) => {
                    check_protocol(batch, ledger)?;
                    append_ledger(batch, ledger);
                }
            }
            accumulated += transactions;

            if accumulated == self.batch_size {
                if let Some(batch) = current.take() {
                    debug!(seq = batch.sequence(), transactions = accumulated, "batch closed");
                    merged.push(batch);
                }
                accumulated = 0;
            }
        }

        if current.is_some() {
            return Err(MergeError::IncompleteBatch {
                transactions: accumulated,
                batch_size: self.batch_size,
            });
        }
        info!(
            sources = ledgers.len(),
            merged = merged.len(),
            batch_size = self.batch_size,
            "ledgers merged"
        );
        Ok(merged)
    }

    /// [`merge`](Self::merge), then check that the output decodes to the
    /// same changes and transactions as the input.
    pub fn merge_verified(
        &self,
        ledgers: &[LedgerCloseMeta],
        network: &NetworkId,
    ) -> Result<Vec<LedgerCloseMeta>> {
        let merged = self.merge(ledgers)?;
        verify_equivalence(ledgers, &merged, network)?;
        Ok(merged)
    }
}

/// Append the transactions of `src` to `dst`, keeping `dst`'s header.
///
/// Phases are concatenated, so apply order is every `dst` transaction
/// followed by every `src` transaction.
pub fn append_ledger(dst: &mut LedgerCloseMeta, src: &LedgerCloseMeta) {
    dst.tx_set.phases.extend(src.tx_set.phases.iter().cloned());
    dst.tx_processing.extend(src.tx_processing.iter().cloned());
}

/// Check that `src` can be appended to `dst` without losing data: `src`
/// must carry no evictions or upgrades and share `dst`'s protocol version.
pub fn check_appendable(dst: &LedgerCloseMeta, src: &LedgerCloseMeta) -> Result<()> {
    check_supported(std::slice::from_ref(src))?;
    check_protocol(dst, src)
}

fn check_protocol(dst: &LedgerCloseMeta, src: &LedgerCloseMeta) -> Result<()> {
    if dst.protocol_version() != src.protocol_version() {
        return Err(MergeError::ProtocolVersionMismatch {
            seq: src.sequence(),
            expected: dst.protocol_version(),
            actual: src.protocol_version(),
        });
    }
    Ok(())
}

fn check_supported(ledgers: &[LedgerCloseMeta]) -> Result<()> {
    for ledger in ledgers {
        if !ledger.evicted_keys.is_empty() {
            return Err(MergeError::UnsupportedLedgerFeature {
                seq: ledger.sequence(),
                feature: format!("{} evicted keys", ledger.evicted_keys.len()),
            });
        }
        if !ledger.upgrades_processing.is_empty() {
            return Err(MergeError::UnsupportedLedgerFeature {
                seq: ledger.sequence(),
                feature: format!("{} upgrades", ledger.upgrades_processing.len()),
            });
        }
    }
    Ok(())
}
