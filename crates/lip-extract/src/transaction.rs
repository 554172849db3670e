use lip_types::{
    AccountId, Hash, LedgerEntryChanges, OperationResult, TransactionEnvelope, TransactionMeta,
    TransactionResultPair,
};
use serde::{Deserialize, Serialize};

use crate::change::{pair_entry_changes, Change, ChangeReason, LedgerRef, TransactionRef};
use crate::error::ExtractError;

/// One executed transaction of a ledger, with its result and metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// 1-based position in the ledger's apply order.
    pub index: u32,
    pub hash: Hash,
    pub envelope: TransactionEnvelope,
    pub result: TransactionResultPair,
    /// Apply metadata exactly as recorded. Not validated beyond the checks
    /// performed by [`LedgerTransaction::changes`].
    pub unsafe_meta: TransactionMeta,
    pub fee_changes: LedgerEntryChanges,
    pub ledger: LedgerRef,
    pub ledger_version: u32,
}

impl LedgerTransaction {
    pub fn successful(&self) -> bool {
        self.result.result.successful()
    }

    pub fn operation_count(&self) -> usize {
        self.envelope.operations().len()
    }

    pub fn fee_charged(&self) -> i64 {
        self.result.result.fee_charged
    }

    pub fn source_account(&self) -> AccountId {
        self.envelope.source_account()
    }

    pub fn fee_account(&self) -> AccountId {
        self.envelope.fee_account()
    }

    pub fn reference(&self) -> TransactionRef {
        TransactionRef {
            index: self.index,
            hash: self.hash,
        }
    }

    /// Fee charge and refund changes, reason [`ChangeReason::Fee`].
    pub fn fee_changes(&self) -> Result<Vec<Change>, ExtractError> {
        self.tagged(&self.fee_changes, ChangeReason::Fee, None, "fee processing")
    }

    /// Operation changes (successful transactions only) followed by
    /// transaction-level changes.
    pub fn changes(&self) -> Result<Vec<Change>, ExtractError> {
        let mut changes = Vec::new();
        if self.successful() {
            for index in 0..self.unsafe_meta.operations().len() {
                changes.extend(self.operation_changes(index as u32)?);
            }
        }
        changes.extend(self.tagged(
            self.unsafe_meta.tx_changes(),
            ChangeReason::Transaction,
            None,
            "transaction changes",
        )?);
        Ok(changes)
    }

    /// Changes recorded for the operation at `index`. Empty for failed
    /// transactions and out-of-range indices.
    pub fn operation_changes(&self, index: u32) -> Result<Vec<Change>, ExtractError> {
        if !self.successful() {
            return Ok(Vec::new());
        }
        match self.unsafe_meta.operations().get(index as usize) {
            Some(meta) => self.tagged(
                &meta.changes,
                ChangeReason::Operation,
                Some(index),
                &format!("operation {index}"),
            ),
            None => Ok(Vec::new()),
        }
    }

    /// Check that envelope, results, and metadata describe the same
    /// operations. Only successful transactions are held to this.
    pub fn validate(&self) -> Result<(), ExtractError> {
        if !self.successful() {
            return Ok(());
        }
        let ops = self.envelope.operations();
        let results = &self.result.result.op_results;
        let metas = self.unsafe_meta.operations();
        if ops.len() != results.len() || ops.len() != metas.len() {
            return Err(self.malformed(format!(
                "operation count mismatch: {} in envelope, {} results, {} in meta",
                ops.len(),
                results.len(),
                metas.len()
            )));
        }
        for (i, (op, result)) in ops.iter().zip(results).enumerate() {
            if let OperationResult::Inner(tr) = result {
                let expected = op.body.operation_type();
                if tr.operation_type() != expected {
                    return Err(self.malformed(format!(
                        "operation {i} is {expected} but its result is {}",
                        tr.operation_type()
                    )));
                }
            }
        }
        Ok(())
    }

    fn tagged(
        &self,
        recorded: &LedgerEntryChanges,
        reason: ChangeReason,
        operation_index: Option<u32>,
        context: &str,
    ) -> Result<Vec<Change>, ExtractError> {
        let pairs = pair_entry_changes(recorded)
            .map_err(|reason| self.malformed(format!("{context}: {reason}")))?;
        Ok(pairs
            .into_iter()
            .filter_map(|(pre, post)| {
                let entry_type = pre.as_ref().or(post.as_ref())?.entry_type();
                Some(Change {
                    entry_type,
                    reason,
                    pre,
                    post,
                    operation_index,
                    ledger: self.ledger,
                    transaction: Some(self.reference()),
                    upgrade: None,
                })
            })
            .collect())
    }

    fn malformed(&self, reason: String) -> ExtractError {
        ExtractError::malformed(
            self.ledger.sequence,
            format!("transaction {} ({}): {reason}", self.index, self.hash.short_hex()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{AppliedTransaction, LedgerBuilder, PaymentWorkload};
    use crate::reader::ledger_transactions;
    use lip_types::{
        AccountId, FeeBumpEnvelope, NetworkId, TransactionResultCode, TransactionV1Envelope,
    };

    fn first_tx(ledger: &lip_types::LedgerCloseMeta, net: &NetworkId) -> LedgerTransaction {
        ledger_transactions(ledger, net).unwrap().remove(0)
    }

    #[test]
    fn operation_changes_are_indexed() {
        let net = NetworkId::testnet();
        let ledger = PaymentWorkload::new(net.clone(), 4, 2).next_ledger(1).unwrap();
        let tx = first_tx(&ledger, &net);
        let op = tx.operation_changes(0).unwrap();
        assert_eq!(op.len(), 2);
        assert!(op.iter().all(|c| c.operation_index == Some(0)));
        assert!(tx.operation_changes(1).unwrap().is_empty());
        assert_eq!(tx.fee_changes().unwrap()[0].reason, ChangeReason::Fee);
        assert_eq!(tx.reference().index, 1);
    }

    #[test]
    fn fee_bump_charges_fee_source() {
        let net = NetworkId::testnet();
        let inner = TransactionV1Envelope {
            tx: lip_types::Transaction {
                source_account: AccountId::from_seed(1),
                fee: 100,
                seq_num: 3,
                memo: lip_types::Memo::None,
                operations: vec![],
            },
            signatures: vec![],
        };
        let env = TransactionEnvelope::FeeBump(FeeBumpEnvelope {
            fee_source: AccountId::from_seed(2),
            fee: 700,
            inner,
            signatures: vec![],
        });
        let ledger = LedgerBuilder::new(net.clone(), 2)
            .with_transaction(AppliedTransaction::successful(env, vec![], vec![], vec![]))
            .build()
            .unwrap();
        let tx = first_tx(&ledger, &net);
        assert!(tx.successful());
        assert_eq!(tx.result.result.code, TransactionResultCode::FeeBumpInnerSuccess);
        assert_eq!(tx.fee_charged(), 700);
        assert_eq!(tx.source_account(), AccountId::from_seed(1));
        assert_eq!(tx.fee_account(), AccountId::from_seed(2));
    }

    #[test]
    fn failed_transaction_is_not_validated() {
        let net = NetworkId::testnet();
        let env = crate::builder::envelope(
            AccountId::from_seed(3),
            1,
            vec![lip_types::OperationBody::BumpSequence { bump_to: 4 }],
        );
        let ledger = LedgerBuilder::new(net.clone(), 2)
            .with_transaction(AppliedTransaction::failed(
                env,
                TransactionResultCode::BadSeq,
                vec![],
                vec![],
            ))
            .build()
            .unwrap();
        let tx = first_tx(&ledger, &net);
        assert!(!tx.successful());
        assert_eq!(tx.operation_count(), 1);
        assert!(tx.validate().is_ok());
        assert!(tx.changes().unwrap().is_empty());
    }
}
