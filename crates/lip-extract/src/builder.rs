//! Construction of well-formed ledgers.
//!
//! [`LedgerBuilder`] assembles a [`LedgerCloseMeta`] from applied
//! transactions, computing transaction and header hashes for the given
//! network. [`PaymentWorkload`] drives it to produce a chain of synthetic
//! ledgers with consistent account state, used for load-test fixtures.

use std::collections::BTreeMap;

use lip_crypto::{ledger_header_hash, transaction_hash, ContentHasher, HashError};
use lip_types::{
    AccountEntry, AccountId, AccountMergeResult, Asset, BumpSequenceResultCode,
    ChangeTrustResultCode, CreateAccountResultCode, Hash, InvokeContractResult, LedgerCloseMeta,
    LedgerEntry, LedgerEntryChange, LedgerEntryChanges, LedgerEntryData, LedgerHeader,
    LedgerHeaderHistoryEntry, LedgerKey, LedgerUpgrade, ManageDataResultCode, Memo, NetworkId,
    Operation, OperationBody, OperationMeta, OperationResult, OperationResultTr,
    PaymentResultCode, Transaction, TransactionEnvelope, TransactionMeta, TransactionPhase,
    TransactionResult, TransactionResultCode, TransactionResultMeta, TransactionResultPair,
    TransactionSet, TransactionV1Envelope, UpgradeEntryMeta,
};

pub const DEFAULT_PROTOCOL_VERSION: u32 = 21;
pub const DEFAULT_BASE_FEE: u32 = 100;

/// A transaction together with everything applying it recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedTransaction {
    pub envelope: TransactionEnvelope,
    pub result: TransactionResult,
    pub fee_processing: LedgerEntryChanges,
    pub meta: TransactionMeta,
}

impl AppliedTransaction {
    /// A successful transaction with one success result per operation.
    ///
    /// `operation_changes` holds the recorded changes of each operation in
    /// order.
    pub fn successful(
        envelope: TransactionEnvelope,
        fee_processing: LedgerEntryChanges,
        operation_changes: Vec<LedgerEntryChanges>,
        tx_changes: LedgerEntryChanges,
    ) -> Self {
        let op_results = envelope
            .operations()
            .iter()
            .map(|op| OperationResult::Inner(success_result(&op.body)))
            .collect();
        let code = if envelope.is_fee_bump() {
            TransactionResultCode::FeeBumpInnerSuccess
        } else {
            TransactionResultCode::Success
        };
        Self {
            result: TransactionResult {
                fee_charged: max_fee(&envelope),
                code,
                op_results,
            },
            fee_processing,
            meta: TransactionMeta::V1 {
                operations: operation_changes
                    .into_iter()
                    .map(|changes| OperationMeta { changes })
                    .collect(),
                tx_changes,
            },
            envelope,
        }
    }

    /// A transaction that failed with `code`; it still pays its fee and may
    /// still carry transaction-level changes.
    pub fn failed(
        envelope: TransactionEnvelope,
        code: TransactionResultCode,
        fee_processing: LedgerEntryChanges,
        tx_changes: LedgerEntryChanges,
    ) -> Self {
        Self {
            result: TransactionResult {
                fee_charged: max_fee(&envelope),
                code,
                op_results: Vec::new(),
            },
            fee_processing,
            meta: TransactionMeta::V1 {
                operations: Vec::new(),
                tx_changes,
            },
            envelope,
        }
    }
}

fn max_fee(envelope: &TransactionEnvelope) -> i64 {
    match envelope {
        TransactionEnvelope::Tx(env) => i64::from(env.tx.fee),
        TransactionEnvelope::FeeBump(env) => env.fee,
    }
}

/// Success result matching the type of `body`.
pub fn success_result(body: &OperationBody) -> OperationResultTr {
    match body {
        OperationBody::CreateAccount { .. } => {
            OperationResultTr::CreateAccount(CreateAccountResultCode::Success)
        }
        OperationBody::Payment { .. } => OperationResultTr::Payment(PaymentResultCode::Success),
        OperationBody::ChangeTrust { .. } => {
            OperationResultTr::ChangeTrust(ChangeTrustResultCode::Success)
        }
        OperationBody::ManageData { .. } => {
            OperationResultTr::ManageData(ManageDataResultCode::Success)
        }
        OperationBody::BumpSequence { .. } => {
            OperationResultTr::BumpSequence(BumpSequenceResultCode::Success)
        }
        OperationBody::AccountMerge { .. } => {
            OperationResultTr::AccountMerge(AccountMergeResult::Success { source_balance: 0 })
        }
        OperationBody::InvokeContract { .. } => {
            OperationResultTr::InvokeContract(InvokeContractResult::Success(Hash::zero()))
        }
    }
}

/// Unsigned single-envelope transaction from `source`.
pub fn envelope(source: AccountId, seq_num: i64, operations: Vec<OperationBody>) -> TransactionEnvelope {
    let fee = DEFAULT_BASE_FEE * operations.len().max(1) as u32;
    TransactionEnvelope::Tx(TransactionV1Envelope {
        tx: Transaction {
            source_account: source,
            fee,
            seq_num,
            memo: Memo::None,
            operations: operations
                .into_iter()
                .map(|body| Operation {
                    source_account: None,
                    body,
                })
                .collect(),
        },
        signatures: Vec::new(),
    })
}

/// Builder for a single [`LedgerCloseMeta`].
#[derive(Clone, Debug)]
pub struct LedgerBuilder {
    network: NetworkId,
    sequence: u32,
    protocol_version: u32,
    previous_hash: Hash,
    close_time: u64,
    base_fee: u32,
    transactions: Vec<AppliedTransaction>,
    upgrades: Vec<UpgradeEntryMeta>,
    evicted_keys: Vec<LedgerKey>,
}

impl LedgerBuilder {
    pub fn new(network: NetworkId, sequence: u32) -> Self {
        Self {
            network,
            sequence,
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            previous_hash: Hash::zero(),
            close_time: 1_700_000_000 + u64::from(sequence) * 5,
            base_fee: DEFAULT_BASE_FEE,
            transactions: Vec::new(),
            upgrades: Vec::new(),
            evicted_keys: Vec::new(),
        }
    }

    pub fn with_protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn with_previous_hash(mut self, hash: Hash) -> Self {
        self.previous_hash = hash;
        self
    }

    pub fn with_close_time(mut self, close_time: u64) -> Self {
        self.close_time = close_time;
        self
    }

    pub fn with_transaction(mut self, tx: AppliedTransaction) -> Self {
        self.transactions.push(tx);
        self
    }

    pub fn with_upgrade(mut self, upgrade: LedgerUpgrade, changes: LedgerEntryChanges) -> Self {
        self.upgrades.push(UpgradeEntryMeta { upgrade, changes });
        self
    }

    pub fn with_evicted_key(mut self, key: LedgerKey) -> Self {
        self.evicted_keys.push(key);
        self
    }

    /// Hash every transaction for the builder's network and seal the header.
    pub fn build(self) -> Result<LedgerCloseMeta, HashError> {
        let mut txs = Vec::with_capacity(self.transactions.len());
        let mut tx_processing = Vec::with_capacity(self.transactions.len());
        for applied in self.transactions {
            let transaction_hash = transaction_hash(&self.network, &applied.envelope)?;
            tx_processing.push(TransactionResultMeta {
                result: TransactionResultPair {
                    transaction_hash,
                    result: applied.result,
                },
                fee_processing: applied.fee_processing,
                tx_apply_processing: applied.meta,
            });
            txs.push(applied.envelope);
        }

        let phases = if txs.is_empty() {
            Vec::new()
        } else {
            vec![TransactionPhase {
                base_fee: None,
                txs,
            }]
        };
        let tx_set = TransactionSet {
            previous_ledger_hash: self.previous_hash,
            phases,
        };
        let header = LedgerHeader {
            ledger_seq: self.sequence,
            ledger_version: self.protocol_version,
            previous_ledger_hash: self.previous_hash,
            tx_set_hash: ContentHasher::TX_SET.hash_value(&tx_set)?,
            close_time: self.close_time,
            base_fee: self.base_fee,
            base_reserve: 5_000_000,
            flags: 0,
        };
        let hash = ledger_header_hash(&header)?;
        Ok(LedgerCloseMeta {
            ledger_header: LedgerHeaderHistoryEntry { hash, header },
            tx_set,
            tx_processing,
            upgrades_processing: self.upgrades,
            evicted_keys: self.evicted_keys,
        })
    }
}

/// Deterministic generator of chained ledgers full of native payments.
///
/// Each payment moves a fixed amount between two workload accounts, so every
/// transaction records one fee change, two operation changes, and one
/// sequence bump against accounts whose state the workload tracks.
#[derive(Debug)]
pub struct PaymentWorkload {
    network: NetworkId,
    accounts: BTreeMap<AccountId, AccountEntry>,
    order: Vec<AccountId>,
    next_sequence: u32,
    previous_hash: Hash,
    protocol_version: u32,
    payments: u64,
}

impl PaymentWorkload {
    pub const STARTING_BALANCE: i64 = 10_000_000_000;
    pub const PAYMENT_AMOUNT: i64 = 1_000;

    /// Workload over `account_count` accounts (at least two) whose first
    /// ledger will be `first_sequence`.
    pub fn new(network: NetworkId, first_sequence: u32, account_count: u8) -> Self {
        let order: Vec<_> = (0..account_count.max(2))
            .map(|i| AccountId::from_seed(i.wrapping_add(100)))
            .collect();
        let accounts = order
            .iter()
            .map(|id| {
                (
                    *id,
                    AccountEntry {
                        account_id: *id,
                        balance: Self::STARTING_BALANCE,
                        seq_num: i64::from(first_sequence) << 32,
                        num_sub_entries: 0,
                        flags: 0,
                    },
                )
            })
            .collect();
        Self {
            network,
            accounts,
            order,
            next_sequence: first_sequence,
            previous_hash: Hash::zero(),
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            payments: 0,
        }
    }

    pub fn with_protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = version;
        self
    }

    /// Current state of every workload account, as ledger entries.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.accounts
            .values()
            .map(|a| LedgerEntry::new(self.next_sequence, LedgerEntryData::Account(a.clone())))
            .collect()
    }

    /// Build the next ledger of the chain with `tx_count` payments.
    pub fn next_ledger(&mut self, tx_count: usize) -> Result<LedgerCloseMeta, HashError> {
        let seq = self.next_sequence;
        let mut builder = LedgerBuilder::new(self.network.clone(), seq)
            .with_protocol_version(self.protocol_version)
            .with_previous_hash(self.previous_hash);
        for _ in 0..tx_count {
            builder = builder.with_transaction(self.payment(seq));
        }
        let ledger = builder.build()?;
        self.previous_hash = ledger.hash();
        self.next_sequence += 1;
        Ok(ledger)
    }

    /// Build `count` consecutive ledgers with `txs_per_ledger` payments each.
    pub fn ledgers(
        &mut self,
        count: usize,
        txs_per_ledger: usize,
    ) -> Result<Vec<LedgerCloseMeta>, HashError> {
        (0..count).map(|_| self.next_ledger(txs_per_ledger)).collect()
    }

    fn payment(&mut self, seq: u32) -> AppliedTransaction {
        let n = self.order.len() as u64;
        let source = self.order[(self.payments % n) as usize];
        let destination = self.order[((self.payments + 1) % n) as usize];
        self.payments += 1;

        let tx_seq = self.accounts[&source].seq_num + 1;
        let env = envelope(
            source,
            tx_seq,
            vec![OperationBody::Payment {
                destination,
                asset: Asset::Native,
                amount: Self::PAYMENT_AMOUNT,
            }],
        );
        let fee = max_fee(&env);

        let fee_processing = self.mutate(source, seq, |a| a.balance -= fee);
        let mut op_changes = self.mutate(source, seq, |a| a.balance -= Self::PAYMENT_AMOUNT);
        op_changes.extend(self.mutate(destination, seq, |a| {
            a.balance += Self::PAYMENT_AMOUNT
        }));
        let tx_changes = self.mutate(source, seq, |a| a.seq_num = tx_seq);

        AppliedTransaction::successful(env, fee_processing, vec![op_changes], tx_changes)
    }

    /// Apply `f` to an account and record the State/Updated pair.
    fn mutate(
        &mut self,
        id: AccountId,
        seq: u32,
        f: impl FnOnce(&mut AccountEntry),
    ) -> LedgerEntryChanges {
        let Some(account) = self.accounts.get_mut(&id) else {
            return Vec::new();
        };
        let before = LedgerEntry::new(seq, LedgerEntryData::Account(account.clone()));
        f(account);
        let after = LedgerEntry::new(seq, LedgerEntryData::Account(account.clone()));
        vec![
            LedgerEntryChange::State(before),
            LedgerEntryChange::Updated(after),
        ]
    }
}
