use serde::{Deserialize, Serialize};

use crate::codec;
use crate::entry::{LedgerEntryChanges, LedgerKey};
use crate::error::TypeError;
use crate::hash::Hash;
use crate::transaction::{TransactionEnvelope, TransactionMeta, TransactionResultPair};

/// Consensus header of a closed ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerHeader {
    pub ledger_seq: u32,
    pub ledger_version: u32,
    pub previous_ledger_hash: Hash,
    pub tx_set_hash: Hash,
    /// Close time in seconds since the Unix epoch.
    pub close_time: u64,
    pub base_fee: u32,
    pub base_reserve: u32,
    pub flags: u32,
}

/// A header together with the hash the network assigned to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerHeaderHistoryEntry {
    pub hash: Hash,
    pub header: LedgerHeader,
}

/// One phase of a transaction set. Phases are applied in order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPhase {
    pub base_fee: Option<i64>,
    pub txs: Vec<TransactionEnvelope>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSet {
    pub previous_ledger_hash: Hash,
    pub phases: Vec<TransactionPhase>,
}

impl TransactionSet {
    /// All envelopes across phases, in phase order.
    pub fn envelopes(&self) -> impl Iterator<Item = &TransactionEnvelope> {
        self.phases.iter().flat_map(|p| p.txs.iter())
    }

    pub fn len(&self) -> usize {
        self.phases.iter().map(|p| p.txs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Processing record for one applied transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResultMeta {
    pub result: TransactionResultPair,
    /// Fee charge and refund mutations, applied before the transaction body.
    pub fee_processing: LedgerEntryChanges,
    pub tx_apply_processing: TransactionMeta,
}

/// A network-wide protocol parameter change voted in by validators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerUpgrade {
    Version(u32),
    BaseFee(u32),
    MaxTxSetSize(u32),
    BaseReserve(u32),
    Flags(u32),
    Config(Hash),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeEntryMeta {
    pub upgrade: LedgerUpgrade,
    pub changes: LedgerEntryChanges,
}

/// Everything a validating node records when it closes a ledger.
///
/// Produced once and never mutated by readers. Synthetic ledgers built by the
/// merger and the replay source are ordinary values of this type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCloseMeta {
    pub ledger_header: LedgerHeaderHistoryEntry,
    pub tx_set: TransactionSet,
    /// One entry per applied transaction, in apply order.
    pub tx_processing: Vec<TransactionResultMeta>,
    pub upgrades_processing: Vec<UpgradeEntryMeta>,
    pub evicted_keys: Vec<LedgerKey>,
}

impl LedgerCloseMeta {
    pub fn sequence(&self) -> u32 {
        self.ledger_header.header.ledger_seq
    }

    pub fn protocol_version(&self) -> u32 {
        self.ledger_header.header.ledger_version
    }

    pub fn hash(&self) -> Hash {
        self.ledger_header.hash
    }

    pub fn previous_hash(&self) -> Hash {
        self.ledger_header.header.previous_ledger_hash
    }

    pub fn close_time(&self) -> u64 {
        self.ledger_header.header.close_time
    }

    pub fn count_transactions(&self) -> usize {
        self.tx_processing.len()
    }

    pub fn envelopes(&self) -> impl Iterator<Item = &TransactionEnvelope> {
        self.tx_set.envelopes()
    }

    pub fn encode(&self) -> Result<Vec<u8>, TypeError> {
        codec::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TypeError> {
        codec::decode(bytes)
    }
}
