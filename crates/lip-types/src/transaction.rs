use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entry::{Asset, LedgerEntryChanges};
use crate::hash::{AccountId, Hash};

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Tag shared by [`OperationBody`] and [`OperationResultTr`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    CreateAccount,
    Payment,
    ChangeTrust,
    ManageData,
    BumpSequence,
    AccountMerge,
    InvokeContract,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CreateAccount => "create_account",
            Self::Payment => "payment",
            Self::ChangeTrust => "change_trust",
            Self::ManageData => "manage_data",
            Self::BumpSequence => "bump_sequence",
            Self::AccountMerge => "account_merge",
            Self::InvokeContract => "invoke_contract",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationBody {
    CreateAccount {
        destination: AccountId,
        starting_balance: i64,
    },
    Payment {
        destination: AccountId,
        asset: Asset,
        amount: i64,
    },
    ChangeTrust {
        asset: Asset,
        limit: i64,
    },
    ManageData {
        name: String,
        value: Option<Vec<u8>>,
    },
    BumpSequence {
        bump_to: i64,
    },
    AccountMerge {
        destination: AccountId,
    },
    InvokeContract {
        contract: Hash,
        function: String,
        args: Vec<Vec<u8>>,
    },
}

impl OperationBody {
    pub fn operation_type(&self) -> OperationType {
        match self {
            Self::CreateAccount { .. } => OperationType::CreateAccount,
            Self::Payment { .. } => OperationType::Payment,
            Self::ChangeTrust { .. } => OperationType::ChangeTrust,
            Self::ManageData { .. } => OperationType::ManageData,
            Self::BumpSequence { .. } => OperationType::BumpSequence,
            Self::AccountMerge { .. } => OperationType::AccountMerge,
            Self::InvokeContract { .. } => OperationType::InvokeContract,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Overrides the transaction source for this operation when set.
    pub source_account: Option<AccountId>,
    pub body: OperationBody,
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Memo {
    None,
    Text(String),
    Id(u64),
    Hash(Hash),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub source_account: AccountId,
    pub fee: u32,
    pub seq_num: i64,
    pub memo: Memo,
    pub operations: Vec<Operation>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoratedSignature {
    pub hint: [u8; 4],
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionV1Envelope {
    pub tx: Transaction,
    pub signatures: Vec<DecoratedSignature>,
}

/// A transaction whose fee is paid by an account other than its source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBumpEnvelope {
    pub fee_source: AccountId,
    pub fee: i64,
    pub inner: TransactionV1Envelope,
    pub signatures: Vec<DecoratedSignature>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionEnvelope {
    Tx(TransactionV1Envelope),
    FeeBump(FeeBumpEnvelope),
}

impl TransactionEnvelope {
    /// The transaction that is actually applied (inner one for fee bumps).
    pub fn inner_transaction(&self) -> &Transaction {
        match self {
            Self::Tx(env) => &env.tx,
            Self::FeeBump(env) => &env.inner.tx,
        }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.inner_transaction().operations
    }

    pub fn source_account(&self) -> AccountId {
        self.inner_transaction().source_account
    }

    /// The account charged the fee.
    pub fn fee_account(&self) -> AccountId {
        match self {
            Self::Tx(env) => env.tx.source_account,
            Self::FeeBump(env) => env.fee_source,
        }
    }

    pub fn is_fee_bump(&self) -> bool {
        matches!(self, Self::FeeBump(_))
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionResultCode {
    Success,
    Failed,
    FeeBumpInnerSuccess,
    FeeBumpInnerFailed,
    TooEarly,
    TooLate,
    MissingOperation,
    BadSeq,
    BadAuth,
    InsufficientBalance,
    NoAccount,
    InsufficientFee,
    InternalError,
}

impl TransactionResultCode {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::FeeBumpInnerSuccess)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateAccountResultCode {
    Success,
    Malformed,
    Underfunded,
    AlreadyExists,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentResultCode {
    Success,
    Malformed,
    Underfunded,
    NoDestination,
    NoTrust,
    LineFull,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeTrustResultCode {
    Success,
    Malformed,
    NoIssuer,
    InvalidLimit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManageDataResultCode {
    Success,
    NotSupportedYet,
    NameNotFound,
    LowReserve,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BumpSequenceResultCode {
    Success,
    BadSeq,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountMergeResult {
    /// Balance moved to the destination.
    Success { source_balance: i64 },
    Malformed,
    NoAccount,
    HasSubEntries,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvokeContractResult {
    /// Hash of the contract return value and emitted events.
    Success(Hash),
    Malformed,
    Trapped,
    ResourceLimitExceeded,
}

/// Result body of an applied operation, one variant per operation type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationResultTr {
    CreateAccount(CreateAccountResultCode),
    Payment(PaymentResultCode),
    ChangeTrust(ChangeTrustResultCode),
    ManageData(ManageDataResultCode),
    BumpSequence(BumpSequenceResultCode),
    AccountMerge(AccountMergeResult),
    InvokeContract(InvokeContractResult),
}

impl OperationResultTr {
    pub fn operation_type(&self) -> OperationType {
        match self {
            Self::CreateAccount(_) => OperationType::CreateAccount,
            Self::Payment(_) => OperationType::Payment,
            Self::ChangeTrust(_) => OperationType::ChangeTrust,
            Self::ManageData(_) => OperationType::ManageData,
            Self::BumpSequence(_) => OperationType::BumpSequence,
            Self::AccountMerge(_) => OperationType::AccountMerge,
            Self::InvokeContract(_) => OperationType::InvokeContract,
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            Self::CreateAccount(code) => *code == CreateAccountResultCode::Success,
            Self::Payment(code) => *code == PaymentResultCode::Success,
            Self::ChangeTrust(code) => *code == ChangeTrustResultCode::Success,
            Self::ManageData(code) => *code == ManageDataResultCode::Success,
            Self::BumpSequence(code) => *code == BumpSequenceResultCode::Success,
            Self::AccountMerge(result) => matches!(result, AccountMergeResult::Success { .. }),
            Self::InvokeContract(result) => matches!(result, InvokeContractResult::Success(_)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationResult {
    Inner(OperationResultTr),
    BadAuth,
    NoAccount,
    NotSupported,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub fee_charged: i64,
    pub code: TransactionResultCode,
    pub op_results: Vec<OperationResult>,
}

impl TransactionResult {
    pub fn successful(&self) -> bool {
        self.code.is_success()
    }
}

/// A transaction result keyed by the hash of the transaction it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResultPair {
    pub transaction_hash: Hash,
    pub result: TransactionResult,
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// State mutations caused by one operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationMeta {
    pub changes: LedgerEntryChanges,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub contract: Option<Hash>,
    pub topics: Vec<Vec<u8>>,
    pub data: Vec<u8>,
}

/// How applying a transaction mutated ledger state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionMeta {
    V1 {
        operations: Vec<OperationMeta>,
        /// Transaction-level mutations such as the sequence number bump.
        tx_changes: LedgerEntryChanges,
    },
    V2 {
        operations: Vec<OperationMeta>,
        tx_changes: LedgerEntryChanges,
        events: Vec<ContractEvent>,
        return_value: Option<Vec<u8>>,
    },
}

impl TransactionMeta {
    pub fn operations(&self) -> &[OperationMeta] {
        match self {
            Self::V1 { operations, .. } | Self::V2 { operations, .. } => operations,
        }
    }

    pub fn tx_changes(&self) -> &LedgerEntryChanges {
        match self {
            Self::V1 { tx_changes, .. } | Self::V2 { tx_changes, .. } => tx_changes,
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            Self::V1 { .. } => 1,
            Self::V2 { .. } => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(source: u8) -> Transaction {
        Transaction {
            source_account: AccountId::from_seed(source),
            fee: 100,
            seq_num: 1,
            memo: Memo::None,
            operations: vec![Operation {
                source_account: None,
                body: OperationBody::BumpSequence { bump_to: 10 },
            }],
        }
    }

    #[test]
    fn fee_bump_charges_fee_source() {
        let inner = TransactionV1Envelope {
            tx: tx(1),
            signatures: vec![],
        };
        let env = TransactionEnvelope::FeeBump(FeeBumpEnvelope {
            fee_source: AccountId::from_seed(2),
            fee: 400,
            inner,
            signatures: vec![],
        });
        assert_eq!(env.source_account(), AccountId::from_seed(1));
        assert_eq!(env.fee_account(), AccountId::from_seed(2));
        assert_eq!(env.operations().len(), 1);
        assert!(env.is_fee_bump());
    }

    #[test]
    fn result_and_body_types_line_up() {
        let body = OperationBody::Payment {
            destination: AccountId::from_seed(3),
            asset: Asset::Native,
            amount: 5,
        };
        let result = OperationResultTr::Payment(PaymentResultCode::Success);
        assert_eq!(body.operation_type(), result.operation_type());
        assert!(result.is_success());
        assert!(!OperationResultTr::Payment(PaymentResultCode::Underfunded).is_success());
    }

    #[test]
    fn fee_bump_inner_success_counts_as_success() {
        assert!(TransactionResultCode::FeeBumpInnerSuccess.is_success());
        assert!(!TransactionResultCode::FeeBumpInnerFailed.is_success());
        assert!(!TransactionResultCode::InternalError.is_success());
    }

    #[test]
    fn meta_accessors() {
        let meta = TransactionMeta::V2 {
            operations: vec![OperationMeta::default(); 3],
            tx_changes: vec![],
            events: vec![],
            return_value: None,
        };
        assert_eq!(meta.operations().len(), 3);
        assert_eq!(meta.version(), 2);
        assert!(meta.tx_changes().is_empty());
    }
}
