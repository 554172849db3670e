//! Foundation types for the Ledger Ingestion Pipeline (LIP).
//!
//! This crate provides the ledger data model shared by every other LIP
//! crate: the close record a validating node emits for each ledger, the
//! entries and transactions it carries, and the range type used by ledger
//! sources.
//!
//! # Key Types
//!
//! - [`LedgerCloseMeta`]: Raw record of one closed ledger
//! - [`LedgerEntry`] / [`LedgerKey`]: Ledger state and its canonical identifier
//! - [`LedgerEntryChange`]: One recorded state mutation
//! - [`TransactionEnvelope`] / [`TransactionResult`] / [`TransactionMeta`]: Applied transactions
//! - [`LedgerRange`]: Bounded or unbounded window of ledger sequences
//! - [`NetworkId`]: Network a ledger belongs to
//! - [`Hash`]: 32-byte digest

pub mod codec;
pub mod entry;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod network;
pub mod range;
pub mod transaction;

pub use entry::{
    AccountEntry, Asset, ConfigSettingEntry, ContractDataEntry, DataEntry, LedgerEntry,
    LedgerEntryChange, LedgerEntryChanges, LedgerEntryData, LedgerEntryType, LedgerKey,
    OfferEntry, TrustlineEntry,
};
pub use error::{ErrorClass, TypeError};
pub use hash::{AccountId, Hash};
pub use ledger::{
    LedgerCloseMeta, LedgerHeader, LedgerHeaderHistoryEntry, LedgerUpgrade, TransactionPhase,
    TransactionResultMeta, TransactionSet, UpgradeEntryMeta,
};
pub use network::NetworkId;
pub use range::LedgerRange;
pub use transaction::{
    AccountMergeResult, BumpSequenceResultCode, ChangeTrustResultCode, ContractEvent,
    CreateAccountResultCode, DecoratedSignature, FeeBumpEnvelope, InvokeContractResult,
    ManageDataResultCode, Memo, Operation, OperationBody, OperationMeta, OperationResult,
    OperationResultTr, OperationType, PaymentResultCode, Transaction, TransactionEnvelope,
    TransactionMeta, TransactionResult, TransactionResultCode, TransactionResultPair,
    TransactionV1Envelope,
};
