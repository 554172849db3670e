//! Change and transaction extraction for the Ledger Ingestion Pipeline.
//!
//! Turns a [`lip_types::LedgerCloseMeta`] into two ordered streams: the
//! ledger entry changes it caused, each tagged with its cause, and the
//! transactions it applied.
//!
//! - [`ChangeReader`]: Lazy iterator of [`Change`]s in causal order
//! - [`TransactionReader`]: Lazy iterator of [`LedgerTransaction`]s in apply order
//! - [`ChangeStats`]: Change counts by reason, entry type, and kind
//! - [`LedgerBuilder`] / [`PaymentWorkload`]: Well-formed synthetic ledgers

pub mod builder;
pub mod change;
pub mod error;
pub mod reader;
pub mod stats;
pub mod transaction;

pub use builder::{AppliedTransaction, LedgerBuilder, PaymentWorkload};
pub use change::{Change, ChangeKind, ChangeReason, LedgerRef, TransactionRef};
pub use error::ExtractError;
pub use reader::{ledger_changes, ledger_transactions, ChangeReader, TransactionReader};
pub use stats::ChangeStats;
pub use transaction::LedgerTransaction;
