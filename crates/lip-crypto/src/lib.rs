//! Hashing primitives for the Ledger Ingestion Pipeline.
//!
//! Provides domain-separated BLAKE3 hashing of transactions and ledger
//! headers, and verification that consecutive ledgers form an unbroken
//! hash chain.

pub mod chain;
pub mod hasher;

pub use chain::{ChainError, LedgerChainVerifier};
pub use hasher::{ledger_header_hash, transaction_hash, ContentHasher, HashError};
