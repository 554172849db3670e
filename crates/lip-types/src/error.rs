use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid ledger range: from={from}, to={to}")]
    InvalidRange { from: u32, to: u32 },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Coarse classification of failures, shared by sources, readers, and the
/// merger so callers can decide whether to retry, fix input, or give up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The caller broke the usage protocol (not prepared, already
    /// prepared, closed).
    Usage,
    /// A sequence or range outside what is available.
    Range,
    /// The ledger data itself is inconsistent or unsupported.
    Data,
    /// The environment failed: I/O, subprocess, archive, storage.
    Environment,
    /// The caller cancelled the operation.
    Cancelled,
}
