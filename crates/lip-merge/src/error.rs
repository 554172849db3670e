use lip_extract::ExtractError;
use lip_types::ErrorClass;

/// Errors produced while merging ledgers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("ledger {seq} carries {feature}, which cannot be merged")]
    UnsupportedLedgerFeature { seq: u32, feature: String },

    #[error(
        "ledger {seq} with {transactions} transactions overflows batch of {batch_size} \
         ({accumulated} already accumulated)"
    )]
    BatchOverflow {
        seq: u32,
        transactions: usize,
        accumulated: usize,
        batch_size: usize,
    },

    #[error("ledger {seq} has protocol version {actual}, batch started with {expected}")]
    ProtocolVersionMismatch { seq: u32, expected: u32, actual: u32 },

    #[error("trailing batch holds {transactions} of {batch_size} transactions")]
    IncompleteBatch {
        transactions: usize,
        batch_size: usize,
    },

    #[error("merged ledgers are not equivalent to their sources: {0}")]
    NotEquivalent(String),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl MergeError {
    pub fn kind(&self) -> ErrorClass {
        match self {
            Self::InvalidBatchSize => ErrorClass::Usage,
            _ => ErrorClass::Data,
        }
    }
}

pub type Result<T> = std::result::Result<T, MergeError>;
