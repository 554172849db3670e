use lip_crypto::ChainError;
use lip_stream::StreamError;
use lip_types::{ErrorClass, LedgerRange, TypeError};

/// Errors produced by ledger sources.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source is not prepared")]
    NotPrepared,

    #[error("source is already prepared for {0}")]
    AlreadyPrepared(LedgerRange),

    #[error("prepare_range has already been called")]
    AlreadyCalled,

    #[error("source is closed")]
    Closed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid range: from={from} is after to={to}")]
    InvalidRange { from: u32, to: u32 },

    #[error("ledger {requested} was already passed (next available is {cursor})")]
    SequenceTooOld { requested: u32, cursor: u32 },

    #[error("ledger {requested} is not available yet (latest is {latest})")]
    SequenceTooNew { requested: u32, latest: u32 },

    #[error("ledger {requested} is outside {window}")]
    OutOfRange { requested: u32, window: LedgerRange },

    #[error("malformed ledger {seq}: {reason}")]
    MalformedLedger { seq: u32, reason: String },

    #[error("unexpected ledger: {0}")]
    UnexpectedLedger(String),

    #[error("ledger {0} is missing from the archive")]
    MissingLedger(u32),

    #[error("ledger {seq} uses unsupported feature: {feature}")]
    UnsupportedLedgerFeature { seq: u32, feature: String },

    #[error("node runner error: {0}")]
    Runner(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl SourceError {
    pub fn kind(&self) -> ErrorClass {
        match self {
            Self::NotPrepared | Self::AlreadyPrepared(_) | Self::AlreadyCalled | Self::Closed => {
                ErrorClass::Usage
            }
            Self::InvalidRange { .. }
            | Self::SequenceTooOld { .. }
            | Self::SequenceTooNew { .. }
            | Self::OutOfRange { .. } => ErrorClass::Range,
            Self::MalformedLedger { .. }
            | Self::UnexpectedLedger(_)
            | Self::MissingLedger(_)
            | Self::UnsupportedLedgerFeature { .. } => ErrorClass::Data,
            Self::Runner(_) | Self::Archive(_) | Self::Stream(_) => ErrorClass::Environment,
            Self::Cancelled => ErrorClass::Cancelled,
        }
    }
}

impl From<TypeError> for SourceError {
    fn from(e: TypeError) -> Self {
        match e {
            TypeError::InvalidRange { from, to } => Self::InvalidRange { from, to },
            other => Self::MalformedLedger {
                seq: 0,
                reason: other.to_string(),
            },
        }
    }
}

impl From<ChainError> for SourceError {
    fn from(e: ChainError) -> Self {
        Self::UnexpectedLedger(e.to_string())
    }
}

/// Convenience alias used throughout the backend crate.
pub type Result<T> = std::result::Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes() {
        assert_eq!(SourceError::Closed.kind(), ErrorClass::Usage);
        assert_eq!(SourceError::AlreadyCalled.kind(), ErrorClass::Usage);
        assert_eq!(
            SourceError::SequenceTooOld {
                requested: 1,
                cursor: 2
            }
            .kind(),
            ErrorClass::Range
        );
        assert_eq!(SourceError::MissingLedger(3).kind(), ErrorClass::Data);
        assert_eq!(
            SourceError::Runner("exit 1".into()).kind(),
            ErrorClass::Environment
        );
        assert_eq!(SourceError::Cancelled.kind(), ErrorClass::Cancelled);
    }

    #[test]
    fn invalid_range_type_error_maps_to_range_class() {
        let err: SourceError = LedgerRange::bounded(5, 1).validate().unwrap_err().into();
        assert!(matches!(err, SourceError::InvalidRange { from: 5, to: 1 }));
        assert_eq!(err.kind(), ErrorClass::Range);
    }

    #[test]
    fn chain_errors_are_unexpected_ledgers() {
        let err: SourceError = ChainError::SequenceGap {
            expected: 4,
            actual: 6,
        }
        .into();
        assert_eq!(err.kind(), ErrorClass::Data);
        assert!(err.to_string().contains("expected ledger 4"));
    }
}
