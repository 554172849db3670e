use lip_crypto::HashError;

/// Errors produced while decoding a ledger into changes or transactions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("malformed ledger {seq}: {reason}")]
    MalformedLedger { seq: u32, reason: String },

    #[error(transparent)]
    Hash(#[from] HashError),
}

impl ExtractError {
    pub(crate) fn malformed(seq: u32, reason: impl Into<String>) -> Self {
        Self::MalformedLedger {
            seq,
            reason: reason.into(),
        }
    }
}
