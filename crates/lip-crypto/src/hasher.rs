use lip_types::codec;
use lip_types::{
    AccountId, Hash, LedgerHeader, NetworkId, Transaction, TransactionEnvelope,
    TransactionV1Envelope,
};
use serde::Serialize;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"lip-tx-v1"`) that is prepended
/// to every hash computation, so a transaction and a ledger header with
/// identical bytes produce different hashes.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for transaction signature payloads.
    pub const TRANSACTION: Self = Self {
        domain: "lip-tx-v1",
    };
    /// Hasher for ledger headers.
    pub const LEDGER_HEADER: Self = Self {
        domain: "lip-ledger-v1",
    };
    /// Hasher for transaction sets.
    pub const TX_SET: Self = Self {
        domain: "lip-txset-v1",
    };

    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Hash {
        self.hash_parts(&[data])
    }

    /// Hash several byte slices as one message with domain separation.
    pub fn hash_parts(&self, parts: &[&[u8]]) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        for part in parts {
            hasher.update(part);
        }
        Hash::from_bytes(*hasher.finalize().as_bytes())
    }

    /// Hash the binary encoding of a value.
    pub fn hash_value<T: Serialize>(&self, value: &T) -> Result<Hash, HashError> {
        let data = codec::encode(value).map_err(|e| HashError::Serialization(e.to_string()))?;
        Ok(self.hash(&data))
    }

    pub fn verify(&self, data: &[u8], expected: &Hash) -> bool {
        self.hash(data) == *expected
    }

    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// What a signer commits to. The outer hash of a fee bump covers the whole
/// inner envelope, signatures included.
#[derive(Serialize)]
enum SignaturePayload<'a> {
    Tx(&'a Transaction),
    FeeBump {
        fee_source: &'a AccountId,
        fee: i64,
        inner: &'a TransactionV1Envelope,
    },
}

/// Identity of a transaction on `network`.
///
/// Results are keyed by this hash, so computing it with the wrong network id
/// makes every envelope unmatchable.
pub fn transaction_hash(
    network: &NetworkId,
    envelope: &TransactionEnvelope,
) -> Result<Hash, HashError> {
    let payload = match envelope {
        TransactionEnvelope::Tx(env) => SignaturePayload::Tx(&env.tx),
        TransactionEnvelope::FeeBump(env) => SignaturePayload::FeeBump {
            fee_source: &env.fee_source,
            fee: env.fee,
            inner: &env.inner,
        },
    };
    let data = codec::encode(&payload).map_err(|e| HashError::Serialization(e.to_string()))?;
    Ok(ContentHasher::TRANSACTION.hash_parts(&[network.id().as_bytes(), &data]))
}

/// Hash the network assigns to a closed ledger header.
pub fn ledger_header_hash(header: &LedgerHeader) -> Result<Hash, HashError> {
    ContentHasher::LEDGER_HEADER.hash_value(header)
}

/// Errors from hashing operations.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum HashError {
    #[error("serialization error: {0}")]
    Serialization(String),
}
