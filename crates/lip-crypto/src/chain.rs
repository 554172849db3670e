use lip_types::{Hash, LedgerCloseMeta};
use tracing::debug;

use crate::hasher::{ledger_header_hash, HashError};

/// Ledger hash-chain integrity verifier.
///
/// Checks that each observed ledger directly follows the previous one: its
/// sequence is one higher and its previous-ledger hash matches the hash of
/// the ledger before it. Optionally recomputes each header hash.
#[derive(Debug, Default)]
pub struct LedgerChainVerifier {
    last: Option<(u32, Hash)>,
    verify_headers: bool,
}

impl LedgerChainVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also recompute every header hash and compare it to the recorded one.
    pub fn with_header_verification(mut self) -> Self {
        self.verify_headers = true;
        self
    }

    /// Start from a known ledger instead of the first observed one.
    pub fn anchored(mut self, seq: u32, hash: Hash) -> Self {
        self.last = Some((seq, hash));
        self
    }

    /// Sequence of the last accepted ledger.
    pub fn last_sequence(&self) -> Option<u32> {
        self.last.map(|(seq, _)| seq)
    }

    /// Sequence the next ledger must carry, if any ledger was accepted.
    pub fn expected_next(&self) -> Option<u32> {
        self.last.map(|(seq, _)| seq + 1)
    }

    /// Accept `ledger` as the next link, or explain why it does not fit.
    ///
    /// A rejected ledger leaves the verifier unchanged.
    pub fn observe(&mut self, ledger: &LedgerCloseMeta) -> Result<(), ChainError> {
        let seq = ledger.sequence();
        if let Some((last_seq, last_hash)) = self.last {
            if seq != last_seq + 1 {
                return Err(ChainError::SequenceGap {
                    expected: last_seq + 1,
                    actual: seq,
                });
            }
            if ledger.previous_hash() != last_hash {
                return Err(ChainError::BrokenLink {
                    seq,
                    expected: last_hash,
                    actual: ledger.previous_hash(),
                });
            }
        }
        if self.verify_headers {
            let computed = ledger_header_hash(&ledger.ledger_header.header)?;
            if computed != ledger.hash() {
                return Err(ChainError::HeaderHashMismatch { seq });
            }
        }
        debug!(seq, hash = %ledger.hash().short_hex(), "ledger chained");
        self.last = Some((seq, ledger.hash()));
        Ok(())
    }

    /// Verify a complete run of ledgers.
    pub fn verify_chain(ledgers: &[LedgerCloseMeta]) -> Result<(), ChainError> {
        let mut verifier = Self::new();
        ledgers.iter().try_for_each(|l| verifier.observe(l))
    }
}

/// Errors from chain verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("sequence gap: expected ledger {expected}, got {actual}")]
    SequenceGap { expected: u32, actual: u32 },

    #[error("broken link at ledger {seq}: previous hash {actual} does not match {expected}")]
    BrokenLink {
        seq: u32,
        expected: Hash,
        actual: Hash,
    },

    #[error("header hash mismatch at ledger {seq}")]
    HeaderHashMismatch { seq: u32 },

    #[error(transparent)]
    Hash(#[from] HashError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use lip_types::{LedgerHeader, LedgerHeaderHistoryEntry, TransactionSet};

    fn ledger(seq: u32, prev: Hash) -> LedgerCloseMeta {
        let header = LedgerHeader {
            ledger_seq: seq,
            ledger_version: 21,
            previous_ledger_hash: prev,
            tx_set_hash: Hash::zero(),
            close_time: 1_000 + u64::from(seq),
            base_fee: 100,
            base_reserve: 100,
            flags: 0,
        };
        LedgerCloseMeta {
            ledger_header: LedgerHeaderHistoryEntry {
                hash: ledger_header_hash(&header).unwrap(),
                header,
            },
            tx_set: TransactionSet::default(),
            tx_processing: vec![],
            upgrades_processing: vec![],
            evicted_keys: vec![],
        }
    }

    fn build_chain(start: u32, count: u32) -> Vec<LedgerCloseMeta> {
        let mut chain = Vec::new();
        let mut prev = Hash::zero();
        for seq in start..start + count {
            let l = ledger(seq, prev);
            prev = l.hash();
            chain.push(l);
        }
        chain
    }

    #[test]
    fn empty_chain_is_valid() {
        assert!(LedgerChainVerifier::verify_chain(&[]).is_ok());
    }

    #[test]
    fn linked_chain_is_valid() {
        assert!(LedgerChainVerifier::verify_chain(&build_chain(10, 8)).is_ok());
    }

    #[test]
    fn gap_detected() {
        let mut chain = build_chain(1, 3);
        chain.remove(1);
        let err = LedgerChainVerifier::verify_chain(&chain).unwrap_err();
        assert_eq!(
            err,
            ChainError::SequenceGap {
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn broken_link_detected() {
        let mut chain = build_chain(1, 3);
        chain[2].ledger_header.header.previous_ledger_hash = Hash::from_bytes([9; 32]);
        let err = LedgerChainVerifier::verify_chain(&chain).unwrap_err();
        assert!(matches!(err, ChainError::BrokenLink { seq: 3, .. }));
    }

    #[test]
    fn rejected_ledger_leaves_state() {
        let chain = build_chain(1, 3);
        let mut verifier = LedgerChainVerifier::new();
        verifier.observe(&chain[0]).unwrap();
        assert!(verifier.observe(&chain[2]).is_err());
        assert_eq!(verifier.last_sequence(), Some(1));
        verifier.observe(&chain[1]).unwrap();
        assert_eq!(verifier.expected_next(), Some(3));
    }

    #[test]
    fn header_verification_catches_tampering() {
        let mut l = ledger(4, Hash::zero());
        l.ledger_header.header.base_fee = 1;
        let mut plain = LedgerChainVerifier::new();
        assert!(plain.observe(&l).is_ok());
        let mut strict = LedgerChainVerifier::new().with_header_verification();
        assert_eq!(
            strict.observe(&l).unwrap_err(),
            ChainError::HeaderHashMismatch { seq: 4 }
        );
    }

    #[test]
    fn anchor_constrains_first_ledger() {
        let chain = build_chain(5, 2);
        let mut verifier = LedgerChainVerifier::new().anchored(5, chain[0].hash());
        assert!(verifier.observe(&chain[1]).is_ok());
        let mut wrong = LedgerChainVerifier::new().anchored(5, Hash::zero());
        assert!(wrong.observe(&chain[1]).is_err());
    }
}
