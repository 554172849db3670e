use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::Hash;

/// Identifier of the network a ledger belongs to.
///
/// Transaction hashes commit to the network id, so a reader configured for
/// the wrong network cannot match envelopes to their results. The id is an
/// explicit value passed to every reader and source; there is no process-wide
/// default.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId {
    passphrase: String,
    id: Hash,
}

impl NetworkId {
    /// Passphrase of the public test network.
    pub const TESTNET_PASSPHRASE: &'static str = "Test LIP Network ; October 2026";
    /// Passphrase of standalone networks used in integration tests.
    pub const STANDALONE_PASSPHRASE: &'static str = "Standalone LIP Network ; October 2026";

    /// Derive the network id from its passphrase.
    pub fn from_passphrase(passphrase: impl Into<String>) -> Self {
        let passphrase = passphrase.into();
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"lip-network-v1:");
        hasher.update(passphrase.as_bytes());
        Self {
            passphrase,
            id: Hash::from_bytes(*hasher.finalize().as_bytes()),
        }
    }

    pub fn testnet() -> Self {
        Self::from_passphrase(Self::TESTNET_PASSPHRASE)
    }

    pub fn standalone() -> Self {
        Self::from_passphrase(Self::STANDALONE_PASSPHRASE)
    }

    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }

    /// The derived 32-byte id.
    pub fn id(&self) -> &Hash {
        &self.id
    }
}

impl fmt::Debug for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetworkId({:?}, {})", self.passphrase, self.id.short_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        assert_eq!(NetworkId::testnet(), NetworkId::testnet());
        assert_eq!(
            NetworkId::from_passphrase("x").id(),
            NetworkId::from_passphrase("x").id()
        );
    }

    #[test]
    fn different_passphrases_differ() {
        assert_ne!(NetworkId::testnet().id(), NetworkId::standalone().id());
    }

    #[test]
    fn passphrase_is_kept() {
        let net = NetworkId::from_passphrase("my net");
        assert_eq!(net.passphrase(), "my net");
    }
}
