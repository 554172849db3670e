//! Deterministic binary encoding for ledger records.
//!
//! Every persisted or hashed value goes through these two functions so the
//! byte layout stays identical across crates.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::TypeError;

/// Serialize a value to bincode bytes.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, TypeError> {
    bincode::serialize(value).map_err(|e| TypeError::Serialization(e.to_string()))
}

/// Deserialize a value from bincode bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TypeError> {
    bincode::deserialize(bytes).map_err(|e| TypeError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Asset, LedgerKey};
    use crate::hash::AccountId;
    use proptest::prelude::*;

    #[test]
    fn key_encoding_is_stable() {
        let key = LedgerKey::Trustline {
            account_id: AccountId::from_seed(1),
            asset: Asset::Credit {
                code: "USD".into(),
                issuer: AccountId::from_seed(2),
            },
        };
        assert_eq!(encode(&key).unwrap(), encode(&key.clone()).unwrap());
        let back: LedgerKey = decode(&encode(&key).unwrap()).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let bytes = encode(&LedgerKey::ConfigSetting { setting_id: 9 }).unwrap();
        let result: Result<LedgerKey, _> = decode(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(TypeError::Serialization(_))));
    }

    proptest! {
        #[test]
        fn data_keys_survive_encoding(seed in any::<u8>(), name in ".{0,32}") {
            let key = LedgerKey::Data { account_id: AccountId::from_seed(seed), name };
            let back: LedgerKey = decode(&encode(&key).unwrap()).unwrap();
            prop_assert_eq!(back, key);
        }
    }
}
