use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use lip_stream::StreamConfig;
use lip_types::LedgerCloseMeta;
use tracing::debug;

use crate::archive::ArchiveReader;
use crate::error::{Result, SourceError};

/// Archive held in memory, keyed by sequence.
#[derive(Clone, Default)]
pub struct MemoryArchive {
    ledgers: Arc<RwLock<BTreeMap<u32, LedgerCloseMeta>>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ledgers(ledgers: impl IntoIterator<Item = LedgerCloseMeta>) -> Self {
        let map = ledgers.into_iter().map(|l| (l.sequence(), l)).collect();
        Self {
            ledgers: Arc::new(RwLock::new(map)),
        }
    }

    /// Load every ledger from a ledger stream file.
    pub fn load(path: &Path, config: &StreamConfig) -> Result<Self> {
        let ledgers = lip_stream::read_ledgers(path, config)?;
        debug!(path = %path.display(), count = ledgers.len(), "loaded archive");
        Ok(Self::from_ledgers(ledgers))
    }

    /// Add or replace a ledger.
    pub fn insert(&self, ledger: LedgerCloseMeta) -> Result<()> {
        self.write()?.insert(ledger.sequence(), ledger);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ledgers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<u32, LedgerCloseMeta>>> {
        self.ledgers
            .read()
            .map_err(|_| SourceError::Archive("archive lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<u32, LedgerCloseMeta>>> {
        self.ledgers
            .write()
            .map_err(|_| SourceError::Archive("archive lock poisoned".into()))
    }
}

#[async_trait]
impl ArchiveReader for MemoryArchive {
    async fn get_ledger(&self, seq: u32) -> Result<Option<LedgerCloseMeta>> {
        Ok(self.read()?.get(&seq).cloned())
    }

    async fn exists(&self, seq: u32) -> Result<bool> {
        Ok(self.read()?.contains_key(&seq))
    }

    async fn latest_sequence(&self) -> Result<u32> {
        self.read()?
            .keys()
            .next_back()
            .copied()
            .ok_or_else(|| SourceError::Archive("archive is empty".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lip_extract::PaymentWorkload;
    use lip_types::NetworkId;

    #[tokio::test]
    async fn loads_from_stream_file() {
        let ledgers = PaymentWorkload::new(NetworkId::testnet(), 40, 3)
            .ledgers(4, 2)
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledgers.lips");
        let config = StreamConfig::default();
        lip_stream::write_ledgers(&path, &ledgers, &config).unwrap();

        let archive = MemoryArchive::load(&path, &config).unwrap();
        assert_eq!(archive.len(), 4);
        assert_eq!(archive.latest_sequence().await.unwrap(), 43);
        assert!(archive.exists(41).await.unwrap());
        assert!(!archive.exists(44).await.unwrap());
        assert_eq!(archive.get_ledger(42).await.unwrap(), Some(ledgers[2].clone()));
    }

    #[tokio::test]
    async fn empty_archive_has_no_tip() {
        let archive = MemoryArchive::new();
        assert!(archive.is_empty());
        assert!(matches!(
            archive.latest_sequence().await,
            Err(SourceError::Archive(_))
        ));
        archive
            .insert(
                PaymentWorkload::new(NetworkId::testnet(), 7, 2)
                    .next_ledger(0)
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(archive.latest_sequence().await.unwrap(), 7);
    }

    #[test]
    fn poisoned_lock_keeps_reporting_length() {
        let archive = MemoryArchive::from_ledgers(
            PaymentWorkload::new(NetworkId::testnet(), 5, 2)
                .ledgers(3, 1)
                .unwrap(),
        );
        let shared = archive.clone();
        let result = std::thread::spawn(move || {
            let _guard = shared.ledgers.write().unwrap();
            panic!("writer died");
        })
        .join();
        assert!(result.is_err());

        assert_eq!(archive.len(), 3);
        assert!(!archive.is_empty());
        assert!(matches!(
            archive.insert(PaymentWorkload::new(NetworkId::testnet(), 9, 2).next_ledger(0).unwrap()),
            Err(SourceError::Archive(_))
        ));
    }
}
