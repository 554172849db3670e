use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use lip_types::{LedgerCloseMeta, LedgerRange};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Result, SourceError};
use crate::state::{AtomicState, SourceState};
use crate::traits::{guarded, LedgerSource};

/// Read access to a store of historical ledgers.
#[async_trait]
pub trait ArchiveReader: Send + Sync {
    /// The ledger with sequence `seq`, `None` if the archive lacks it.
    async fn get_ledger(&self, seq: u32) -> Result<Option<LedgerCloseMeta>>;

    async fn exists(&self, seq: u32) -> Result<bool>;

    /// Highest sequence the archive holds.
    async fn latest_sequence(&self) -> Result<u32>;
}

/// Ledger source reading directly from an archive.
///
/// Preparation only checks that the first requested ledger is present; each
/// `get_ledger` is a point lookup. Requests past the archive's tip fail
/// with [`SourceError::SequenceTooNew`] instead of waiting.
pub struct ArchiveSource<A: ArchiveReader> {
    archive: A,
    closed: CancellationToken,
    state: AtomicState,
    prepared: Mutex<Option<LedgerRange>>,
    cursor: AtomicU32,
}

impl<A: ArchiveReader> ArchiveSource<A> {
    pub fn new(archive: A) -> Self {
        Self {
            archive,
            closed: CancellationToken::new(),
            state: AtomicState::default(),
            prepared: Mutex::new(None),
            cursor: AtomicU32::new(0),
        }
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    fn prepared_range(&self) -> Option<LedgerRange> {
        *self.prepared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_ready(&self) -> Result<LedgerRange> {
        if self.closed.is_cancelled() {
            return Err(SourceError::Closed);
        }
        if self.state.get() != SourceState::Ready {
            return Err(SourceError::NotPrepared);
        }
        self.prepared_range().ok_or(SourceError::NotPrepared)
    }

    async fn check_available(&self, range: LedgerRange, cancel: &CancellationToken) -> Result<()> {
        let latest = guarded(self.archive.latest_sequence(), cancel, &self.closed).await??;
        if range.from > latest {
            return Err(SourceError::SequenceTooNew {
                requested: range.from,
                latest,
            });
        }
        if !guarded(self.archive.exists(range.from), cancel, &self.closed).await?? {
            return Err(SourceError::MissingLedger(range.from));
        }
        Ok(())
    }
}

#[async_trait]
impl<A: ArchiveReader> LedgerSource for ArchiveSource<A> {
    async fn prepare_range(&self, range: LedgerRange, cancel: &CancellationToken) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(SourceError::Closed);
        }
        let range = range.validate()?;
        if let Err(actual) = self
            .state
            .transition(SourceState::Unprepared, SourceState::Preparing)
        {
            return Err(match actual {
                SourceState::Closed => SourceError::Closed,
                _ => SourceError::AlreadyPrepared(self.prepared_range().unwrap_or(range)),
            });
        }
        *self.prepared.lock().unwrap_or_else(PoisonError::into_inner) = Some(range);

        if let Err(e) = self.check_available(range, cancel).await {
            *self.prepared.lock().unwrap_or_else(PoisonError::into_inner) = None;
            self.state
                .transition(SourceState::Preparing, SourceState::Unprepared)
                .ok();
            return Err(e);
        }
        self.cursor.store(range.from, Ordering::SeqCst);
        self.state.set_unless_closed(SourceState::Ready);
        if self.closed.is_cancelled() {
            return Err(SourceError::Closed);
        }
        info!(%range, "archive source ready");
        Ok(())
    }

    async fn is_prepared(&self, range: LedgerRange) -> bool {
        if self.state.get() != SourceState::Ready {
            return false;
        }
        let cursor = self.cursor.load(Ordering::SeqCst);
        self.prepared_range()
            .is_some_and(|prepared| prepared.contains_range(&range) && range.from >= cursor)
    }

    async fn latest_ledger_sequence(&self) -> Result<u32> {
        let range = self.check_ready()?;
        let latest = self.archive.latest_sequence().await?;
        Ok(match range.to {
            Some(to) => latest.min(to),
            None => latest,
        })
    }

    async fn get_ledger(&self, seq: u32, cancel: &CancellationToken) -> Result<LedgerCloseMeta> {
        let range = self.check_ready()?;
        let cursor = self.cursor.load(Ordering::SeqCst);
        if seq < cursor {
            return Err(SourceError::SequenceTooOld {
                requested: seq,
                cursor,
            });
        }
        let latest = guarded(self.archive.latest_sequence(), cancel, &self.closed).await??;
        let latest = range.to.map_or(latest, |to| latest.min(to));
        if seq > latest {
            return Err(SourceError::SequenceTooNew {
                requested: seq,
                latest,
            });
        }

        let ledger = guarded(self.archive.get_ledger(seq), cancel, &self.closed)
            .await??
            .ok_or(SourceError::MissingLedger(seq))?;
        if ledger.sequence() != seq {
            return Err(SourceError::UnexpectedLedger(format!(
                "archive returned ledger {} for {seq}",
                ledger.sequence()
            )));
        }
        // A concurrent caller may have moved past `seq` meanwhile.
        let previous = self.cursor.fetch_max(seq + 1, Ordering::SeqCst);
        if previous > seq {
            return Err(SourceError::SequenceTooOld {
                requested: seq,
                cursor: previous,
            });
        }
        debug!(seq, "served ledger from archive");
        Ok(ledger)
    }

    async fn close(&self) -> Result<()> {
        self.closed.cancel();
        self.state.set(SourceState::Closed);
        Ok(())
    }

    fn state(&self) -> SourceState {
        self.state.get()
    }
}
