use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use lip_backend::state::AtomicState;
use lip_backend::{guarded, LedgerSource, Result, SourceError, SourceState};
use lip_merge::{append_ledger, check_appendable, MergeError};
use lip_types::{LedgerCloseMeta, LedgerRange};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fixtures::ReplayFixtures;

/// Range asked for by `prepare_range` and the window actually served.
#[derive(Clone, Copy, Debug)]
struct Prepared {
    requested: LedgerRange,
    window: LedgerRange,
}

/// Replays ledgers from an inner source with fixture transactions spliced
/// in, handing them out no faster than one per `ledger_close_duration`.
///
/// The replay window starts at the prepared `from` and spans one ledger
/// per fixture ledger after it: the first ledger creates every fixture
/// entry through a flags upgrade, each later ledger gains one fixture
/// ledger's transactions. The whole window is built by `prepare_range`.
pub struct ReplaySource<S: LedgerSource> {
    inner: S,
    fixtures: ReplayFixtures,
    ledger_close_duration: Duration,
    closed: CancellationToken,
    state: AtomicState,
    called: AtomicBool,
    prepared: Mutex<Option<Prepared>>,
    cursor: AtomicU32,
    ledgers: tokio::sync::Mutex<Vec<Option<LedgerCloseMeta>>>,
}

impl<S: LedgerSource> ReplaySource<S> {
    pub fn new(inner: S, fixtures: ReplayFixtures, ledger_close_duration: Duration) -> Self {
        Self {
            inner,
            fixtures,
            ledger_close_duration,
            closed: CancellationToken::new(),
            state: AtomicState::default(),
            called: AtomicBool::new(false),
            prepared: Mutex::new(None),
            cursor: AtomicU32::new(0),
            ledgers: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Window covered by the fixtures when replay starts at `from`.
    pub fn window_from(&self, from: u32) -> LedgerRange {
        let span = u32::try_from(self.fixtures.ledgers.len()).unwrap_or(u32::MAX);
        LedgerRange::bounded(from, from.saturating_add(span))
    }

    fn prepared(&self) -> Option<Prepared> {
        *self.prepared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_ready(&self) -> Result<LedgerRange> {
        if self.closed.is_cancelled() {
            return Err(SourceError::Closed);
        }
        if self.state.get() != SourceState::Ready {
            return Err(SourceError::NotPrepared);
        }
        self.prepared()
            .map(|p| p.window)
            .ok_or(SourceError::NotPrepared)
    }

    /// Fetch every window ledger from the inner source and splice fixtures in.
    async fn build(&self, window: LedgerRange, cancel: &CancellationToken) -> Result<Vec<LedgerCloseMeta>> {
        let end = window.to.unwrap_or(window.from);
        let mut built = Vec::with_capacity((end - window.from + 1) as usize);

        let mut first = self.inner.get_ledger(window.from, cancel).await?;
        first.upgrades_processing.insert(0, self.fixtures.seed_upgrade());
        built.push(first);

        for (seq, fixture) in (window.from + 1..=end).zip(&self.fixtures.ledgers) {
            let mut ledger = self.inner.get_ledger(seq, cancel).await?;
            check_appendable(&ledger, fixture).map_err(|e| splice_error(seq, e))?;
            append_ledger(&mut ledger, fixture);
            debug!(
                seq,
                transactions = ledger.count_transactions(),
                "spliced fixture ledger"
            );
            built.push(ledger);
        }
        Ok(built)
    }

    async fn prepare_window(&self, range: LedgerRange, cancel: &CancellationToken) -> Result<LedgerRange> {
        let available = self.window_from(range.from);
        let window = match range.to {
            Some(to) if available.to.is_some_and(|end| to > end) => {
                return Err(SourceError::OutOfRange {
                    requested: to,
                    window: available,
                })
            }
            Some(to) => LedgerRange::bounded(range.from, to),
            None => available,
        };

        self.inner.prepare_range(window, cancel).await?;
        let built = guarded(self.build(window, cancel), cancel, &self.closed).await??;
        *self.ledgers.lock().await = built.into_iter().map(Some).collect();
        Ok(window)
    }
}

#[async_trait]
impl<S: LedgerSource> LedgerSource for ReplaySource<S> {
    async fn prepare_range(&self, range: LedgerRange, cancel: &CancellationToken) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(SourceError::Closed);
        }
        let range = range.validate()?;
        if self.called.swap(true, Ordering::SeqCst) {
            return Err(SourceError::AlreadyCalled);
        }
        if self
            .state
            .transition(SourceState::Unprepared, SourceState::Preparing)
            .is_err()
        {
            return Err(SourceError::Closed);
        }

        match self.prepare_window(range, cancel).await {
            Ok(window) => {
                *self.prepared.lock().unwrap_or_else(PoisonError::into_inner) = Some(Prepared {
                    requested: range,
                    window,
                });
                self.cursor.store(window.from, Ordering::SeqCst);
                self.state.set_unless_closed(SourceState::Ready);
                if self.closed.is_cancelled() {
                    return Err(SourceError::Closed);
                }
                info!(
                    %window,
                    fixtures = self.fixtures.ledgers.len(),
                    entries = self.fixtures.entries.len(),
                    "replay prepared"
                );
                Ok(())
            }
            Err(e) => {
                warn!(%range, error = %e, "replay preparation failed");
                self.state
                    .transition(SourceState::Preparing, SourceState::Unprepared)
                    .ok();
                Err(e)
            }
        }
    }

    async fn is_prepared(&self, range: LedgerRange) -> bool {
        if self.state.get() != SourceState::Ready {
            return false;
        }
        let cursor = self.cursor.load(Ordering::SeqCst);
        self.prepared().is_some_and(|p| {
            (p.requested.contains_range(&range) || p.window.contains_range(&range))
                && range.from >= cursor
        })
    }

    async fn latest_ledger_sequence(&self) -> Result<u32> {
        let window = self.check_ready()?;
        Ok(window.to.unwrap_or(window.from))
    }

    async fn get_ledger(&self, seq: u32, cancel: &CancellationToken) -> Result<LedgerCloseMeta> {
        let called_at = Instant::now();
        let window = self.check_ready()?;
        if !window.contains(seq) {
            return Err(SourceError::OutOfRange {
                requested: seq,
                window,
            });
        }
        let cursor = self.cursor.load(Ordering::SeqCst);
        if seq < cursor {
            return Err(SourceError::SequenceTooOld {
                requested: seq,
                cursor,
            });
        }

        let mut ledgers = guarded(self.ledgers.lock(), cancel, &self.closed).await?;
        guarded(
            tokio::time::sleep_until(called_at + self.ledger_close_duration),
            cancel,
            &self.closed,
        )
        .await?;

        let cursor = self.cursor.load(Ordering::SeqCst);
        if seq < cursor {
            return Err(SourceError::SequenceTooOld {
                requested: seq,
                cursor,
            });
        }
        let ledger = ledgers
            .get_mut((seq - window.from) as usize)
            .and_then(Option::take)
            .ok_or(SourceError::MissingLedger(seq))?;
        self.cursor.store(seq + 1, Ordering::SeqCst);
        debug!(seq, "replayed ledger");
        Ok(ledger)
    }

    async fn close(&self) -> Result<()> {
        self.closed.cancel();
        self.state.set(SourceState::Closed);
        if let Ok(mut ledgers) = self.ledgers.try_lock() {
            ledgers.clear();
        }
        self.inner.close().await
    }

    fn state(&self) -> SourceState {
        self.state.get()
    }
}

/// A fixture ledger that cannot be spliced into replayed ledger `seq`.
fn splice_error(seq: u32, e: MergeError) -> SourceError {
    match e {
        MergeError::UnsupportedLedgerFeature { seq, feature } => {
            SourceError::UnsupportedLedgerFeature { seq, feature }
        }
        other => SourceError::MalformedLedger {
            seq,
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lip_backend::{ArchiveSource, MemoryArchive};
    use lip_extract::{ledger_changes, ledger_transactions, ChangeReason, PaymentWorkload};
    use lip_types::{LedgerUpgrade, NetworkId, UpgradeEntryMeta};
    use std::sync::Arc;

    fn net() -> NetworkId {
        NetworkId::testnet()
    }

    fn network_ledgers() -> Vec<LedgerCloseMeta> {
        PaymentWorkload::new(net(), 10, 2).ledgers(10, 1).unwrap()
    }

    fn fixtures(count: usize) -> ReplayFixtures {
        let mut workload = PaymentWorkload::new(net(), 2, 5);
        let entries = workload.entries();
        ReplayFixtures::new(workload.ledgers(count, 3).unwrap(), entries)
    }

    fn replay(fixture_ledgers: usize, close: Duration) -> ReplaySource<ArchiveSource<MemoryArchive>> {
        let archive = ArchiveSource::new(MemoryArchive::from_ledgers(network_ledgers()));
        ReplaySource::new(archive, fixtures(fixture_ledgers), close)
    }

    #[tokio::test]
    async fn protocol_is_enforced() {
        let src = replay(3, Duration::ZERO);
        let cancel = CancellationToken::new();
        let range = LedgerRange::unbounded(12);

        assert!(matches!(
            src.get_ledger(12, &cancel).await,
            Err(SourceError::NotPrepared)
        ));
        src.prepare_range(range, &cancel).await.unwrap();
        assert!(src.is_prepared(range).await);
        assert!(src.is_prepared(LedgerRange::unbounded(13)).await);
        assert!(src.is_prepared(LedgerRange::bounded(12, 15)).await);
        assert!(!src.is_prepared(LedgerRange::unbounded(11)).await);
        assert_eq!(src.latest_ledger_sequence().await.unwrap(), 15);

        assert!(matches!(
            src.get_ledger(11, &cancel).await,
            Err(SourceError::OutOfRange { requested: 11, .. })
        ));
        assert!(matches!(
            src.get_ledger(16, &cancel).await,
            Err(SourceError::OutOfRange { requested: 16, .. })
        ));
        for seq in 12..=15 {
            assert_eq!(src.get_ledger(seq, &cancel).await.unwrap().sequence(), seq);
        }
        assert!(matches!(
            src.get_ledger(14, &cancel).await,
            Err(SourceError::SequenceTooOld { requested: 14, cursor: 16 })
        ));
        assert!(!src.is_prepared(range).await);
        assert!(matches!(
            src.prepare_range(range, &cancel).await,
            Err(SourceError::AlreadyCalled)
        ));
    }

    #[tokio::test]
    async fn first_ledger_seeds_fixture_entries() {
        let src = replay(2, Duration::ZERO);
        let cancel = CancellationToken::new();
        src.prepare_range(LedgerRange::bounded(10, 12), &cancel)
            .await
            .unwrap();

        let first = src.get_ledger(10, &cancel).await.unwrap();
        assert_eq!(first.count_transactions(), 1);
        let changes = ledger_changes(&first, &net()).unwrap();
        let seeded: Vec<_> = changes
            .iter()
            .take_while(|c| c.reason == ChangeReason::Upgrade)
            .collect();
        assert_eq!(seeded.len(), 5);
        assert!(seeded.iter().all(|c| c.pre.is_none() && c.transaction.is_none()));

        let second = src.get_ledger(11, &cancel).await.unwrap();
        assert_eq!(second.count_transactions(), 1 + 3);
        let txs = ledger_transactions(&second, &net()).unwrap();
        assert_eq!(txs.len(), 4);
        assert!(txs.iter().all(|t| t.successful()));
    }

    #[tokio::test]
    async fn bounded_range_past_fixtures_is_out_of_range() {
        let src = replay(2, Duration::ZERO);
        let cancel = CancellationToken::new();
        let err = src
            .prepare_range(LedgerRange::bounded(10, 13), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::OutOfRange { requested: 13, .. }));
        assert!(matches!(
            src.prepare_range(LedgerRange::bounded(10, 12), &cancel).await,
            Err(SourceError::AlreadyCalled)
        ));
    }

    #[tokio::test]
    async fn inner_failures_propagate() {
        let src = replay(3, Duration::ZERO);
        let err = src
            .prepare_range(LedgerRange::unbounded(18), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::SequenceTooNew { .. }));
        assert_eq!(src.state(), SourceState::Unprepared);
    }

    #[tokio::test]
    async fn ledgers_are_paced() {
        let close = Duration::from_millis(40);
        let src = replay(2, close);
        let cancel = CancellationToken::new();
        src.prepare_range(LedgerRange::bounded(10, 12), &cancel)
            .await
            .unwrap();
        let start = std::time::Instant::now();
        for seq in 10..=12 {
            src.get_ledger(seq, &cancel).await.unwrap();
        }
        assert!(start.elapsed() >= close * 3);
    }

    #[tokio::test]
    async fn pacing_is_cancellable() {
        let src = replay(2, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        src.prepare_range(LedgerRange::bounded(10, 12), &cancel)
            .await
            .unwrap();
        let c = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            c.cancel();
        });
        let err = tokio::time::timeout(Duration::from_secs(5), src.get_ledger(10, &cancel))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, SourceError::Cancelled));

        // The ledger was not consumed.
        let fresh = CancellationToken::new();
        let src = Arc::new(src);
        let waiting = {
            let src = Arc::clone(&src);
            tokio::spawn(async move { src.get_ledger(10, &fresh).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        src.close().await.unwrap();
        let err = tokio::time::timeout(Duration::from_secs(5), waiting)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, SourceError::Closed));
    }

    #[tokio::test]
    async fn close_twice_closes_inner() {
        let src = replay(1, Duration::ZERO);
        let cancel = CancellationToken::new();
        src.prepare_range(LedgerRange::bounded(10, 11), &cancel)
            .await
            .unwrap();
        assert!(src.close().await.is_ok());
        assert!(src.close().await.is_ok());
        assert_eq!(src.inner().state(), SourceState::Closed);
        assert!(matches!(
            src.get_ledger(10, &cancel).await,
            Err(SourceError::Closed)
        ));
    }

    fn replay_with(fixtures: ReplayFixtures) -> ReplaySource<ArchiveSource<MemoryArchive>> {
        let archive = ArchiveSource::new(MemoryArchive::from_ledgers(network_ledgers()));
        ReplaySource::new(archive, fixtures, Duration::ZERO)
    }

    #[tokio::test]
    async fn fixtures_with_upgrades_or_evictions_are_rejected() {
        let mut workload = PaymentWorkload::new(net(), 2, 5);
        let entries = workload.entries();
        let mut ledgers = workload.ledgers(1, 3).unwrap();
        ledgers[0].upgrades_processing.push(UpgradeEntryMeta {
            upgrade: LedgerUpgrade::Flags(2),
            changes: vec![],
        });
        ledgers[0].evicted_keys.push(entries[0].key());

        let src = replay_with(ReplayFixtures::new(ledgers, entries));
        let err = src
            .prepare_range(LedgerRange::bounded(12, 13), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedLedgerFeature { seq: 2, .. }));
        assert_eq!(src.state(), SourceState::Unprepared);
        assert!(!src.is_prepared(LedgerRange::bounded(12, 13)).await);
    }

    #[tokio::test]
    async fn fixtures_from_another_protocol_are_rejected() {
        let mut workload = PaymentWorkload::new(net(), 2, 5).with_protocol_version(20);
        let entries = workload.entries();
        let fixtures = ReplayFixtures::new(workload.ledgers(2, 3).unwrap(), entries);

        let src = replay_with(fixtures);
        let err = src
            .prepare_range(LedgerRange::unbounded(12), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::MalformedLedger { seq: 13, .. }));
        assert!(err.to_string().contains("protocol"));
    }
}
