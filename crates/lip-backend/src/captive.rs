use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use lip_crypto::LedgerChainVerifier;
use lip_types::{LedgerCloseMeta, LedgerRange};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CaptiveConfig;
use crate::error::{Result, SourceError};
use crate::runner::{MetaStream, NodeRunner};
use crate::state::{AtomicState, SourceState};
use crate::traits::{guarded, LedgerSource};

type Buffered = Result<LedgerCloseMeta>;

/// Ledger source backed by a validating node run as a collaborator.
///
/// `prepare_range` starts the node and a background task that forwards its
/// ledgers into a bounded buffer, then reads ahead to the first requested
/// ledger. Every ledger coming off the buffer is checked against the
/// previous one for sequence continuity and hash linkage.
pub struct CaptiveSource<R: NodeRunner> {
    runner: R,
    config: CaptiveConfig,
    /// Cancelled by `close()`; parent of the background task's token.
    closed: CancellationToken,
    state: AtomicState,
    prepared: Mutex<Option<LedgerRange>>,
    /// Next sequence the consumer may request; 0 before preparation.
    cursor: AtomicU32,
    /// Highest sequence the node has emitted so far.
    latest_seen: Arc<AtomicU32>,
    inner: tokio::sync::Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    buffer: Option<mpsc::Receiver<Buffered>>,
    task_token: Option<CancellationToken>,
    /// Ledger read ahead by `prepare_range`, served by the first `get_ledger`.
    cached: Option<LedgerCloseMeta>,
    chain: LedgerChainVerifier,
}

impl Inner {
    fn stop(&mut self) {
        if let Some(token) = self.task_token.take() {
            token.cancel();
        }
        self.buffer = None;
        self.cached = None;
    }
}

impl<R: NodeRunner> CaptiveSource<R> {
    pub fn new(runner: R, config: CaptiveConfig) -> Self {
        Self {
            runner,
            config,
            closed: CancellationToken::new(),
            state: AtomicState::default(),
            prepared: Mutex::new(None),
            cursor: AtomicU32::new(0),
            latest_seen: Arc::new(AtomicU32::new(0)),
            inner: tokio::sync::Mutex::new(Inner::default()),
        }
    }

    pub fn config(&self) -> &CaptiveConfig {
        &self.config
    }

    fn prepared_range(&self) -> Option<LedgerRange> {
        *self.prepared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_prepared_range(&self, range: Option<LedgerRange>) {
        *self.prepared.lock().unwrap_or_else(PoisonError::into_inner) = range;
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.is_cancelled() {
            Err(SourceError::Closed)
        } else {
            Ok(())
        }
    }

    fn spawn_forwarder(&self, mut stream: Box<dyn MetaStream>, end: Option<u32>) -> Inner {
        let (tx, rx) = mpsc::channel(self.config.buffer_size.max(1));
        let token = self.closed.child_token();
        let task_token = token.clone();
        let latest = Arc::clone(&self.latest_seen);

        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    next = stream.next_ledger() => next,
                };
                let Some(item) = next else {
                    debug!("node stream ended");
                    break;
                };
                let done = match &item {
                    Ok(ledger) => {
                        let seq = ledger.sequence();
                        latest.fetch_max(seq, Ordering::SeqCst);
                        end.is_some_and(|to| seq >= to)
                    }
                    Err(_) => true,
                };
                let sent = tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    sent = tx.send(item) => sent,
                };
                if sent.is_err() || done {
                    break;
                }
            }
            debug!("ledger forwarder stopped");
        });

        let mut chain = LedgerChainVerifier::new();
        if self.config.verify_headers {
            chain = chain.with_header_verification();
        }
        Inner {
            buffer: Some(rx),
            task_token: Some(task_token),
            cached: None,
            chain,
        }
    }

    /// Pull ledgers off the buffer until `seq`, verifying every one.
    async fn advance_to(
        &self,
        inner: &mut Inner,
        seq: u32,
        cancel: &CancellationToken,
    ) -> Result<LedgerCloseMeta> {
        if let Some(cached) = inner.cached.take() {
            match cached.sequence().cmp(&seq) {
                std::cmp::Ordering::Equal => return Ok(cached),
                std::cmp::Ordering::Greater => {
                    return Err(SourceError::UnexpectedLedger(format!(
                        "read-ahead ledger {} is past requested {seq}",
                        cached.sequence()
                    )))
                }
                std::cmp::Ordering::Less => {}
            }
        }
        loop {
            let Some(buffer) = inner.buffer.as_mut() else {
                return Err(SourceError::NotPrepared);
            };
            let received = guarded(buffer.recv(), cancel, &self.closed).await?;
            let ledger = match received {
                Some(Ok(ledger)) => ledger,
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(SourceError::Runner(format!(
                        "node stopped before emitting ledger {seq}"
                    )))
                }
            };
            inner.chain.observe(&ledger)?;
            match ledger.sequence().cmp(&seq) {
                std::cmp::Ordering::Less => {
                    debug!(seq = ledger.sequence(), target = seq, "skipping ledger");
                }
                std::cmp::Ordering::Equal => return Ok(ledger),
                std::cmp::Ordering::Greater => {
                    return Err(SourceError::UnexpectedLedger(format!(
                        "node emitted ledger {} while waiting for {seq}",
                        ledger.sequence()
                    )))
                }
            }
        }
    }

    async fn prepare_locked(&self, range: LedgerRange, cancel: &CancellationToken) -> Result<()> {
        let mut inner = guarded(self.inner.lock(), cancel, &self.closed).await?;
        let stream = guarded(self.runner.open(range), cancel, &self.closed).await??;
        *inner = self.spawn_forwarder(stream, range.to);
        let first = match self.advance_to(&mut inner, range.from, cancel).await {
            Ok(ledger) => ledger,
            Err(e) => {
                inner.stop();
                return Err(e);
            }
        };
        inner.cached = Some(first);
        self.cursor.store(range.from, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl<R: NodeRunner> LedgerSource for CaptiveSource<R> {
    async fn prepare_range(&self, range: LedgerRange, cancel: &CancellationToken) -> Result<()> {
        self.check_open()?;
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
        info!(%range, "preparing captive source");
        self.set_prepared_range(Some(range));

        match self.prepare_locked(range, cancel).await {
            Ok(()) => {
                self.state.set_unless_closed(SourceState::Ready);
                self.check_open()?;
                info!(%range, "captive source ready");
                Ok(())
            }
            Err(e) => {
                warn!(%range, error = %e, "captive source preparation failed");
                self.set_prepared_range(None);
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
        self.prepared_range()
            .is_some_and(|prepared| prepared.contains_range(&range) && range.from >= cursor)
    }

    async fn latest_ledger_sequence(&self) -> Result<u32> {
        self.check_open()?;
        if self.state.get() != SourceState::Ready {
            return Err(SourceError::NotPrepared);
        }
        let range = self.prepared_range().ok_or(SourceError::NotPrepared)?;
        if let Some(to) = range.to {
            return Ok(to);
        }
        let consumed = self.cursor.load(Ordering::SeqCst).saturating_sub(1);
        Ok(self.latest_seen.load(Ordering::SeqCst).max(consumed))
    }

    async fn get_ledger(&self, seq: u32, cancel: &CancellationToken) -> Result<LedgerCloseMeta> {
        self.check_open()?;
        if self.state.get() != SourceState::Ready {
            return Err(SourceError::NotPrepared);
        }
        let range = self.prepared_range().ok_or(SourceError::NotPrepared)?;
        if let Some(to) = range.to {
            if seq > to {
                return Err(SourceError::SequenceTooNew {
                    requested: seq,
                    latest: to,
                });
            }
        }

        let mut inner = guarded(self.inner.lock(), cancel, &self.closed).await?;
        let cursor = self.cursor.load(Ordering::SeqCst);
        if seq < cursor {
            return Err(SourceError::SequenceTooOld {
                requested: seq,
                cursor,
            });
        }
        let ledger = self.advance_to(&mut inner, seq, cancel).await?;
        self.cursor.store(seq + 1, Ordering::SeqCst);
        if range.to == Some(seq) {
            inner.stop();
            debug!(seq, "bounded range fully consumed");
        }
        Ok(ledger)
    }

    async fn close(&self) -> Result<()> {
        self.closed.cancel();
        let previous = self.state.get();
        self.state.set(SourceState::Closed);
        // In-flight calls hold the lock; they observe the token and return.
        if let Ok(mut inner) = self.inner.try_lock() {
            inner.stop();
        }
        if previous != SourceState::Closed {
            info!("captive source closed");
        }
        Ok(())
    }

    fn state(&self) -> SourceState {
        self.state.get()
    }
}

impl<R: NodeRunner> Drop for CaptiveSource<R> {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::MemoryRunner;
    use lip_extract::PaymentWorkload;
    use lip_types::{Hash, NetworkId};
    use std::time::Duration;

    fn chain(first: u32, count: usize) -> Vec<LedgerCloseMeta> {
        PaymentWorkload::new(NetworkId::testnet(), first, 3)
            .ledgers(count, 1)
            .unwrap()
    }

    fn source(ledgers: Vec<LedgerCloseMeta>) -> CaptiveSource<MemoryRunner> {
        CaptiveSource::new(MemoryRunner::new(ledgers), CaptiveConfig::default())
    }

    #[tokio::test]
    async fn bounded_range_serves_each_ledger_once() {
        let src = source(chain(100, 20));
        let cancel = CancellationToken::new();
        let range = LedgerRange::bounded(105, 110);
        src.prepare_range(range, &cancel).await.unwrap();
        assert!(src.is_prepared(range).await);
        assert_eq!(src.latest_ledger_sequence().await.unwrap(), 110);

        for seq in 105..=110 {
            assert_eq!(src.get_ledger(seq, &cancel).await.unwrap().sequence(), seq);
        }
        assert!(matches!(
            src.get_ledger(110, &cancel).await,
            Err(SourceError::SequenceTooOld { requested: 110, .. })
        ));
        assert!(matches!(
            src.get_ledger(111, &cancel).await,
            Err(SourceError::SequenceTooNew { requested: 111, latest: 110 })
        ));
        assert!(!src.is_prepared(range).await);
    }

    #[tokio::test]
    async fn reads_before_prepare_fail() {
        let src = source(chain(1, 3));
        let cancel = CancellationToken::new();
        assert!(matches!(
            src.get_ledger(1, &cancel).await,
            Err(SourceError::NotPrepared)
        ));
        assert!(matches!(
            src.latest_ledger_sequence().await,
            Err(SourceError::NotPrepared)
        ));
        assert!(!src.is_prepared(LedgerRange::bounded(1, 2)).await);
    }

    #[tokio::test]
    async fn second_prepare_is_rejected() {
        let src = source(chain(1, 5));
        let cancel = CancellationToken::new();
        src.prepare_range(LedgerRange::bounded(1, 3), &cancel)
            .await
            .unwrap();
        assert!(matches!(
            src.prepare_range(LedgerRange::bounded(2, 4), &cancel).await,
            Err(SourceError::AlreadyPrepared(_))
        ));
    }

    #[tokio::test]
    async fn inverted_range_is_invalid() {
        let src = source(chain(1, 5));
        let err = src
            .prepare_range(LedgerRange::bounded(4, 2), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidRange { from: 4, to: 2 }));
        assert_eq!(src.state(), SourceState::Unprepared);
    }

    #[tokio::test]
    async fn skipping_ahead_is_allowed_going_back_is_not() {
        let src = source(chain(1, 10));
        let cancel = CancellationToken::new();
        src.prepare_range(LedgerRange::bounded(2, 9), &cancel)
            .await
            .unwrap();
        assert_eq!(src.get_ledger(5, &cancel).await.unwrap().sequence(), 5);
        assert!(matches!(
            src.get_ledger(3, &cancel).await,
            Err(SourceError::SequenceTooOld { requested: 3, cursor: 6 })
        ));
        assert_eq!(src.get_ledger(6, &cancel).await.unwrap().sequence(), 6);
    }

    #[tokio::test]
    async fn broken_chain_is_unexpected_ledger() {
        let mut ledgers = chain(1, 5);
        ledgers[3].ledger_header.header.previous_ledger_hash = Hash::from_bytes([7; 32]);
        let src = source(ledgers);
        let cancel = CancellationToken::new();
        src.prepare_range(LedgerRange::bounded(1, 5), &cancel)
            .await
            .unwrap();
        for seq in 1..=3 {
            src.get_ledger(seq, &cancel).await.unwrap();
        }
        let err = src.get_ledger(4, &cancel).await.unwrap_err();
        assert!(matches!(err, SourceError::UnexpectedLedger(_)));
    }

    #[tokio::test]
    async fn unbounded_get_waits_for_ledger_close() {
        let mut ledgers = chain(1, 4);
        let later = ledgers.split_off(2);
        let runner = MemoryRunner::new(ledgers);
        let producer = runner.clone();
        let src = CaptiveSource::new(runner, CaptiveConfig::default());
        let cancel = CancellationToken::new();
        src.prepare_range(LedgerRange::unbounded(1), &cancel)
            .await
            .unwrap();
        src.get_ledger(1, &cancel).await.unwrap();
        src.get_ledger(2, &cancel).await.unwrap();

        tokio::spawn(async move {
            for l in later {
                tokio::time::sleep(Duration::from_millis(10)).await;
                producer.close_ledger(l);
            }
        });
        assert_eq!(src.get_ledger(3, &cancel).await.unwrap().sequence(), 3);
        assert_eq!(src.get_ledger(4, &cancel).await.unwrap().sequence(), 4);
        assert_eq!(src.latest_ledger_sequence().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn cancelled_get_returns_promptly() {
        let src = source(chain(1, 2));
        let cancel = CancellationToken::new();
        src.prepare_range(LedgerRange::unbounded(1), &cancel)
            .await
            .unwrap();
        src.get_ledger(1, &cancel).await.unwrap();
        src.get_ledger(2, &cancel).await.unwrap();

        let c = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            c.cancel();
        });
        let err = tokio::time::timeout(Duration::from_secs(5), src.get_ledger(3, &cancel))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, SourceError::Cancelled));
    }

    #[tokio::test]
    async fn close_interrupts_in_flight_get() {
        let src = Arc::new(source(chain(1, 1)));
        let cancel = CancellationToken::new();
        src.prepare_range(LedgerRange::unbounded(1), &cancel)
            .await
            .unwrap();
        src.get_ledger(1, &cancel).await.unwrap();

        let waiting = {
            let src = Arc::clone(&src);
            tokio::spawn(async move { src.get_ledger(2, &CancellationToken::new()).await })
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
    async fn close_is_idempotent() {
        let src = source(chain(1, 3));
        let cancel = CancellationToken::new();
        src.prepare_range(LedgerRange::bounded(1, 3), &cancel)
            .await
            .unwrap();
        assert!(src.close().await.is_ok());
        assert!(src.close().await.is_ok());
        assert_eq!(src.state(), SourceState::Closed);
        assert!(matches!(
            src.get_ledger(2, &cancel).await,
            Err(SourceError::Closed)
        ));
        assert!(matches!(
            src.prepare_range(LedgerRange::bounded(1, 3), &cancel).await,
            Err(SourceError::Closed)
        ));
        assert!(!src.is_prepared(LedgerRange::bounded(1, 3)).await);
    }

    #[tokio::test]
    async fn small_buffer_still_delivers_everything() {
        let src = CaptiveSource::new(
            MemoryRunner::new(chain(1, 30)),
            CaptiveConfig {
                buffer_size: 1,
                ..CaptiveConfig::default()
            },
        );
        let cancel = CancellationToken::new();
        src.prepare_range(LedgerRange::bounded(1, 30), &cancel)
            .await
            .unwrap();
        for seq in 1..=30 {
            assert_eq!(src.get_ledger(seq, &cancel).await.unwrap().sequence(), seq);
        }
    }

    #[tokio::test]
    async fn failed_prepare_can_be_retried() {
        let src = source(chain(1, 3));
        let cancel = CancellationToken::new();
        assert!(matches!(
            src.prepare_range(LedgerRange::bounded(5, 6), &cancel).await,
            Err(SourceError::Runner(_))
        ));
        assert_eq!(src.state(), SourceState::Unprepared);
        src.prepare_range(LedgerRange::bounded(2, 3), &cancel)
            .await
            .unwrap();
        assert_eq!(src.get_ledger(2, &cancel).await.unwrap().sequence(), 2);
    }
}
