//! The validating-node collaborator behind [`crate::CaptiveSource`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lip_types::{LedgerCloseMeta, LedgerRange};
use tokio::sync::watch;
use tracing::debug;

use crate::error::{Result, SourceError};

/// Starts a validating node that emits ledger close records.
#[async_trait]
pub trait NodeRunner: Send + Sync {
    /// Begin emitting ledgers for `range`: a catch-up run that ends after
    /// `range.to` when bounded, or a live run otherwise. The node may start
    /// emitting before `range.from`.
    async fn open(&self, range: LedgerRange) -> Result<Box<dyn MetaStream>>;
}

/// Ordered ledgers emitted by a running node.
#[async_trait]
pub trait MetaStream: Send {
    /// The next ledger, or `None` once the node has stopped.
    async fn next_ledger(&mut self) -> Option<Result<LedgerCloseMeta>>;
}

/// In-process node standing in for a subprocess.
///
/// Emits a shared, growing list of ledgers. Appending with
/// [`MemoryRunner::close_ledger`] wakes live streams, so unbounded runs behave
/// like a node closing new ledgers.
#[derive(Clone)]
pub struct MemoryRunner {
    ledgers: Arc<watch::Sender<Vec<LedgerCloseMeta>>>,
    close_interval: Duration,
}

impl MemoryRunner {
    pub fn new(ledgers: Vec<LedgerCloseMeta>) -> Self {
        let (tx, _rx) = watch::channel(ledgers);
        Self {
            ledgers: Arc::new(tx),
            close_interval: Duration::ZERO,
        }
    }

    /// Delay every emitted ledger by `interval`, as a node paced by consensus.
    pub fn with_close_interval(mut self, interval: Duration) -> Self {
        self.close_interval = interval;
        self
    }

    /// Append a newly closed ledger.
    pub fn close_ledger(&self, ledger: LedgerCloseMeta) {
        self.ledgers.send_modify(|ledgers| ledgers.push(ledger));
    }

    pub fn len(&self) -> usize {
        self.ledgers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NodeRunner for MemoryRunner {
    async fn open(&self, range: LedgerRange) -> Result<Box<dyn MetaStream>> {
        let ledgers = self.ledgers.subscribe();
        // Start from the ledger just before `from` when present, the way a
        // node replays from its last checkpoint.
        let start = {
            let current = ledgers.borrow();
            current
                .iter()
                .position(|l| l.sequence() + 1 >= range.from)
                .unwrap_or(current.len())
        };
        debug!(%range, start, "memory runner opened");
        Ok(Box::new(MemoryMetaStream {
            ledgers,
            next: start,
            end: range.to,
            close_interval: self.close_interval,
        }))
    }
}

struct MemoryMetaStream {
    ledgers: watch::Receiver<Vec<LedgerCloseMeta>>,
    next: usize,
    end: Option<u32>,
    close_interval: Duration,
}

#[async_trait]
impl MetaStream for MemoryMetaStream {
    async fn next_ledger(&mut self) -> Option<Result<LedgerCloseMeta>> {
        loop {
            let next = self.ledgers.borrow_and_update().get(self.next).cloned();
            if let Some(ledger) = next {
                if self.end.is_some_and(|to| ledger.sequence() > to) {
                    return None;
                }
                self.next += 1;
                if !self.close_interval.is_zero() {
                    tokio::time::sleep(self.close_interval).await;
                }
                return Some(Ok(ledger));
            }
            if let Some(to) = self.end {
                return Some(Err(SourceError::Runner(format!(
                    "catch-up ended before ledger {to}"
                ))));
            }
            if self.ledgers.changed().await.is_err() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lip_extract::PaymentWorkload;
    use lip_types::NetworkId;

    fn chain(first: u32, count: usize) -> Vec<LedgerCloseMeta> {
        PaymentWorkload::new(NetworkId::testnet(), first, 2)
            .ledgers(count, 1)
            .unwrap()
    }

    #[tokio::test]
    async fn bounded_run_stops_after_end() {
        let runner = MemoryRunner::new(chain(10, 10));
        let mut stream = runner.open(LedgerRange::bounded(13, 15)).await.unwrap();
        let mut seen = Vec::new();
        while let Some(ledger) = stream.next_ledger().await {
            seen.push(ledger.unwrap().sequence());
        }
        assert_eq!(seen, vec![12, 13, 14, 15]);
    }

    #[tokio::test]
    async fn bounded_run_past_tip_fails() {
        let runner = MemoryRunner::new(chain(1, 3));
        let mut stream = runner.open(LedgerRange::bounded(2, 9)).await.unwrap();
        let mut last = None;
        while let Some(item) = stream.next_ledger().await {
            if item.is_err() {
                last = Some(item);
                break;
            }
        }
        assert!(matches!(last, Some(Err(SourceError::Runner(_)))));
    }

    #[tokio::test]
    async fn live_run_waits_for_new_ledgers() {
        let mut ledgers = chain(1, 4);
        let later = ledgers.split_off(2);
        let runner = MemoryRunner::new(ledgers);
        let mut stream = runner.open(LedgerRange::unbounded(1)).await.unwrap();
        assert_eq!(stream.next_ledger().await.unwrap().unwrap().sequence(), 1);
        assert_eq!(stream.next_ledger().await.unwrap().unwrap().sequence(), 2);

        let producer = runner.clone();
        tokio::spawn(async move {
            for l in later {
                tokio::time::sleep(Duration::from_millis(5)).await;
                producer.close_ledger(l);
            }
        });
        assert_eq!(stream.next_ledger().await.unwrap().unwrap().sequence(), 3);
        assert_eq!(stream.next_ledger().await.unwrap().unwrap().sequence(), 4);
        assert_eq!(runner.len(), 4);
    }
}
