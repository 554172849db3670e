use std::future::Future;

use async_trait::async_trait;
use lip_types::{LedgerCloseMeta, LedgerRange};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SourceError};
use crate::state::SourceState;

/// A provider of raw ledgers over a declared range.
///
/// Callers must [`prepare_range`](LedgerSource::prepare_range) once before
/// reading, then request ledgers in strictly increasing order. Sequences
/// already passed are never fetched again.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Declare the window of ledgers that will be consumed. May block while
    /// the backend warms up.
    async fn prepare_range(&self, range: LedgerRange, cancel: &CancellationToken) -> Result<()>;

    /// `true` once a prepared range covers `range` and its first ledger has
    /// not been consumed yet. Never fails.
    async fn is_prepared(&self, range: LedgerRange) -> bool;

    /// Highest sequence currently available.
    async fn latest_ledger_sequence(&self) -> Result<u32>;

    /// The ledger with sequence `seq`. Blocks until it is available.
    async fn get_ledger(&self, seq: u32, cancel: &CancellationToken) -> Result<LedgerCloseMeta>;

    /// Release all resources. Idempotent; later calls fail with
    /// [`SourceError::Closed`].
    async fn close(&self) -> Result<()>;

    fn state(&self) -> SourceState;
}

/// Run `fut` unless the caller cancels or the source closes first.
///
/// Closure wins over caller cancellation when both have fired.
pub async fn guarded<F: Future>(
    fut: F,
    cancel: &CancellationToken,
    closed: &CancellationToken,
) -> Result<F::Output> {
    if closed.is_cancelled() {
        return Err(SourceError::Closed);
    }
    if cancel.is_cancelled() {
        return Err(SourceError::Cancelled);
    }
    tokio::select! {
        biased;
        () = closed.cancelled() => Err(SourceError::Closed),
        () = cancel.cancelled() => Err(SourceError::Cancelled),
        out = fut => Ok(out),
    }
}
