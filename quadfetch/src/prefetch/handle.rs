//! Handle to a running prefetch operation.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::enumerator::LevelWarning;
use super::types::{PrefetchCounts, PrefetchState};

/// Live progress of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefetchStatus {
    pub operation_id: u64,
    pub state: PrefetchState,
    /// Number of targets the request expanded to
    pub total: u64,
    #[serde(flatten)]
    pub counts: PrefetchCounts,
}

impl PrefetchStatus {
    pub(crate) fn new(operation_id: u64, total: u64) -> Self {
        Self {
            operation_id,
            state: PrefetchState::Pending,
            total,
            counts: PrefetchCounts::default(),
        }
    }

    /// Targets reported so far.
    pub fn processed(&self) -> u64 {
        self.counts.total() as u64
    }

    /// Progress as a fraction from 0.0 to 1.0.
    pub fn progress_fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.processed() as f64 / self.total as f64
    }
}

/// Handle returned by [`Prefetcher::prefetch`](super::Prefetcher::prefetch).
///
/// Cheap to clone. Dropping it does not cancel the operation.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    status: Arc<Mutex<PrefetchStatus>>,
    cancellation: CancellationToken,
    warnings: Arc<[LevelWarning]>,
}

impl CancellationHandle {
    pub(crate) fn new(
        status: Arc<Mutex<PrefetchStatus>>,
        cancellation: CancellationToken,
        warnings: Vec<LevelWarning>,
    ) -> Self {
        Self {
            status,
            cancellation,
            warnings: warnings.into(),
        }
    }

    /// Requests cancellation.
    ///
    /// Cancellation is cooperative: fetches already dispatched run to
    /// completion and are reported, everything else is reported cancelled.
    pub fn cancel(&self) {
        let operation_id = self.operation_id();
        info!(operation_id, "Prefetch cancellation requested");
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn operation_id(&self) -> u64 {
        self.status.lock().operation_id
    }

    /// Snapshot of the current progress.
    pub fn status(&self) -> PrefetchStatus {
        self.status.lock().clone()
    }

    /// Returns true once the operation reached a terminal state.
    ///
    /// The state turns terminal just before the completion callback runs,
    /// so this may be true while that callback is still executing.
    pub fn is_finished(&self) -> bool {
        self.status.lock().state.is_terminal()
    }

    /// Requested levels the layer could not serve.
    pub fn warnings(&self) -> &[LevelWarning] {
        &self.warnings
    }

    /// The caller-side cancellation token.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }
}
