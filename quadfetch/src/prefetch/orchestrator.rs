//! The prefetch orchestrator.
//!
//! Each call to [`Prefetcher::prefetch`] runs as a self-driving tokio task:
//!
//! ```text
//!  AddressSequence ──► producer ──► WorkQueue ──► worker × N ──► Fetcher
//!                                                    │
//!                                                    ├──► ProtectedCache::put_protected
//!                                                    └──► ResultAggregator ──► callbacks
//! ```
//!
//! The producer checks the stop token before every push and the workers
//! check it before every dispatch. Once stopped, the producer reports
//! every target it has not queued as cancelled and the workers report what
//! they pull as cancelled, so every target is reported exactly once.
//!
//! The stop token is a child of the caller's token. A global fetch error
//! cancels only the child, which is how cancelled items learn whether the
//! caller or a failure stopped them. A producer or worker task that dies
//! counts as a global failure.
//!
//! The terminal state is published on the status before the completion
//! callback runs, so a callback that inspects the handle sees it finished.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::aggregator::{CompletionCallback, ItemCallback, ResultAggregator};
use super::config::PrefetchConfig;
use super::enumerator::{enumerate, Enumeration};
use super::error::PrefetchError;
use super::handle::{CancellationHandle, PrefetchStatus};
use super::request::{LayerConfig, PrefetchRequest};
use super::types::{
    CancelReason, PrefetchAggregateResult, PrefetchItemResult, PrefetchState, PrefetchTarget,
};
use crate::cache::{keys, Expiry, ProtectedCache};
use crate::executor::{RetryPolicy, WorkQueue};
use crate::provider::{FetchError, FetchErrorKind, Fetcher};
use crate::tile::TileAddress;

/// Fetches layer data into a [`ProtectedCache`].
///
/// One `Prefetcher` serves one layer and may run any number of operations
/// at once. Operations own their callbacks and tokens; the prefetcher only
/// keeps a token per active operation for [`cancel_all`](Self::cancel_all).
pub struct Prefetcher {
    cache: Arc<ProtectedCache>,
    fetcher: Arc<dyn Fetcher>,
    layer: Arc<LayerConfig>,
    config: PrefetchConfig,
    active: Arc<DashMap<u64, CancellationToken>>,
    next_operation_id: AtomicU64,
}

impl Prefetcher {
    pub fn new(
        cache: Arc<ProtectedCache>,
        fetcher: Arc<dyn Fetcher>,
        layer: LayerConfig,
        config: PrefetchConfig,
    ) -> Self {
        Self {
            cache,
            fetcher,
            layer: Arc::new(layer),
            config,
            active: Arc::new(DashMap::new()),
            next_operation_id: AtomicU64::new(1),
        }
    }

    pub fn layer(&self) -> &LayerConfig {
        &self.layer
    }

    pub fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ProtectedCache> {
        &self.cache
    }

    /// Starts a prefetch and returns at once.
    ///
    /// `on_item` runs for every target as its result arrives; `on_complete`
    /// runs exactly once, after every item callback.
    ///
    /// # Errors
    ///
    /// Request errors are reported here and no callback runs. See
    /// [`enumerate`] for validation; [`PrefetchError::NoRuntime`] if called
    /// outside a tokio runtime.
    pub fn prefetch(
        &self,
        request: PrefetchRequest,
        on_item: Option<ItemCallback>,
        on_complete: CompletionCallback,
    ) -> Result<CancellationHandle, PrefetchError> {
        let runtime = Handle::try_current().map_err(|_| PrefetchError::NoRuntime)?;
        let Enumeration { sequence, warnings } = enumerate(request, &self.layer)?;

        let operation_id = self.next_operation_id.fetch_add(1, Ordering::Relaxed);
        let total = sequence.remaining();
        let cancellation = CancellationToken::new();
        let status = Arc::new(Mutex::new(PrefetchStatus::new(operation_id, total)));

        let handle =
            CancellationHandle::new(Arc::clone(&status), cancellation.clone(), warnings);

        let operation = Arc::new(Operation {
            id: operation_id,
            cache: Arc::clone(&self.cache),
            fetcher: Arc::clone(&self.fetcher),
            layer: Arc::clone(&self.layer),
            retry: self.config.retry.clone(),
            queue: WorkQueue::new(self.config.queue_capacity),
            aggregator: ResultAggregator::new(on_item, on_complete),
            status,
            stop: cancellation.child_token(),
            cancellation: cancellation.clone(),
            failure: Mutex::new(None),
        });

        self.active.insert(operation_id, cancellation);

        info!(
            operation_id,
            layer = %self.layer.id,
            total,
            workers = self.config.max_concurrency,
            "Starting prefetch"
        );
        runtime.spawn(operation.run(
            sequence,
            self.config.max_concurrency,
            Arc::clone(&self.active),
        ));

        Ok(handle)
    }

    /// Runs a prefetch to the end and returns its aggregate.
    pub async fn prefetch_and_wait(
        &self,
        request: PrefetchRequest,
    ) -> Result<PrefetchAggregateResult, PrefetchError> {
        let (tx, rx) = oneshot::channel();
        let handle = self.prefetch(
            request,
            None,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        )?;

        rx.await
            .map_err(|_| PrefetchError::Aborted(handle.operation_id()))
    }

    /// Cancels every running operation. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for entry in self.active.iter() {
            entry.value().cancel();
            cancelled += 1;
        }
        if cancelled > 0 {
            info!(cancelled, "Cancelling all prefetch operations");
        }
        cancelled
    }

    /// Number of operations that have not finished yet.
    pub fn active_operations(&self) -> usize {
        self.active.len()
    }

    /// Protects the cache entries of `tiles` in `layer`.
    pub fn protect_tiles(&self, layer: &str, tiles: &[TileAddress]) {
        self.cache
            .protect(tiles.iter().map(|tile| keys::tile_key(layer, tile)));
    }

    /// Protects the cache entries of partitions `ids` in `layer`.
    ///
    /// Only the named partitions are protected.
    pub fn protect_partitions<S: AsRef<str>>(&self, layer: &str, ids: &[S]) {
        self.cache.protect(
            ids.iter()
                .map(|id| keys::partition_key(layer, id.as_ref())),
        );
    }

    /// Lifts protection of `tiles` in `layer`.
    pub fn release_tiles(&self, layer: &str, tiles: &[TileAddress]) {
        self.cache
            .release(tiles.iter().map(|tile| keys::tile_key(layer, tile)));
    }

    /// Lifts protection of partitions `ids` in `layer`.
    pub fn release_partitions<S: AsRef<str>>(&self, layer: &str, ids: &[S]) {
        self.cache.release(
            ids.iter()
                .map(|id| keys::partition_key(layer, id.as_ref())),
        );
    }
}

// =============================================================================
// Operation
// =============================================================================

/// Targets cancelled between yields to the scheduler.
const CANCEL_BATCH: usize = 1024;

/// State shared by the producer and workers of one operation.
struct Operation {
    id: u64,
    cache: Arc<ProtectedCache>,
    fetcher: Arc<dyn Fetcher>,
    layer: Arc<LayerConfig>,
    retry: RetryPolicy,
    queue: WorkQueue<PrefetchTarget>,
    aggregator: ResultAggregator,
    status: Arc<Mutex<PrefetchStatus>>,
    /// Caller's token
    cancellation: CancellationToken,
    /// Child of `cancellation`; also cancelled by a global error
    stop: CancellationToken,
    /// First global error
    failure: Mutex<Option<FetchError>>,
}

impl Operation {
    async fn run<I>(
        self: Arc<Self>,
        sequence: I,
        workers: usize,
        active: Arc<DashMap<u64, CancellationToken>>,
    ) where
        I: Iterator<Item = PrefetchTarget> + Send + 'static,
    {
        self.status.lock().state = PrefetchState::Running;

        let producer = tokio::spawn(Arc::clone(&self).produce(sequence));
        let workers: Vec<_> = (0..workers.max(1))
            .map(|_| tokio::spawn(Arc::clone(&self).work()))
            .collect();

        if let Err(e) = producer.await {
            error!(operation_id = self.id, error = %e, "Prefetch producer task failed");
            self.fail(&FetchError::new(
                FetchErrorKind::Other,
                format!("target producer failed: {e}"),
            ));
            self.queue.close();
        }
        for worker in workers {
            if let Err(e) = worker.await {
                error!(operation_id = self.id, error = %e, "Prefetch worker task failed");
                self.fail(&FetchError::new(
                    FetchErrorKind::Other,
                    format!("prefetch worker failed: {e}"),
                ));
            }
        }

        let error = self.failure.lock().clone();
        let state = if error.is_some() {
            PrefetchState::Failed
        } else if self.cancellation.is_cancelled() {
            PrefetchState::Cancelled
        } else {
            PrefetchState::Completed
        };

        let counts = {
            let mut status = self.status.lock();
            status.state = state;
            status.counts
        };
        active.remove(&self.id);

        info!(
            operation_id = self.id,
            state = %state,
            succeeded = counts.succeeded,
            failed = counts.failed,
            cancelled = counts.cancelled,
            "Prefetch finished"
        );
        self.aggregator.finish(state, error);
    }

    /// Feeds the sequence into the queue, then closes it.
    async fn produce<I>(self: Arc<Self>, mut sequence: I)
    where
        I: Iterator<Item = PrefetchTarget>,
    {
        while let Some(target) = sequence.next() {
            if self.stop.is_cancelled() {
                self.cancel_remaining(target, sequence).await;
                break;
            }
            if let Err(closed) = self.queue.push(target).await {
                self.cancel_remaining(closed.0, sequence).await;
                break;
            }
        }
        self.queue.close();
    }

    async fn cancel_remaining<I>(&self, first: PrefetchTarget, rest: I)
    where
        I: Iterator<Item = PrefetchTarget>,
    {
        let reason = self.cancel_reason();
        debug!(
            operation_id = self.id,
            remaining = rest.size_hint().0.saturating_add(1),
            ?reason,
            "Cancelling unscheduled targets"
        );
        self.report(PrefetchItemResult::cancelled(first, reason));
        for (i, target) in rest.enumerate() {
            self.report(PrefetchItemResult::cancelled(target, reason));
            if (i + 1) % CANCEL_BATCH == 0 {
                tokio::task::yield_now().await;
            }
        }
    }

    async fn work(self: Arc<Self>) {
        while let Some(target) = self.queue.pull().await {
            if self.stop.is_cancelled() {
                let reason = self.cancel_reason();
                self.report(PrefetchItemResult::cancelled(target, reason));
                continue;
            }
            let result = self.fetch(target).await;
            self.report(result);
        }
    }

    async fn fetch(&self, target: PrefetchTarget) -> PrefetchItemResult {
        let fetcher: &dyn Fetcher = self.fetcher.as_ref();
        let requested = &target;
        let attempt = self
            .retry
            .run(&self.stop, || fetcher.fetch(requested), FetchError::is_retryable);

        let outcome = match AssertUnwindSafe(attempt).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(operation_id = self.id, target = %target, "Fetcher panicked");
                Err(FetchError::new(FetchErrorKind::Other, "fetcher panicked"))
            }
        };

        match outcome {
            Ok(payload) => {
                let key = target.cache_key(&self.layer.id);
                let expiry = Expiry::from_ttl(self.layer.expiry);
                if let Err(e) = self.cache.put_protected(key, payload.clone(), expiry).await {
                    warn!(
                        operation_id = self.id,
                        target = %target,
                        error = %e,
                        "Failed to write prefetched payload to backing store"
                    );
                }
                PrefetchItemResult::succeeded(target, payload)
            }
            Err(error) => {
                if error.is_global() {
                    self.fail(&error);
                } else {
                    debug!(operation_id = self.id, target = %target, error = %error, "Fetch failed");
                }
                PrefetchItemResult::failed(target, error)
            }
        }
    }

    /// Records the first global error and stops scheduling.
    fn fail(&self, error: &FetchError) {
        {
            let mut failure = self.failure.lock();
            if failure.is_none() {
                warn!(
                    operation_id = self.id,
                    layer = %self.layer.id,
                    error = %error,
                    "Global fetch error, stopping prefetch"
                );
                *failure = Some(error.clone());
            }
        }
        self.stop.cancel();
    }

    fn cancel_reason(&self) -> CancelReason {
        if self.failure.lock().is_some() {
            CancelReason::GlobalFailure
        } else {
            CancelReason::Requested
        }
    }

    fn report(&self, result: PrefetchItemResult) {
        self.status.lock().counts.record(&result.outcome);
        self.aggregator.record(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{BoxFuture, ProtectedCacheConfig};
    use crate::coord::{GeoRectangle, TilingScheme};
    use bytes::Bytes;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Returns the target's display string, failing ids listed in `fail`.
    struct ScriptedFetcher {
        fail: HashSet<String>,
        kind: FetchErrorKind,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedFetcher {
        fn ok() -> Self {
            Self {
                fail: HashSet::new(),
                kind: FetchErrorKind::NotFound,
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn failing(ids: &[&str], kind: FetchErrorKind) -> Self {
            Self {
                fail: ids.iter().map(|s| s.to_string()).collect(),
                kind,
                ..Self::ok()
            }
        }
    }

    impl Fetcher for ScriptedFetcher {
        fn fetch<'a>(
            &'a self,
            target: &'a PrefetchTarget,
        ) -> BoxFuture<'a, Result<Bytes, FetchError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                let id = target.as_partition().unwrap_or_default();
                if self.fail.contains(id) {
                    return Err(FetchError::new(self.kind, format!("{id} failed")));
                }
                Ok(Bytes::from(target.to_string()))
            })
        }
    }

    fn prefetcher(fetcher: ScriptedFetcher, layer: LayerConfig) -> (Prefetcher, Arc<ProtectedCache>) {
        let cache = Arc::new(ProtectedCache::new(ProtectedCacheConfig::default()));
        let prefetcher = Prefetcher::new(
            Arc::clone(&cache),
            Arc::new(fetcher),
            layer,
            PrefetchConfig::default()
                .with_max_concurrency(2)
                .with_queue_capacity(2)
                .with_retry(RetryPolicy::None),
        );
        (prefetcher, cache)
    }

    #[tokio::test]
    async fn test_partitions_all_succeed_and_are_protected() {
        let (prefetcher, cache) =
            prefetcher(ScriptedFetcher::ok(), LayerConfig::partitioned("roads"));

        let result = prefetcher
            .prefetch_and_wait(PrefetchRequest::partitions(["a", "b", "a", "c"]))
            .await
            .unwrap();

        assert_eq!(result.state, PrefetchState::Completed);
        assert_eq!(result.counts.succeeded, 3);
        assert!(result.is_complete_success());
        for id in ["a", "b", "c"] {
            let key = keys::partition_key("roads", id);
            assert!(cache.is_protected(&key));
            assert_eq!(
                cache.get(&key).await,
                Some(Bytes::from(format!("partition {id}")))
            );
        }
        assert_eq!(prefetcher.active_operations(), 0);
    }

    #[tokio::test]
    async fn test_item_failures_do_not_stop_others() {
        let (prefetcher, cache) = prefetcher(
            ScriptedFetcher::failing(&["b", "d"], FetchErrorKind::NotFound),
            LayerConfig::partitioned("roads"),
        );

        let result = prefetcher
            .prefetch_and_wait(PrefetchRequest::partitions(["a", "b", "c", "d", "e"]))
            .await
            .unwrap();

        assert_eq!(result.state, PrefetchState::Completed);
        assert_eq!(result.counts.succeeded, 3);
        assert_eq!(result.counts.failed, 2);
        assert!(result.error.is_none());
        assert!(!cache.contains(&keys::partition_key("roads", "b")));
    }

    #[tokio::test]
    async fn test_tiles_are_cached_under_tile_keys() {
        let layer = LayerConfig::tiled("terrain", 0, 5, TilingScheme::Geographic);
        let (prefetcher, cache) = prefetcher(ScriptedFetcher::ok(), layer);
        let area = TilingScheme::Geographic.tile_bounds(&TileAddress::new(2, 1, 1).unwrap());

        let result = prefetcher
            .prefetch_and_wait(PrefetchRequest::tiles(area, [2, 3]))
            .await
            .unwrap();

        assert_eq!(result.counts.succeeded, 5);
        let root = TileAddress::new(2, 1, 1).unwrap();
        assert!(cache.is_protected(&keys::tile_key("terrain", &root)));
    }

    #[tokio::test]
    async fn test_request_errors_are_synchronous() {
        let (prefetcher, _) =
            prefetcher(ScriptedFetcher::ok(), LayerConfig::partitioned("roads"));

        let err = prefetcher
            .prefetch(
                PrefetchRequest::tiles(GeoRectangle::world(), [1]),
                None,
                Box::new(|_| panic!("no completion for rejected requests")),
            )
            .unwrap_err();
        assert!(matches!(err, PrefetchError::AddressingMismatch { .. }));

        let err = prefetcher
            .prefetch_and_wait(PrefetchRequest::partitions(Vec::<String>::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, PrefetchError::EmptyRequest(_)));
        assert_eq!(prefetcher.active_operations(), 0);
    }

    #[test]
    fn test_prefetch_outside_runtime() {
        let (prefetcher, _) =
            prefetcher(ScriptedFetcher::ok(), LayerConfig::partitioned("roads"));
        let err = prefetcher
            .prefetch(PrefetchRequest::partitions(["a"]), None, Box::new(|_| {}))
            .unwrap_err();
        assert!(matches!(err, PrefetchError::NoRuntime));
    }

    #[tokio::test]
    async fn test_global_error_fails_operation() {
        let (prefetcher, _) = prefetcher(
            ScriptedFetcher::failing(&["p0"], FetchErrorKind::Unauthorized),
            LayerConfig::partitioned("roads"),
        );
        let ids: Vec<String> = (0..50).map(|i| format!("p{i}")).collect();

        let result = prefetcher
            .prefetch_and_wait(PrefetchRequest::partitions(ids))
            .await
            .unwrap();

        assert_eq!(result.state, PrefetchState::Failed);
        assert_eq!(result.error.as_ref().map(|e| e.kind), Some(FetchErrorKind::Unauthorized));
        assert_eq!(result.items.len(), 50);
        assert!(result.counts.cancelled > 0);
        for item in result.items.iter().filter(|i| i.is_cancelled()) {
            assert_eq!(
                item.outcome,
                crate::prefetch::ItemOutcome::Cancelled(CancelReason::GlobalFailure)
            );
        }
    }

    /// Yields `count` partitions, then panics.
    struct BrokenSequence {
        yielded: usize,
        count: usize,
    }

    impl Iterator for BrokenSequence {
        type Item = PrefetchTarget;

        fn next(&mut self) -> Option<PrefetchTarget> {
            if self.yielded == self.count {
                panic!("sequence broke after {} targets", self.count);
            }
            self.yielded += 1;
            Some(PrefetchTarget::Partition(format!("p{}", self.yielded)))
        }
    }

    fn operation(
        status: Arc<Mutex<PrefetchStatus>>,
        on_complete: CompletionCallback,
    ) -> Arc<Operation> {
        let cancellation = CancellationToken::new();
        Arc::new(Operation {
            id: 1,
            cache: Arc::new(ProtectedCache::new(ProtectedCacheConfig::default())),
            fetcher: Arc::new(ScriptedFetcher::ok()),
            layer: Arc::new(LayerConfig::partitioned("roads")),
            retry: RetryPolicy::None,
            queue: WorkQueue::new(2),
            aggregator: ResultAggregator::new(None, on_complete),
            status,
            stop: cancellation.child_token(),
            cancellation,
            failure: Mutex::new(None),
        })
    }

    #[tokio::test]
    async fn test_producer_panic_fails_operation() {
        let (tx, rx) = oneshot::channel();
        let status = Arc::new(Mutex::new(PrefetchStatus::new(1, 5)));
        let operation = operation(
            status,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );

        operation
            .run(BrokenSequence { yielded: 0, count: 3 }, 2, Arc::new(DashMap::new()))
            .await;

        let result = rx.await.unwrap();
        assert_eq!(result.state, PrefetchState::Failed);
        assert_eq!(result.error.as_ref().map(|e| e.kind), Some(FetchErrorKind::Other));
        // Everything the sequence produced is still reported once
        assert_eq!(result.items.len(), 3);
        assert_eq!(result.counts.succeeded + result.counts.cancelled, 3);
    }

    #[tokio::test]
    async fn test_status_is_terminal_when_completion_runs() {
        let (tx, rx) = oneshot::channel();
        let status = Arc::new(Mutex::new(PrefetchStatus::new(1, 2)));
        let seen = Arc::clone(&status);
        let operation = operation(
            status,
            Box::new(move |result| {
                let _ = tx.send((seen.lock().state, result.state));
            }),
        );

        let targets = vec![
            PrefetchTarget::Partition("a".to_string()),
            PrefetchTarget::Partition("b".to_string()),
        ];
        operation.run(targets.into_iter(), 2, Arc::new(DashMap::new())).await;

        let (status_state, result_state) = rx.await.unwrap();
        assert_eq!(result_state, PrefetchState::Completed);
        assert_eq!(status_state, PrefetchState::Completed);
    }

    #[tokio::test]
    async fn test_cancelled_huge_request_reports_every_target() {
        let cache = Arc::new(ProtectedCache::new(ProtectedCacheConfig::default()));
        let prefetcher = Prefetcher::new(
            Arc::clone(&cache),
            Arc::new(ScriptedFetcher::ok()),
            LayerConfig::tiled("terrain", 0, 10, TilingScheme::Geographic),
            PrefetchConfig::default()
                .with_max_concurrency(1)
                .with_queue_capacity(1)
                .with_retry(RetryPolicy::None),
        );
        // Whole world: 4^level tiles per level
        let total: u64 = (0..=8u32).map(|level| 1u64 << (2 * level)).sum();

        let (tx, rx) = oneshot::channel();
        let handle = prefetcher
            .prefetch(
                PrefetchRequest::tiles(GeoRectangle::world(), 0..=8),
                None,
                Box::new(move |result| {
                    let _ = tx.send(result);
                }),
            )
            .unwrap();
        handle.cancel();

        let result = rx.await.unwrap();
        assert_eq!(result.state, PrefetchState::Cancelled);
        assert_eq!(result.items.len() as u64, total);
        assert_eq!(result.counts.total() as u64, total);
    }

    #[tokio::test]
    async fn test_protect_and_release_helpers() {
        let (prefetcher, cache) =
            prefetcher(ScriptedFetcher::ok(), LayerConfig::partitioned("roads"));
        let tile = TileAddress::new(2, 1, 1).unwrap();

        prefetcher.protect_tiles("terrain", &[tile]);
        prefetcher.protect_partitions("roads", &["a"]);
        assert!(cache.is_protected("terrain::tile::19"));
        assert!(cache.is_protected("roads::partition::a"));

        prefetcher.release_tiles("terrain", &[tile]);
        prefetcher.release_partitions("roads", &["a"]);
        assert!(!cache.is_protected("terrain::tile::19"));
        assert!(!cache.is_protected("roads::partition::a"));
    }

    #[tokio::test]
    async fn test_cancel_all_stops_running_operations() {
        let fetcher = ScriptedFetcher {
            delay: Duration::from_millis(20),
            ..ScriptedFetcher::ok()
        };
        let (prefetcher, _) = prefetcher(fetcher, LayerConfig::partitioned("roads"));
        let ids: Vec<String> = (0..100).map(|i| format!("p{i}")).collect();

        let (tx, rx) = oneshot::channel();
        let handle = prefetcher
            .prefetch(
                PrefetchRequest::partitions(ids),
                None,
                Box::new(move |result| {
                    let _ = tx.send(result);
                }),
            )
            .unwrap();
        assert_eq!(prefetcher.active_operations(), 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(prefetcher.cancel_all(), 1);
        assert!(handle.is_cancelled());

        let result = rx.await.unwrap();
        assert_eq!(result.state, PrefetchState::Cancelled);
        assert_eq!(result.items.len(), 100);
        assert!(result.counts.cancelled > 0);
        assert!(handle.is_finished());
        assert_eq!(prefetcher.active_operations(), 0);
    }
}
