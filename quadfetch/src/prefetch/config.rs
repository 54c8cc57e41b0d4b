//! Configuration for the prefetch orchestrator.

use crate::executor::RetryPolicy;

// ==================== Prefetch Defaults ====================

/// Default number of concurrent fetch workers.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Default capacity of the work queue between producer and workers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Default attempts per target, including the first.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Configuration for a [`Prefetcher`](super::Prefetcher).
#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchConfig {
    /// Number of worker tasks fetching in parallel.
    ///
    /// Default: 4.
    pub max_concurrency: usize,

    /// Items the producer may queue ahead of the workers.
    ///
    /// Default: 16.
    pub queue_capacity: usize,

    /// Retry schedule for transient fetch errors.
    ///
    /// Default: exponential backoff, 3 attempts.
    pub retry: RetryPolicy,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry: RetryPolicy::exponential(DEFAULT_RETRY_ATTEMPTS),
        }
    }
}

impl PrefetchConfig {
    /// Set the number of workers (minimum 1).
    pub fn with_max_concurrency(mut self, workers: usize) -> Self {
        self.max_concurrency = workers.max(1);
        self
    }

    /// Set the work queue capacity (minimum 1).
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
