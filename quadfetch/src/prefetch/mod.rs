//! Concurrent prefetching of layer data into the protected cache.
//!
//! A [`PrefetchRequest`] names either an area and a set of levels (tiled
//! layers) or a list of partition ids. The [`Prefetcher`] expands it into
//! a lazy sequence of [`PrefetchTarget`]s, fetches them with a bounded pool
//! of workers, stores each payload as a protected cache entry, and reports
//! every target exactly once through the callbacks.
//!
//! ```ignore
//! let prefetcher = Prefetcher::new(cache, fetcher, layer, PrefetchConfig::default());
//!
//! let handle = prefetcher.prefetch(
//!     PrefetchRequest::tiles(area, [10, 11]),
//!     Some(Box::new(|item| println!("{} done", item.target))),
//!     Box::new(|result| println!("{}", result.state)),
//! )?;
//!
//! // Later
//! handle.cancel();
//! ```

mod aggregator;
mod config;
mod enumerator;
mod error;
mod handle;
mod orchestrator;
mod request;
mod types;

pub use aggregator::{CompletionCallback, ItemCallback, ResultAggregator};
pub use config::{
    PrefetchConfig, DEFAULT_MAX_CONCURRENCY, DEFAULT_QUEUE_CAPACITY, DEFAULT_RETRY_ATTEMPTS,
};
pub use enumerator::{enumerate, AddressSequence, Enumeration, LevelWarning, LevelWarningReason};
pub use error::PrefetchError;
pub use handle::{CancellationHandle, PrefetchStatus};
pub use orchestrator::Prefetcher;
pub use request::{Addressing, LayerConfig, PrefetchRequest, TileRequest};
pub use types::{
    CancelReason, ItemOutcome, PrefetchAggregateResult, PrefetchCounts, PrefetchItemResult,
    PrefetchState, PrefetchSummary, PrefetchTarget,
};
