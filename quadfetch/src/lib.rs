//! Quadfetch - concurrent prefetching of tiled and partitioned map data.
//!
//! The crate fills a local cache with data from a remote layer ahead of
//! use, and pins what it fetched so eviction leaves it alone until the
//! caller releases it.
//!
//! # Modules
//!
//! - [`tile`]: quadtree tile addresses and quadkeys
//! - [`coord`]: geographic rectangles and tiling schemes
//! - [`cache`]: memory cache with protected entries over an optional disk store
//! - [`executor`]: bounded work queue and retry policy
//! - [`provider`]: the [`Fetcher`](provider::Fetcher) seam and its HTTP implementation
//! - [`prefetch`]: request expansion, the worker pool and result aggregation
//! - [`config`]: INI configuration
//! - [`logging`]: tracing subscriber setup
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use quadfetch::cache::{ProtectedCache, ProtectedCacheConfig};
//! use quadfetch::coord::{GeoRectangle, TilingScheme};
//! use quadfetch::prefetch::{LayerConfig, PrefetchConfig, PrefetchRequest, Prefetcher};
//! use quadfetch::provider::HttpFetcher;
//!
//! let cache = Arc::new(ProtectedCache::new(ProtectedCacheConfig::default()));
//! let fetcher = Arc::new(HttpFetcher::new("https://tiles.example.com/{layer}/{quadkey}", "terrain")?);
//! let layer = LayerConfig::tiled("terrain", 0, 16, TilingScheme::Geographic);
//!
//! let prefetcher = Prefetcher::new(cache, fetcher, layer, PrefetchConfig::default());
//! let area = GeoRectangle::new(-122.6, 37.5, -122.3, 37.9)?;
//! let result = prefetcher.prefetch_and_wait(PrefetchRequest::tiles(area, [10, 11, 12])).await?;
//! println!("{} tiles cached", result.counts.succeeded);
//! ```

pub mod cache;
pub mod config;
pub mod coord;
pub mod executor;
pub mod logging;
pub mod prefetch;
pub mod provider;
pub mod tile;
