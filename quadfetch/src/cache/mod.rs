//! Protected key-value cache.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │        ProtectedCache        │  expiry, LRU budget, protect/release
//! │  (parking_lot::Mutex index)  │
//! └──────────────┬───────────────┘
//!                │ write-through / fallback reads
//!                ▼
//! ┌──────────────────────────────┐
//! │     dyn CacheStore (opt.)    │  DiskStore: one file per key
//! └──────────────────────────────┘
//! ```
//!
//! Prefetched payloads are stored under keys from [`keys`], then protected
//! so that neither expiry sweeps nor memory pressure drop them until the
//! caller releases them.

mod disk;
pub mod keys;
mod protected;
mod traits;

pub use disk::{DiskStore, MAX_KEY_LEN};
pub use protected::{CacheStats, ProtectedCache, ProtectedCacheConfig, DEFAULT_MAX_MEMORY_BYTES};
pub use traits::{BoxFuture, CacheStore, Expiry, KeepFn, StoreError, StoredValue, SweepResult};
