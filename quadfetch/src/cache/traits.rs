//! Backing store interface beneath the protected cache.
//!
//! The [`CacheStore`] trait is a domain-agnostic key-value interface for
//! durable storage. The [`ProtectedCache`](super::ProtectedCache) keeps the
//! authoritative in-memory index (values, expiry, protection) and writes
//! through to a store so that evicted-from-memory data can still be served.
//!
//! # Design Principles
//!
//! - **String keys**: Human-readable for debugging, flexible for any domain
//! - **Bytes values**: Raw blobs, no serialization opinions imposed
//! - **Expiry travels with the value**: stores persist it, callers decide
//! - **Dyn-compatible**: Uses `Pin<Box<dyn Future>>` for trait object support

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use thiserror::Error;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// When a cache entry stops being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// Entry never expires.
    #[default]
    Never,
    /// Entry expires at the given wall-clock time.
    At(SystemTime),
}

impl Expiry {
    /// Expiry `ttl` from now.
    pub fn after(ttl: Duration) -> Self {
        Expiry::At(SystemTime::now() + ttl)
    }

    /// Builds an expiry from an optional time-to-live.
    pub fn from_ttl(ttl: Option<Duration>) -> Self {
        ttl.map(Self::after).unwrap_or(Expiry::Never)
    }

    /// Returns true if the entry is expired at `now`.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        match self {
            Expiry::Never => false,
            Expiry::At(at) => *at <= now,
        }
    }

    /// Seconds since the unix epoch, `u64::MAX` for never.
    pub fn to_epoch_secs(&self) -> u64 {
        match self {
            Expiry::Never => u64::MAX,
            Expiry::At(at) => at
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Inverse of [`to_epoch_secs`](Self::to_epoch_secs).
    pub fn from_epoch_secs(secs: u64) -> Self {
        if secs == u64::MAX {
            Expiry::Never
        } else {
            Expiry::At(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        }
    }
}

/// A value read back from a store together with its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    pub value: Bytes,
    pub expiry: Expiry,
}

/// Result of an expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepResult {
    /// Number of entries removed during the sweep.
    pub entries_removed: usize,
    /// Total bytes freed during the sweep.
    pub bytes_freed: u64,
    /// Expired entries kept because they are protected.
    pub protected_skipped: usize,
}

impl SweepResult {
    /// Adds another sweep's counts to this one.
    pub fn merge(&mut self, other: &SweepResult) {
        self.entries_removed += other.entries_removed;
        self.bytes_freed += other.bytes_freed;
        self.protected_skipped += other.protected_skipped;
    }
}

impl fmt::Display for SweepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sweep: removed {} entries, freed {} bytes, kept {} protected",
            self.entries_removed, self.bytes_freed, self.protected_skipped
        )
    }
}

/// Errors that can occur in a backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error during store operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored record could not be decoded.
    #[error("Corrupt record for key '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// Key exceeds maximum allowed size.
    #[error("Key too large: {size} bytes (max: {max})")]
    KeyTooLarge { size: usize, max: usize },
}

/// Predicate deciding whether an expired key must be kept.
pub type KeepFn<'a> = &'a (dyn Fn(&str) -> bool + Send + Sync);

/// Durable key-value storage beneath the protected cache.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` for use across async tasks.
pub trait CacheStore: Send + Sync {
    /// Store a value, replacing any existing one.
    fn set(&self, key: &str, value: Bytes, expiry: Expiry)
        -> BoxFuture<'_, Result<(), StoreError>>;

    /// Retrieve a value and its expiry.
    ///
    /// Expired values are returned as-is; the caller decides whether
    /// protection keeps them alive.
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<StoredValue>, StoreError>>;

    /// Delete a value. Returns whether it existed.
    fn delete(&self, key: &str) -> BoxFuture<'_, Result<bool, StoreError>>;

    /// Delete every key starting with `prefix`. Returns the number removed.
    fn remove_keys_with_prefix(&self, prefix: &str) -> BoxFuture<'_, Result<usize, StoreError>>;

    /// Delete expired entries for which `keep` returns false.
    fn purge_expired<'a>(&'a self, keep: KeepFn<'a>)
        -> BoxFuture<'a, Result<SweepResult, StoreError>>;

    /// Delete everything.
    fn clear(&self) -> BoxFuture<'_, Result<(), StoreError>>;
}
