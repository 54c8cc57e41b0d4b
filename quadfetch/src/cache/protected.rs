//! Memory-bounded key-value cache with eviction protection.
//!
//! [`ProtectedCache`] keeps an in-memory index of byte blobs keyed by
//! string, with two eviction policies:
//!
//! - **Expiry**: entries past their [`Expiry`] read as absent and are
//!   removed by [`sweep`](ProtectedCache::sweep).
//! - **Capacity**: when the memory budget is exceeded, least-recently-used
//!   entries are dropped from memory (they stay in the backing store).
//!
//! Protected keys are exempt from both until released. Protection lives in
//! its own set, so a key can be protected before its value arrives.
//!
//! # Tiers
//!
//! With a [`CacheStore`] attached, every put is written through. A memory
//! miss falls back to the store and promotes the value back into memory.
//! Expiry sweeps and explicit deletes remove from both tiers.
//!
//! Puts, deletes and store fallbacks on the same key are serialized by a
//! per-key async lock, so both tiers see writes to a key in one order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::traits::{CacheStore, Expiry, StoreError, SweepResult};

/// Default memory budget (256 MB).
pub const DEFAULT_MAX_MEMORY_BYTES: u64 = 256 * 1024 * 1024;

/// Configuration for a [`ProtectedCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedCacheConfig {
    /// Memory budget in bytes. Protected entries may exceed it.
    pub max_memory_bytes: u64,
}

impl Default for ProtectedCacheConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
        }
    }
}

impl ProtectedCacheConfig {
    /// Set the memory budget.
    pub fn with_max_memory_bytes(mut self, bytes: u64) -> Self {
        self.max_memory_bytes = bytes;
        self
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries held in memory
    pub entries: usize,
    /// Bytes held in memory
    pub size_bytes: u64,
    /// Configured memory budget
    pub max_memory_bytes: u64,
    /// Keys currently protected (present or not)
    pub protected_keys: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped from memory to honor the budget
    pub evictions: u64,
}

struct Entry {
    value: Bytes,
    expiry: Expiry,
    /// Position in the LRU order
    tick: u64,
}

/// In-memory index. Every field is guarded by the same lock.
#[derive(Default)]
struct Index {
    entries: HashMap<String, Entry>,
    lru: BTreeMap<u64, String>,
    protected: HashSet<String>,
    size_bytes: u64,
    next_tick: u64,
}

impl Index {
    fn next_tick(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    fn insert(&mut self, key: String, value: Bytes, expiry: Expiry) {
        let tick = self.next_tick();
        let size = value.len() as u64;

        if let Some(old) = self.entries.insert(
            key.clone(),
            Entry {
                value,
                expiry,
                tick,
            },
        ) {
            self.lru.remove(&old.tick);
            self.size_bytes -= old.value.len() as u64;
        }

        self.lru.insert(tick, key);
        self.size_bytes += size;
    }

    /// Returns the value and marks it most recently used.
    fn touch(&mut self, key: &str) -> Option<Bytes> {
        let tick = self.next_tick();
        let entry = self.entries.get_mut(key)?;
        let old_tick = std::mem::replace(&mut entry.tick, tick);
        let value = entry.value.clone();

        self.lru.remove(&old_tick);
        self.lru.insert(tick, key.to_string());
        Some(value)
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(&entry.tick);
        self.size_bytes -= entry.value.len() as u64;
        Some(entry)
    }

    /// Drops unprotected entries, oldest first, until the budget holds.
    ///
    /// An unprotected `incoming` entry that would not fit even after every
    /// other unprotected entry is gone is dropped itself, leaving the rest
    /// alone. Returns the number of entries evicted.
    fn enforce_budget(&mut self, max_bytes: u64, incoming: Option<&str>) -> usize {
        if self.size_bytes <= max_bytes {
            return 0;
        }

        let mut evicted = 0;

        if let Some(key) = incoming {
            if !self.protected.contains(key) {
                let evictable: u64 = self
                    .entries
                    .iter()
                    .filter(|(k, _)| k.as_str() != key && !self.protected.contains(k.as_str()))
                    .map(|(_, e)| e.value.len() as u64)
                    .sum();
                if self.size_bytes - evictable > max_bytes {
                    self.remove(key);
                    evicted += 1;
                    if self.size_bytes <= max_bytes {
                        return evicted;
                    }
                }
            }
        }

        let mut excess = self.size_bytes - max_bytes;
        let mut victims = Vec::new();
        for key in self.lru.values() {
            if excess == 0 {
                break;
            }
            if self.protected.contains(key) || incoming == Some(key.as_str()) {
                continue;
            }
            if let Some(entry) = self.entries.get(key) {
                excess = excess.saturating_sub(entry.value.len() as u64);
                victims.push(key.clone());
            }
        }

        for key in &victims {
            self.remove(key);
        }
        evicted + victims.len()
    }
}

/// Per-key async locks around store I/O.
///
/// An entry lives only while someone holds or waits for its lock.
#[derive(Default)]
struct KeyLocks {
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl KeyLocks {
    async fn lock(&self, key: &str) -> KeyGuard<'_> {
        // Clone out of the map so no shard lock is held across the await
        let lock = Arc::clone(&*self.locks.entry(key.to_string()).or_default());
        let guard = lock.lock_owned().await;
        KeyGuard {
            locks: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    fn len(&self) -> usize {
        self.locks.len()
    }
}

struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Key-value cache whose entries can be pinned against eviction.
///
/// All methods take `&self`; the index is guarded by a single
/// `parking_lot::Mutex` that is never held across an await point.
pub struct ProtectedCache {
    index: Mutex<Index>,
    max_memory_bytes: u64,
    store: Option<Arc<dyn CacheStore>>,
    key_locks: KeyLocks,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ProtectedCache {
    /// Creates a memory-only cache.
    pub fn new(config: ProtectedCacheConfig) -> Self {
        Self {
            index: Mutex::new(Index::default()),
            max_memory_bytes: config.max_memory_bytes,
            store: None,
            key_locks: KeyLocks::default(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Creates a cache writing through to `store`.
    pub fn with_store(config: ProtectedCacheConfig, store: Arc<dyn CacheStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new(config)
        }
    }

    /// Returns true if a backing store is attached.
    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Inserts or overwrites a value. Protection is left untouched.
    ///
    /// # Errors
    ///
    /// Returns the backing store's error if the write-through fails. The
    /// memory copy is updated regardless.
    pub async fn put(
        &self,
        key: impl Into<String>,
        value: Bytes,
        expiry: Expiry,
    ) -> Result<(), StoreError> {
        self.put_inner(key.into(), value, expiry, false).await
    }

    /// Inserts a value and protects its key in one step.
    ///
    /// No other caller can evict the entry between the two.
    pub async fn put_protected(
        &self,
        key: impl Into<String>,
        value: Bytes,
        expiry: Expiry,
    ) -> Result<(), StoreError> {
        self.put_inner(key.into(), value, expiry, true).await
    }

    async fn put_inner(
        &self,
        key: String,
        value: Bytes,
        expiry: Expiry,
        protect: bool,
    ) -> Result<(), StoreError> {
        let _key_lock = match &self.store {
            Some(_) => Some(self.key_locks.lock(&key).await),
            None => None,
        };

        {
            let mut index = self.index.lock();
            if protect {
                index.protected.insert(key.clone());
            }
            index.insert(key.clone(), value.clone(), expiry);
            let evicted = index.enforce_budget(self.max_memory_bytes, Some(&key));
            self.record_evictions(evicted);
        }

        if let Some(store) = &self.store {
            store.set(&key, value, expiry).await?;
        }
        Ok(())
    }

    /// Looks up a value.
    ///
    /// Expired entries read as absent unless protected. A memory miss falls
    /// back to the backing store; store failures are logged and read as a
    /// miss.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        let now = SystemTime::now();

        let in_memory = {
            let mut index = self.index.lock();
            let expired = index.entries.get(key).map(|e| e.expiry.is_expired(now));
            match expired {
                Some(true) if !index.protected.contains(key) => {
                    index.remove(key);
                    Some(None)
                }
                Some(_) => Some(index.touch(key)),
                None => None,
            }
        };

        if let Some(found) = in_memory {
            self.record_lookup(found.is_some());
            return found;
        }

        let found = self.get_from_store(key, now).await;
        self.record_lookup(found.is_some());
        found
    }

    async fn get_from_store(&self, key: &str, now: SystemTime) -> Option<Bytes> {
        let store = self.store.as_ref()?;
        let _key_lock = self.key_locks.lock(key).await;

        let stored = match store.get(key).await {
            Ok(stored) => stored?,
            Err(e) => {
                warn!(key = %key, error = %e, "Backing store read failed");
                return None;
            }
        };

        let mut index = self.index.lock();
        if stored.expiry.is_expired(now) && !index.protected.contains(key) {
            return None;
        }

        // A concurrent put may have landed while the store was read
        if let Some(value) = index.touch(key) {
            return Some(value);
        }

        index.insert(key.to_string(), stored.value.clone(), stored.expiry);
        let evicted = index.enforce_budget(self.max_memory_bytes, Some(key));
        drop(index);
        self.record_evictions(evicted);

        Some(stored.value)
    }

    /// Returns true if memory holds a live (or protected) entry for `key`.
    pub fn contains(&self, key: &str) -> bool {
        let index = self.index.lock();
        match index.entries.get(key) {
            Some(entry) => {
                !entry.expiry.is_expired(SystemTime::now()) || index.protected.contains(key)
            }
            None => false,
        }
    }

    /// Marks keys as exempt from eviction. Absent keys may be protected.
    pub fn protect<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = self.index.lock();
        for key in keys {
            index.protected.insert(key.into());
        }
    }

    /// Removes protection from keys.
    ///
    /// Released entries become eligible for eviction immediately, so the
    /// memory budget is enforced again.
    pub fn release<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = self.index.lock();
        for key in keys {
            index.protected.remove(key.as_ref());
        }
        let evicted = index.enforce_budget(self.max_memory_bytes, None);
        drop(index);
        self.record_evictions(evicted);
    }

    /// Returns true if `key` is protected.
    pub fn is_protected(&self, key: &str) -> bool {
        self.index.lock().protected.contains(key)
    }

    /// Removes an entry and its protection from both tiers.
    ///
    /// Returns whether an entry existed in either tier.
    pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let _key_lock = match &self.store {
            Some(_) => Some(self.key_locks.lock(key).await),
            None => None,
        };

        let in_memory = {
            let mut index = self.index.lock();
            index.protected.remove(key);
            index.remove(key).is_some()
        };

        let in_store = match &self.store {
            Some(store) => store.delete(key).await?,
            None => false,
        };

        Ok(in_memory || in_store)
    }

    /// Removes every entry whose key starts with `prefix`, with protection.
    ///
    /// Returns the number of distinct entries removed from the larger tier.
    pub async fn remove_keys_with_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let removed_memory = {
            let mut index = self.index.lock();
            index.protected.retain(|key| !key.starts_with(prefix));

            let keys: Vec<String> = index
                .entries
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect();
            for key in &keys {
                index.remove(key);
            }
            keys.len()
        };

        let removed_store = match &self.store {
            Some(store) => store.remove_keys_with_prefix(prefix).await?,
            None => 0,
        };

        debug!(
            prefix = %prefix,
            memory = removed_memory,
            store = removed_store,
            "Removed keys with prefix"
        );
        Ok(removed_memory.max(removed_store))
    }

    /// Removes every entry and all protection from both tiers.
    pub async fn clear(&self) -> Result<(), StoreError> {
        {
            let mut index = self.index.lock();
            *index = Index::default();
        }

        if let Some(store) = &self.store {
            store.clear().await?;
        }
        info!("Cache cleared");
        Ok(())
    }

    /// Removes expired, unprotected entries.
    ///
    /// The returned counts cover the memory tier. The backing store is
    /// swept with the same protection set; its failures are logged.
    pub async fn sweep(&self) -> SweepResult {
        let now = SystemTime::now();
        let mut result = SweepResult::default();

        {
            let mut index = self.index.lock();
            let expired: Vec<String> = index
                .entries
                .iter()
                .filter(|(_, entry)| entry.expiry.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect();

            for key in expired {
                if index.protected.contains(&key) {
                    result.protected_skipped += 1;
                    continue;
                }
                if let Some(entry) = index.remove(&key) {
                    result.entries_removed += 1;
                    result.bytes_freed += entry.value.len() as u64;
                }
            }
        }

        if let Some(store) = &self.store {
            let keep = |key: &str| self.is_protected(key);
            match store.purge_expired(&keep).await {
                Ok(store_result) => debug!(result = %store_result, "Backing store swept"),
                Err(e) => warn!(error = %e, "Backing store sweep failed"),
            }
        }

        if result.entries_removed > 0 {
            debug!(result = %result, "Memory sweep finished");
        }
        result
    }

    /// Spawns a task sweeping expired entries every `interval`.
    ///
    /// The task stops when `token` is cancelled.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Cache sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        cache.sweep().await;
                    }
                }
            }
        })
    }

    /// Returns current statistics.
    pub fn stats(&self) -> CacheStats {
        let index = self.index.lock();
        CacheStats {
            entries: index.entries.len(),
            size_bytes: index.size_bytes,
            max_memory_bytes: self.max_memory_bytes,
            protected_keys: index.protected.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn record_lookup(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_evictions(&self, evicted: usize) {
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{BoxFuture, DiskStore, KeepFn, StoredValue};
    use tempfile::TempDir;

    fn cache(max_memory_bytes: u64) -> ProtectedCache {
        ProtectedCache::new(ProtectedCacheConfig::default().with_max_memory_bytes(max_memory_bytes))
    }

    fn blob(len: usize) -> Bytes {
        Bytes::from(vec![7u8; len])
    }

    fn expired() -> Expiry {
        Expiry::At(SystemTime::now() - Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = cache(1024);
        cache
            .put("key", Bytes::from_static(b"value"), Expiry::Never)
            .await
            .unwrap();

        assert_eq!(cache.get("key").await, Some(Bytes::from_static(b"value")));
        assert!(cache.contains("key"));
        assert!(cache.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_and_tracks_size() {
        let cache = cache(1024);
        cache.put("key", blob(10), Expiry::Never).await.unwrap();
        cache.put("key", blob(4), Expiry::Never).await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.size_bytes, 4);
    }

    #[tokio::test]
    async fn test_expired_entry_reads_absent() {
        let cache = cache(1024);
        cache.put("key", blob(3), expired()).await.unwrap();

        assert!(!cache.contains("key"));
        assert!(cache.get("key").await.is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_protected_expired_entry_still_readable() {
        let cache = cache(1024);
        cache.put("key", blob(3), expired()).await.unwrap();
        cache.protect(["key"]);

        assert!(cache.contains("key"));
        assert_eq!(cache.get("key").await, Some(blob(3)));
    }

    #[tokio::test]
    async fn test_protect_survives_sweep_until_released() {
        let cache = cache(1024);
        cache.put("k", blob(3), expired()).await.unwrap();
        cache.protect(["k"]);

        let result = cache.sweep().await;
        assert_eq!(result.entries_removed, 0);
        assert_eq!(result.protected_skipped, 1);
        assert!(cache.contains("k"));

        cache.release(["k"]);
        let result = cache.sweep().await;
        assert_eq!(result.entries_removed, 1);
        assert_eq!(result.bytes_freed, 3);
        assert!(!cache.contains("k"));
    }

    #[tokio::test]
    async fn test_protect_absent_key_is_legal() {
        let cache = cache(1024);
        cache.protect(["later"]);
        assert!(cache.is_protected("later"));
        assert!(!cache.contains("later"));

        cache.put("later", blob(1), Expiry::Never).await.unwrap();
        assert!(cache.is_protected("later"));
    }

    #[tokio::test]
    async fn test_put_keeps_protection() {
        let cache = cache(1024);
        cache.put("k", blob(1), Expiry::Never).await.unwrap();
        cache.protect(["k"]);
        cache.put("k", blob(2), Expiry::Never).await.unwrap();

        assert!(cache.is_protected("k"));
        assert_eq!(cache.get("k").await, Some(blob(2)));
    }

    #[tokio::test]
    async fn test_memory_budget_evicts_least_recently_used() {
        let cache = cache(30);
        cache.put("key1", blob(20), Expiry::Never).await.unwrap();
        cache.put("key2", blob(20), Expiry::Never).await.unwrap();

        assert!(!cache.contains("key1"));
        assert!(cache.contains("key2"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_memory_budget_respects_recent_reads() {
        let cache = cache(30);
        cache.put("a", blob(10), Expiry::Never).await.unwrap();
        cache.put("b", blob(10), Expiry::Never).await.unwrap();
        cache.get("a").await;
        cache.put("c", blob(10), Expiry::Never).await.unwrap();
        cache.put("d", blob(10), Expiry::Never).await.unwrap();

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
    }

    #[tokio::test]
    async fn test_memory_budget_never_evicts_protected() {
        let cache = cache(30);
        cache.put("key1", blob(20), Expiry::Never).await.unwrap();
        cache.protect(["key1"]);
        cache.put("key2", blob(20), Expiry::Never).await.unwrap();

        assert!(cache.contains("key1"));
        assert!(!cache.contains("key2"));
    }

    #[tokio::test]
    async fn test_put_protected_over_budget_is_kept() {
        let cache = cache(10);
        cache.put_protected("big", blob(50), Expiry::Never).await.unwrap();

        assert!(cache.is_protected("big"));
        assert_eq!(cache.get("big").await, Some(blob(50)));
    }

    #[tokio::test]
    async fn test_release_enforces_budget() {
        let cache = cache(30);
        cache.put_protected("a", blob(20), Expiry::Never).await.unwrap();
        cache.put_protected("b", blob(20), Expiry::Never).await.unwrap();
        assert_eq!(cache.stats().size_bytes, 40);

        cache.release(["a"]);
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
    }

    #[tokio::test]
    async fn test_delete_drops_protection() {
        let cache = cache(1024);
        cache.put_protected("k", blob(1), Expiry::Never).await.unwrap();

        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.is_protected("k"));
        assert!(!cache.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_keys_with_prefix() {
        let cache = cache(1024);
        for key in ["key1", "key10", "key2"] {
            cache.put(key, blob(1), Expiry::Never).await.unwrap();
        }
        cache.protect(["key10"]);

        let removed = cache.remove_keys_with_prefix("key1").await.unwrap();
        assert_eq!(removed, 2);
        assert!(!cache.contains("key1"));
        assert!(!cache.contains("key10"));
        assert!(!cache.is_protected("key10"));
        assert!(cache.contains("key2"));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = cache(1024);
        cache.put_protected("a", blob(1), Expiry::Never).await.unwrap();
        cache.put("b", blob(1), Expiry::Never).await.unwrap();

        cache.clear().await.unwrap();
        let stats = cache.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.size_bytes, 0);
        assert_eq!(stats.protected_keys, 0);
    }

    #[tokio::test]
    async fn test_hit_and_miss_counters() {
        let cache = cache(1024);
        cache.put("k", blob(1), Expiry::Never).await.unwrap();
        cache.get("k").await;
        cache.get("nope").await;

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_store_serves_entries_evicted_from_memory() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(DiskStore::open(dir.path()).await.unwrap());
        let cache =
            ProtectedCache::with_store(ProtectedCacheConfig::default().with_max_memory_bytes(30), store);

        cache.put("key1", blob(20), Expiry::Never).await.unwrap();
        cache.put("key2", blob(20), Expiry::Never).await.unwrap();
        assert!(!cache.contains("key1"));

        // Promoted back into memory, evicting key2
        assert_eq!(cache.get("key1").await, Some(blob(20)));
        assert!(cache.contains("key1"));
        assert!(!cache.contains("key2"));
    }

    /// Memory-backed store whose writes of `slow_value` take a while.
    #[derive(Default)]
    struct SlowStore {
        values: Mutex<HashMap<String, StoredValue>>,
        slow_value: Option<Bytes>,
    }

    impl CacheStore for SlowStore {
        fn set(&self, key: &str, value: Bytes, expiry: Expiry) -> BoxFuture<'_, Result<(), StoreError>> {
            let key = key.to_string();
            Box::pin(async move {
                if self.slow_value.as_ref() == Some(&value) {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                self.values.lock().insert(key, StoredValue { value, expiry });
                Ok(())
            })
        }

        fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<StoredValue>, StoreError>> {
            let found = self.values.lock().get(key).cloned();
            Box::pin(async move {
                // Give a concurrent delete the chance to run first
                tokio::task::yield_now().await;
                Ok(found)
            })
        }

        fn delete(&self, key: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
            let existed = self.values.lock().remove(key).is_some();
            Box::pin(async move { Ok(existed) })
        }

        fn remove_keys_with_prefix(&self, prefix: &str) -> BoxFuture<'_, Result<usize, StoreError>> {
            let mut values = self.values.lock();
            let before = values.len();
            values.retain(|key, _| !key.starts_with(prefix));
            let removed = before - values.len();
            Box::pin(async move { Ok(removed) })
        }

        fn purge_expired<'a>(&'a self, _keep: KeepFn<'a>) -> BoxFuture<'a, Result<SweepResult, StoreError>> {
            Box::pin(async { Ok(SweepResult::default()) })
        }

        fn clear(&self) -> BoxFuture<'_, Result<(), StoreError>> {
            self.values.lock().clear();
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn test_concurrent_puts_keep_tiers_in_step() {
        let store = Arc::new(SlowStore {
            slow_value: Some(Bytes::from_static(b"A")),
            ..SlowStore::default()
        });
        let cache = Arc::new(ProtectedCache::with_store(
            ProtectedCacheConfig::default().with_max_memory_bytes(4),
            store.clone(),
        ));

        let first = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.put("k", Bytes::from_static(b"A"), Expiry::Never).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.put("k", Bytes::from_static(b"B"), Expiry::Never).await.unwrap();
        first.await.unwrap().unwrap();

        assert_eq!(cache.get("k").await, Some(Bytes::from_static(b"B")));

        // Push "k" out of memory so the store answers
        cache.put("other", blob(4), Expiry::Never).await.unwrap();
        assert!(!cache.contains("k"));
        assert_eq!(cache.get("k").await, Some(Bytes::from_static(b"B")));
        assert_eq!(cache.key_locks.len(), 0);
    }

    #[tokio::test]
    async fn test_delete_during_store_read_is_not_undone() {
        let store = Arc::new(SlowStore::default());
        let cache = Arc::new(ProtectedCache::with_store(
            ProtectedCacheConfig::default().with_max_memory_bytes(4),
            store.clone(),
        ));

        cache.put("k", blob(4), Expiry::Never).await.unwrap();
        cache.put("other", blob(4), Expiry::Never).await.unwrap();
        assert!(!cache.contains("k"));

        let (read, deleted) = tokio::join!(cache.get("k"), cache.delete("k"));
        assert!(deleted.unwrap());
        // The read finished before the delete started
        assert_eq!(read, Some(blob(4)));
        assert!(!cache.contains("k"));
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_sweep_removes_from_store_except_protected() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(DiskStore::open(dir.path()).await.unwrap());
        let cache = ProtectedCache::with_store(ProtectedCacheConfig::default(), store.clone());

        cache.put("stale", blob(2), expired()).await.unwrap();
        cache.put_protected("pinned", blob(2), expired()).await.unwrap();

        cache.sweep().await;
        assert!(store.get("stale").await.unwrap().is_none());
        assert!(store.get("pinned").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweeper_task_stops_on_cancel() {
        let cache = Arc::new(cache(1024));
        cache.put("k", blob(1), expired()).await.unwrap();

        let token = CancellationToken::new();
        let handle = cache.spawn_sweeper(Duration::from_millis(10), token.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.stats().entries, 0);

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should stop")
            .unwrap();
    }
}
