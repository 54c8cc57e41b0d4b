//! On-disk backing store.
//!
//! One file per key under a flat directory. The file name is the lowercase
//! SHA-256 hex of the key; the body is a small header followed by the value:
//!
//! ```text
//! [0..8)            expiry, unix seconds, big-endian (u64::MAX = never)
//! [8..12)           key length, big-endian u32
//! [12..12+len)      key bytes (UTF-8)
//! [12+len..)        value
//! ```
//!
//! Keeping the key in the record lets prefix removal and expiry sweeps
//! recover keys from hashed file names. Writes go to a temporary file that
//! is renamed into place, so readers never observe a partial record.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::traits::{BoxFuture, CacheStore, Expiry, KeepFn, StoreError, StoredValue, SweepResult};

/// Size of the fixed part of a record header.
const HEADER_LEN: usize = 12;

/// Longest key a record can hold.
pub const MAX_KEY_LEN: usize = 64 * 1024;

/// Suffix of in-progress writes.
const TMP_SUFFIX: &str = ".tmp";

/// Backing store keeping one file per key in a directory.
pub struct DiskStore {
    dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl DiskStore {
    /// Opens (and creates if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "Disk store opened");
        Ok(Self {
            dir,
            tmp_counter: AtomicU64::new(0),
        })
    }

    /// Returns the store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(hash_key(key))
    }

    /// Reads every committed record, skipping temporary files.
    ///
    /// Corrupt records are removed and logged.
    async fn scan(&self) -> Result<Vec<(PathBuf, u64, String, Expiry)>, StoreError> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_tmp = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(TMP_SUFFIX))
                .unwrap_or(true);
            if is_tmp {
                continue;
            }

            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                // Deleted concurrently
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let size = data.len() as u64;

            match decode_record(Bytes::from(data)) {
                Ok((key, stored)) => records.push((path, size, key, stored.expiry)),
                Err(reason) => {
                    warn!(path = %path.display(), reason = %reason, "Removing corrupt cache record");
                    remove_if_exists(&path).await?;
                }
            }
        }

        Ok(records)
    }
}

impl CacheStore for DiskStore {
    fn set(&self, key: &str, value: Bytes, expiry: Expiry) -> BoxFuture<'_, Result<(), StoreError>> {
        let key = key.to_string();
        Box::pin(async move {
            let record = encode_record(&key, &value, expiry)?;
            let path = self.path_for(&key);
            let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
            let tmp = path.with_extension(format!("{}{}", n, TMP_SUFFIX));

            tokio::fs::write(&tmp, record).await?;
            if let Err(e) = tokio::fs::rename(&tmp, &path).await {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(e.into());
            }
            Ok(())
        })
    }

    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<StoredValue>, StoreError>> {
        let key = key.to_string();
        Box::pin(async move {
            let data = match tokio::fs::read(self.path_for(&key)).await {
                Ok(data) => data,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            let (stored_key, stored) = decode_record(Bytes::from(data)).map_err(|reason| {
                StoreError::Corrupt {
                    key: key.clone(),
                    reason,
                }
            })?;

            // A hash collision is treated as a miss
            if stored_key != key {
                return Ok(None);
            }
            Ok(Some(stored))
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        let path = self.path_for(key);
        Box::pin(async move { remove_if_exists(&path).await })
    }

    fn remove_keys_with_prefix(&self, prefix: &str) -> BoxFuture<'_, Result<usize, StoreError>> {
        let prefix = prefix.to_string();
        Box::pin(async move {
            let mut removed = 0;
            for (path, _, key, _) in self.scan().await? {
                if key.starts_with(&prefix) && remove_if_exists(&path).await? {
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }

    fn purge_expired<'a>(
        &'a self,
        keep: KeepFn<'a>,
    ) -> BoxFuture<'a, Result<SweepResult, StoreError>> {
        Box::pin(async move {
            let now = SystemTime::now();
            let mut result = SweepResult::default();

            for (path, size, key, expiry) in self.scan().await? {
                if !expiry.is_expired(now) {
                    continue;
                }
                if keep(&key) {
                    result.protected_skipped += 1;
                    continue;
                }
                if remove_if_exists(&path).await? {
                    result.entries_removed += 1;
                    result.bytes_freed += size;
                }
            }

            Ok(result)
        })
    }

    fn clear(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut entries = tokio::fs::read_dir(&self.dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                remove_if_exists(&entry.path()).await?;
            }
            Ok(())
        })
    }
}

/// Lowercase SHA-256 hex of a key.
fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

async fn remove_if_exists(path: &Path) -> Result<bool, StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn encode_record(key: &str, value: &[u8], expiry: Expiry) -> Result<Vec<u8>, StoreError> {
    if key.len() > MAX_KEY_LEN {
        return Err(StoreError::KeyTooLarge {
            size: key.len(),
            max: MAX_KEY_LEN,
        });
    }

    let mut record = Vec::with_capacity(HEADER_LEN + key.len() + value.len());
    record.extend_from_slice(&expiry.to_epoch_secs().to_be_bytes());
    record.extend_from_slice(&(key.len() as u32).to_be_bytes());
    record.extend_from_slice(key.as_bytes());
    record.extend_from_slice(value);
    Ok(record)
}

fn decode_record(data: Bytes) -> Result<(String, StoredValue), String> {
    if data.len() < HEADER_LEN {
        return Err(format!("record too short: {} bytes", data.len()));
    }

    let mut expiry_bytes = [0u8; 8];
    expiry_bytes.copy_from_slice(&data[0..8]);
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&data[8..12]);

    let key_len = u32::from_be_bytes(len_bytes) as usize;
    let key_end = HEADER_LEN + key_len;
    if data.len() < key_end {
        return Err(format!(
            "key length {} exceeds record size {}",
            key_len,
            data.len()
        ));
    }

    let key = std::str::from_utf8(&data[HEADER_LEN..key_end])
        .map_err(|e| format!("key is not UTF-8: {}", e))?
        .to_string();

    Ok((
        key,
        StoredValue {
            value: data.slice(key_end..),
            expiry: Expiry::from_epoch_secs(u64::from_be_bytes(expiry_bytes)),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn store() -> (TempDir, DiskStore) {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::open(dir.path().join("cache")).await.unwrap();
        (dir, store)
    }

    fn expired() -> Expiry {
        Expiry::At(SystemTime::now() - Duration::from_secs(60))
    }

    #[test]
    fn test_hash_key_is_sha256_hex() {
        let hash = hash_key("hello");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_decode_rejects_truncated_record() {
        assert!(decode_record(Bytes::from_static(&[0, 1, 2])).is_err());

        let mut record = encode_record("key", b"value", Expiry::Never).unwrap();
        record.truncate(HEADER_LEN + 1);
        assert!(decode_record(Bytes::from(record)).is_err());
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (_dir, store) = store().await;

        store
            .set("layer::42", Bytes::from_static(b"payload"), Expiry::Never)
            .await
            .unwrap();

        let stored = store.get("layer::42").await.unwrap().unwrap();
        assert_eq!(stored.value, Bytes::from_static(b"payload"));
        assert_eq!(stored.expiry, Expiry::Never);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let (_dir, store) = store().await;
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_name_is_key_hash() {
        let (_dir, store) = store().await;
        store
            .set("key1", Bytes::from_static(b"v"), Expiry::Never)
            .await
            .unwrap();

        assert!(store.dir().join(hash_key("key1")).exists());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let (_dir, store) = store().await;
        store
            .set("k", Bytes::from_static(b"one"), Expiry::Never)
            .await
            .unwrap();
        store
            .set("k", Bytes::from_static(b"two"), Expiry::Never)
            .await
            .unwrap();

        let stored = store.get("k").await.unwrap().unwrap();
        assert_eq!(stored.value, Bytes::from_static(b"two"));
    }

    #[tokio::test]
    async fn test_delete() {
        let (_dir, store) = store().await;
        store
            .set("k", Bytes::from_static(b"v"), Expiry::Never)
            .await
            .unwrap();

        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_keys_with_prefix() {
        let (_dir, store) = store().await;
        for key in ["key1", "key10", "key2", "other"] {
            store
                .set(key, Bytes::from_static(b"v"), Expiry::Never)
                .await
                .unwrap();
        }

        let removed = store.remove_keys_with_prefix("key1").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get("key1").await.unwrap().is_none());
        assert!(store.get("key10").await.unwrap().is_none());
        assert!(store.get("key2").await.unwrap().is_some());
        assert!(store.get("other").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_expired_respects_keep() {
        let (_dir, store) = store().await;
        store
            .set("stale", Bytes::from_static(b"a"), expired())
            .await
            .unwrap();
        store
            .set("kept", Bytes::from_static(b"b"), expired())
            .await
            .unwrap();
        store
            .set("fresh", Bytes::from_static(b"c"), Expiry::Never)
            .await
            .unwrap();

        let keep = |key: &str| key == "kept";
        let result = store.purge_expired(&keep).await.unwrap();

        assert_eq!(result.entries_removed, 1);
        assert_eq!(result.protected_skipped, 1);
        assert!(result.bytes_freed > 0);
        assert!(store.get("stale").await.unwrap().is_none());
        assert!(store.get("kept").await.unwrap().is_some());
        assert!(store.get("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupt_record_removed_on_scan() {
        let (_dir, store) = store().await;
        let path = store.dir().join(hash_key("junk"));
        tokio::fs::write(&path, b"xx").await.unwrap();

        let keep = |_: &str| false;
        store.purge_expired(&keep).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_get_corrupt_record_is_error() {
        let (_dir, store) = store().await;
        tokio::fs::write(store.dir().join(hash_key("bad")), b"xx")
            .await
            .unwrap();

        let result = store.get("bad").await;
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_clear() {
        let (_dir, store) = store().await;
        for key in ["a", "b", "c"] {
            store
                .set(key, Bytes::from_static(b"v"), Expiry::Never)
                .await
                .unwrap();
        }

        store.clear().await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert_eq!(std::fs::read_dir(store.dir()).unwrap().count(), 0);
    }
}
