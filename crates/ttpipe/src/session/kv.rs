use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::sync::Cache;
use moka::Expiry;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Key-value store unavailable: {0}")]
    Unavailable(String),
}

/// Minimal key-value surface with per-key expiry, shaped after Redis
/// `SETEX` / `GET` / `EXPIRE` / `EXISTS` / `DEL`.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Resets the TTL of an existing key. Returns false when the key is
    /// absent; never creates one.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    async fn del(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct TtlEntry {
    value: String,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, TtlEntry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &TtlEntry, _at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &TtlEntry,
        _at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process [`KvStore`] on a moka cache with per-entry expiry.
pub struct MemoryKvStore {
    cache: Cache<String, TtlEntry>,
    // Serializes read-modify-write in `expire`
    write_lock: Mutex<()>,
}

impl MemoryKvStore {
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self {
            cache,
            write_lock: Mutex::new(()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, StoreError> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        self.cache.insert(key.to_string(), TtlEntry { value, ttl });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.cache.get(key).map(|entry| entry.value))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let _guard = self.lock()?;
        match self.cache.get(key) {
            Some(entry) => {
                self.cache.insert(
                    key.to_string(),
                    TtlEntry {
                        value: entry.value,
                        ttl,
                    },
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.cache.contains_key(key))
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        self.cache.invalidate(key);
        Ok(())
    }
}
