//! In-memory cache backend.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hashbrown::HashMap;
use harbor_net::Response;
use lru::LruCache;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::{CacheEntry, CacheError, CacheResult, CacheStorage, CacheStore, RequestIdentity};

struct Entries {
    // Read with `peek` only, so order is pure insertion order.
    map: LruCache<RequestIdentity, CacheEntry>,
    next_seq: u64,
    bytes: usize,
}

/// A single in-memory namespace.
pub struct MemoryStore {
    name: String,
    entries: RwLock<Entries>,
    max_bytes: Option<usize>,
}

impl MemoryStore {
    /// Create an unbounded store.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(Entries {
                map: LruCache::unbounded(),
                next_seq: 0,
                bytes: 0,
            }),
            max_bytes: None,
        }
    }

    /// Reject writes that would push stored body bytes past `max_bytes`.
    pub fn with_quota(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Total stored body bytes.
    pub async fn size_bytes(&self) -> usize {
        self.entries.read().await.bytes
    }
}

impl Entries {
    fn evict_to(&mut self, max_entries: usize) -> Vec<RequestIdentity> {
        let mut evicted = Vec::new();
        while self.map.len() > max_entries {
            let Some((key, removed)) = self.map.pop_lru() else {
                break;
            };
            self.bytes -= removed.response.body_len();
            evicted.push(key);
        }
        evicted
    }
}

impl MemoryStore {
    fn insert(
        &self,
        entries: &mut Entries,
        key: RequestIdentity,
        response: Response,
    ) -> CacheResult<()> {
        let size = response.body_len();
        let replaced = entries
            .map
            .peek(&key)
            .map(|e| e.response.body_len())
            .unwrap_or(0);
        let needed = entries.bytes - replaced + size;
        if let Some(limit) = self.max_bytes {
            if needed > limit {
                return Err(CacheError::QuotaExceeded {
                    cache: self.name.clone(),
                    needed,
                    limit,
                });
            }
        }

        let seq = entries.next_seq;
        entries.next_seq += 1;
        trace!(cache = %self.name, key = %key, seq, "Storing entry");

        // Remove first so a replaced key moves to the newest position.
        entries.map.pop(&key);
        entries.map.put(
            key.clone(),
            CacheEntry {
                key,
                response,
                inserted_at: seq,
                cached_at_ms: now_ms(),
            },
        );
        entries.bytes = needed;
        Ok(())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &RequestIdentity) -> CacheResult<Option<CacheEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.map.peek(key).cloned())
    }

    async fn put(&self, key: RequestIdentity, response: Response) -> CacheResult<()> {
        let mut entries = self.entries.write().await;
        self.insert(&mut entries, key, response)
    }

    async fn delete(&self, key: &RequestIdentity) -> CacheResult<bool> {
        let mut entries = self.entries.write().await;
        match entries.map.pop(key) {
            Some(removed) => {
                entries.bytes -= removed.response.body_len();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn keys_in_order(&self) -> CacheResult<Vec<RequestIdentity>> {
        let entries = self.entries.read().await;
        // `iter` runs newest to oldest.
        Ok(entries.map.iter().rev().map(|(k, _)| k.clone()).collect())
    }

    async fn len(&self) -> CacheResult<usize> {
        Ok(self.entries.read().await.map.len())
    }

    async fn evict_to(&self, max_entries: usize) -> CacheResult<Vec<RequestIdentity>> {
        let mut entries = self.entries.write().await;
        Ok(entries.evict_to(max_entries))
    }

    async fn put_bounded(
        &self,
        key: RequestIdentity,
        response: Response,
        max_entries: usize,
    ) -> CacheResult<Vec<RequestIdentity>> {
        let mut entries = self.entries.write().await;
        self.insert(&mut entries, key, response)?;
        Ok(entries.evict_to(max_entries))
    }
}

/// In-memory [`CacheStorage`].
#[derive(Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<HashMap<String, Arc<MemoryStore>>>,
    quota_per_store: Option<usize>,
}

impl MemoryCacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a byte quota to every namespace opened from now on.
    pub fn with_quota_per_store(mut self, max_bytes: usize) -> Self {
        self.quota_per_store = Some(max_bytes);
        self
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> CacheResult<Arc<dyn CacheStore>> {
        if let Some(store) = self.caches.read().await.get(name) {
            return Ok(store.clone());
        }

        let mut caches = self.caches.write().await;
        let store = caches
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(cache = %name, "Creating cache namespace");
                let store = MemoryStore::new(name);
                Arc::new(match self.quota_per_store {
                    Some(limit) => store.with_quota(limit),
                    None => store,
                })
            })
            .clone();
        Ok(store)
    }

    async fn has(&self, name: &str) -> CacheResult<bool> {
        Ok(self.caches.read().await.contains_key(name))
    }

    async fn delete(&self, name: &str) -> CacheResult<bool> {
        Ok(self.caches.write().await.remove(name).is_some())
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
