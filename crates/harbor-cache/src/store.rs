//! Storage traits.

use std::sync::Arc;

use async_trait::async_trait;
use harbor_net::Response;

use crate::{CacheResult, RequestIdentity};

/// A cached request/response pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Key the response is stored under.
    pub key: RequestIdentity,

    /// Stored response snapshot.
    pub response: Response,

    /// Monotonic insertion sequence within the store.
    pub inserted_at: u64,

    /// Wall-clock insertion time (ms since epoch).
    pub cached_at_ms: u64,
}

/// One cache namespace.
///
/// Single-key operations are atomic; concurrent puts to the same key are
/// last-write-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Name of the namespace this store backs.
    fn name(&self) -> &str;

    async fn get(&self, key: &RequestIdentity) -> CacheResult<Option<CacheEntry>>;

    /// Insert or replace. A replaced key moves to the newest position.
    async fn put(&self, key: RequestIdentity, response: Response) -> CacheResult<()>;

    async fn delete(&self, key: &RequestIdentity) -> CacheResult<bool>;

    /// Keys from oldest to newest insertion.
    async fn keys_in_order(&self) -> CacheResult<Vec<RequestIdentity>>;

    async fn len(&self) -> CacheResult<usize> {
        Ok(self.keys_in_order().await?.len())
    }

    /// Remove oldest entries until at most `max_entries` remain. Returns the
    /// evicted keys, oldest first.
    async fn evict_to(&self, max_entries: usize) -> CacheResult<Vec<RequestIdentity>> {
        let keys = self.keys_in_order().await?;
        let excess = keys.len().saturating_sub(max_entries);
        let mut evicted = Vec::with_capacity(excess);
        for key in keys.into_iter().take(excess) {
            if self.delete(&key).await? {
                evicted.push(key);
            }
        }
        Ok(evicted)
    }

    /// `put` followed by `evict_to(max_entries)`. Backends that can should
    /// do both under one lock so readers never see the store over its cap.
    async fn put_bounded(
        &self,
        key: RequestIdentity,
        response: Response,
        max_entries: usize,
    ) -> CacheResult<Vec<RequestIdentity>> {
        self.put(key, response).await?;
        self.evict_to(max_entries).await
    }
}

/// The set of all namespaces (the `caches` global).
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a namespace, creating it if it doesn't exist.
    async fn open(&self, name: &str) -> CacheResult<Arc<dyn CacheStore>>;

    async fn has(&self, name: &str) -> CacheResult<bool>;

    /// Delete a namespace and everything in it.
    async fn delete(&self, name: &str) -> CacheResult<bool>;

    /// Names of all namespaces.
    async fn keys(&self) -> CacheResult<Vec<String>>;
}
