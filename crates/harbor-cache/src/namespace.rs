//! Namespace handles and the eviction policy.

use std::sync::Arc;

use harbor_core::{CacheNamespace, NamespaceKind};
use harbor_net::Response;
use tracing::debug;

use crate::{CacheEntry, CacheResult, CacheStorage, CacheStore, RequestIdentity};

/// An opened cache namespace.
///
/// Bounded namespaces evict oldest-first after every insert so that
/// `len() <= max_entries` holds once `put` returns.
#[derive(Clone)]
pub struct Namespace {
    descriptor: CacheNamespace,
    store: Arc<dyn CacheStore>,
}

impl Namespace {
    /// Open (or create) the namespace in `storage`.
    pub async fn open(storage: &dyn CacheStorage, descriptor: CacheNamespace) -> CacheResult<Self> {
        let store = storage.open(&descriptor.name).await?;
        Ok(Self { descriptor, store })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn kind(&self) -> NamespaceKind {
        self.descriptor.kind
    }

    pub fn descriptor(&self) -> &CacheNamespace {
        &self.descriptor
    }

    pub async fn get(&self, key: &RequestIdentity) -> CacheResult<Option<CacheEntry>> {
        self.store.get(key).await
    }

    /// Store a response and evict down to the cap in one step. Returns the
    /// evicted keys.
    pub async fn put(&self, key: RequestIdentity, response: Response) -> CacheResult<Vec<RequestIdentity>> {
        let evicted = match self.cap() {
            Some(max) => self.store.put_bounded(key, response, max).await?,
            None => {
                self.store.put(key, response).await?;
                Vec::new()
            }
        };
        self.log_evictions(&evicted);
        Ok(evicted)
    }

    pub async fn delete(&self, key: &RequestIdentity) -> CacheResult<bool> {
        self.store.delete(key).await
    }

    pub async fn keys_in_order(&self) -> CacheResult<Vec<RequestIdentity>> {
        self.store.keys_in_order().await
    }

    pub async fn len(&self) -> CacheResult<usize> {
        self.store.len().await
    }

    /// Evict oldest entries until the namespace is within its cap.
    pub async fn trim(&self) -> CacheResult<Vec<RequestIdentity>> {
        let Some(max) = self.cap() else {
            return Ok(Vec::new());
        };
        let evicted = self.store.evict_to(max).await?;
        self.log_evictions(&evicted);
        Ok(evicted)
    }

    fn cap(&self) -> Option<usize> {
        self.descriptor.max_entries.filter(|_| self.descriptor.is_bounded())
    }

    fn log_evictions(&self, evicted: &[RequestIdentity]) {
        for key in evicted {
            debug!(cache = %self.descriptor.name, key = %key, "Evicted oldest entry");
        }
    }
}
