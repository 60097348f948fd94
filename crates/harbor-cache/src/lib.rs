//! # Harbor Cache
//!
//! Versioned cache storage for the Harbor worker.
//!
//! ## Architecture
//!
//! ```text
//! CacheStorage (all namespaces)
//!     └── CacheStore (one namespace, e.g. "shop-dynamic-v4")
//!             └── RequestIdentity → CacheEntry (insertion ordered)
//!
//! Namespace = CacheNamespace + CacheStore
//!     └── put() evicts oldest entries past max_entries
//! ```
//!
//! Storage backends implement [`CacheStorage`] and [`CacheStore`]; the
//! in-memory backend lives in [`memory`].

use harbor_common::HarborError;
use thiserror::Error;

pub mod identity;
pub mod memory;
pub mod namespace;
pub mod policy;
pub mod store;

pub use identity::RequestIdentity;
pub use memory::{MemoryCacheStorage, MemoryStore};
pub use namespace::Namespace;
pub use policy::CachePolicy;
pub use store::{CacheEntry, CacheStorage, CacheStore};

/// Errors raised by cache backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Quota exceeded in '{cache}': {needed} bytes needed, limit is {limit}")]
    QuotaExceeded {
        cache: String,
        needed: usize,
        limit: usize,
    },

    #[error("Cache not found: {0}")]
    NotFound(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<CacheError> for HarborError {
    fn from(err: CacheError) -> Self {
        HarborError::cache_with_source("cache operation failed", err)
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
