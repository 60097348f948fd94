//! # Harbor Service Worker
//!
//! Offline request-caching and notification engine. The worker intercepts
//! requests issued by the hosting page and serves them from cache, network,
//! or a synthesized offline response.
//!
//! ## Features
//!
//! - **Lifecycle**: install (precache), activate (purge stale caches, claim clients)
//! - **Fetch interception**: cache-first for static assets, network-first otherwise
//! - **Offline fallback**: offline document for navigations, 503 JSON for the rest
//! - **Clients API**: focus or open windows on notification click
//! - **Notifications**: push payload parsing, tag replacement, local reminders
//!
//! ## Architecture
//!
//! ```text
//! HostEnvironment (shared across worker versions)
//!     ├── CacheStorage ─── "<app>-static-v<N>", "<app>-dynamic-v<N>"
//!     ├── Fetcher (network)
//!     ├── Clients
//!     ├── NotificationSurface
//!     └── ServiceWorkerRegistration
//!             ├── installing
//!             ├── waiting
//!             └── active
//!
//! OfflineWorker (one version)
//!     ├── LifecycleManager
//!     ├── StrategyDispatcher ── Router, OfflineFallback
//!     ├── Notifier
//!     └── ReminderScheduler
//! ```

use harbor_cache::CacheError;
use harbor_common::HarborError;
use harbor_core::ConfigError;
use thiserror::Error;

pub mod clients;
pub mod dispatch;
pub mod fallback;
pub mod host;
pub mod lifecycle;
pub mod message;
pub mod notification;
pub mod reminder;
pub mod router;
pub mod worker;

pub use clients::{Client, ClientMatchOptions, ClientType, Clients};
pub use dispatch::{ResponseSource, ServedResponse, Strategy, StrategyDispatcher};
pub use fallback::OfflineFallback;
pub use host::{HostEnvironment, ServiceWorkerEvent};
pub use lifecycle::{
    ActivationReport, LifecycleManager, PrecacheReport, ServiceWorker, ServiceWorkerId,
    ServiceWorkerRegistration, ServiceWorkerState,
};
pub use message::WorkerMessage;
pub use notification::{
    ClickOutcome, Notification, NotificationSurface, NotificationTray, Notifier, PushPayload,
};
pub use reminder::{ReminderRequest, ReminderScheduler};
pub use router::{Route, RouteRule, Router, UrlPattern};
pub use worker::{spawn_event_loop, InitReport, OfflineWorker, WorkerEvent, WorkerHandle};

/// Errors that can occur in worker operations.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("State error: {0}")]
    StateError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),

    #[error("Client error: {0}")]
    ClientError(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<WorkerError> for HarborError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Cache(e) => e.into(),
            WorkerError::Config(e) => e.into(),
            WorkerError::NetworkError(msg) => HarborError::network(msg),
            WorkerError::NotificationError(msg) => HarborError::notification(msg),
            WorkerError::NotFound(what) => HarborError::NotFound(what),
            other => HarborError::lifecycle_with_source("worker operation failed", other),
        }
    }
}
