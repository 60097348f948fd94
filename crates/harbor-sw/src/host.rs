//! Collaborators shared by every worker version in a scope.

use std::sync::Arc;

use harbor_cache::{CacheStorage, MemoryCacheStorage};
use harbor_net::Fetcher;
use tokio::sync::{mpsc, RwLock};
use tracing::trace;
use url::Url;

use crate::clients::Clients;
use crate::lifecycle::{ServiceWorkerId, ServiceWorkerRegistration, ServiceWorkerState};
use crate::notification::{NotificationSurface, NotificationTray};

/// Events reported to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceWorkerEvent {
    /// State changed.
    StateChange {
        worker_id: ServiceWorkerId,
        version: String,
        new_state: ServiceWorkerState,
    },
    /// Controller changed.
    ControllerChange {
        client_id: String,
        worker_id: ServiceWorkerId,
    },
    /// A notification was displayed.
    NotificationShown { tag: String },
}

/// The host side of the worker: storage, network, pages, and notifications.
#[derive(Clone)]
pub struct HostEnvironment {
    /// Cache storage (`caches`).
    pub storage: Arc<dyn CacheStorage>,

    /// Network access.
    pub fetcher: Arc<dyn Fetcher>,

    /// Open pages.
    pub clients: Arc<RwLock<Clients>>,

    /// Notification display.
    pub notifications: Arc<dyn NotificationSurface>,

    /// Worker slots for the scope.
    pub registration: Arc<RwLock<ServiceWorkerRegistration>>,

    event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl HostEnvironment {
    pub fn new(
        scope: Url,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        notifications: Arc<dyn NotificationSurface>,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceWorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        (
            Self {
                storage,
                fetcher,
                clients: Arc::new(RwLock::new(Clients::new())),
                notifications,
                registration: Arc::new(RwLock::new(ServiceWorkerRegistration::new(scope))),
                event_tx,
            },
            event_rx,
        )
    }

    /// In-memory caches and notification tray around `fetcher`.
    pub fn in_memory(
        scope: Url,
        fetcher: Arc<dyn Fetcher>,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceWorkerEvent>) {
        Self::new(
            scope,
            Arc::new(MemoryCacheStorage::new()),
            fetcher,
            Arc::new(NotificationTray::new()),
        )
    }

    /// Report an event. Dropped if nobody is listening.
    pub fn emit(&self, event: ServiceWorkerEvent) {
        trace!(?event, "Worker event");
        let _ = self.event_tx.send(event);
    }
}
