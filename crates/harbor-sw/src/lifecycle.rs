//! Worker lifecycle: registration slots, install and activate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use hashbrown::HashSet;
use harbor_cache::{CachePolicy, Namespace, RequestIdentity};
use harbor_common::{retry_with_backoff, RetryConfig};
use harbor_core::WorkerConfig;
use harbor_net::Request;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::dispatch::fetch_with_timeout;
use crate::host::{HostEnvironment, ServiceWorkerEvent};
use crate::WorkerError;

/// Unique identifier for a worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ServiceWorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ServiceWorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sw-{}", self.0)
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceWorkerState {
    /// Created, not yet installing.
    #[default]
    Parsed,
    /// Precaching.
    Installing,
    /// Installed and waiting for activation.
    Installed,
    /// Purging old caches and claiming clients.
    Activating,
    /// Active and intercepting requests.
    Activated,
    /// Replaced, unregistered, or failed to install.
    Redundant,
}

/// A worker version as seen by its registration.
#[derive(Debug, Clone)]
pub struct ServiceWorker {
    pub id: ServiceWorkerId,

    /// Cache version this worker owns.
    pub version: String,

    pub state: ServiceWorkerState,

    /// Time of last state change.
    pub state_changed_at: Instant,
}

impl ServiceWorker {
    pub fn new(id: ServiceWorkerId, version: impl Into<String>) -> Self {
        Self {
            id,
            version: version.into(),
            state: ServiceWorkerState::Parsed,
            state_changed_at: Instant::now(),
        }
    }

    pub fn set_state(&mut self, state: ServiceWorkerState) {
        self.state = state;
        self.state_changed_at = Instant::now();
    }

    pub fn is_active(&self) -> bool {
        self.state == ServiceWorkerState::Activated
    }
}

/// The `installing` / `waiting` / `active` slots for one scope.
#[derive(Debug)]
pub struct ServiceWorkerRegistration {
    /// Scope URL.
    pub scope: Url,

    /// Installing worker.
    pub installing: Option<ServiceWorker>,

    /// Waiting worker (installed but not active).
    pub waiting: Option<ServiceWorker>,

    /// Active worker.
    pub active: Option<ServiceWorker>,

    retired: HashSet<ServiceWorkerId>,
}

impl ServiceWorkerRegistration {
    pub fn new(scope: Url) -> Self {
        Self {
            scope,
            installing: None,
            waiting: None,
            active: None,
            retired: HashSet::new(),
        }
    }

    /// Current state of a worker, `Redundant` once it has left every slot.
    pub fn state_of(&self, id: ServiceWorkerId) -> Option<ServiceWorkerState> {
        [&self.installing, &self.waiting, &self.active]
            .into_iter()
            .flatten()
            .find(|w| w.id == id)
            .map(|w| w.state)
            .or_else(|| self.retired.contains(&id).then_some(ServiceWorkerState::Redundant))
    }

    /// The worker controlling clients, if any.
    pub fn controller(&self) -> Option<ServiceWorkerId> {
        self.active.as_ref().filter(|w| w.is_active()).map(|w| w.id)
    }

    fn retire(&mut self, mut worker: ServiceWorker) -> ServiceWorker {
        worker.set_state(ServiceWorkerState::Redundant);
        self.retired.insert(worker.id);
        worker
    }

    /// Put a worker in the installing slot. A worker already installing is
    /// superseded.
    pub fn begin_install(&mut self, mut worker: ServiceWorker) -> Option<ServiceWorker> {
        worker.set_state(ServiceWorkerState::Installing);
        let superseded = self.installing.replace(worker);
        superseded.map(|w| self.retire(w))
    }

    /// Move the installing worker to waiting. Returns a waiting worker it
    /// replaced.
    pub fn install_complete(
        &mut self,
        id: ServiceWorkerId,
    ) -> Result<Option<ServiceWorker>, WorkerError> {
        let mut worker = take_slot(&mut self.installing, id)
            .ok_or_else(|| WorkerError::StateError(format!("{} is not installing", id)))?;
        worker.set_state(ServiceWorkerState::Installed);
        let replaced = self.waiting.replace(worker);
        Ok(replaced.map(|w| self.retire(w)))
    }

    /// Drop a worker whose install failed.
    pub fn fail_install(&mut self, id: ServiceWorkerId) -> Option<ServiceWorker> {
        let worker = take_slot(&mut self.installing, id)?;
        Some(self.retire(worker))
    }

    /// Promote the waiting worker. Returns the previous active worker.
    pub fn begin_activate(
        &mut self,
        id: ServiceWorkerId,
    ) -> Result<Option<ServiceWorker>, WorkerError> {
        let mut worker = take_slot(&mut self.waiting, id)
            .ok_or_else(|| WorkerError::StateError(format!("{} is not waiting", id)))?;
        worker.set_state(ServiceWorkerState::Activating);
        let previous = self.active.replace(worker);
        Ok(previous.map(|w| self.retire(w)))
    }

    pub fn activate_complete(&mut self, id: ServiceWorkerId) -> Result<(), WorkerError> {
        match self.active.as_mut() {
            Some(worker) if worker.id == id && worker.state == ServiceWorkerState::Activating => {
                worker.set_state(ServiceWorkerState::Activated);
                Ok(())
            }
            _ => Err(WorkerError::StateError(format!("{} is not activating", id))),
        }
    }

    /// Retire every worker.
    pub fn unregister(&mut self) -> Vec<ServiceWorker> {
        let workers: Vec<_> = [self.installing.take(), self.waiting.take(), self.active.take()]
            .into_iter()
            .flatten()
            .collect();
        workers.into_iter().map(|w| self.retire(w)).collect()
    }
}

fn take_slot(slot: &mut Option<ServiceWorker>, id: ServiceWorkerId) -> Option<ServiceWorker> {
    if slot.as_ref().is_some_and(|w| w.id == id) {
        slot.take()
    } else {
        None
    }
}

/// Outcome of precaching the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrecacheReport {
    pub cached: Vec<Url>,
    pub failed: Vec<Url>,
}

/// Outcome of activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Cache namespaces deleted as stale.
    pub deleted: Vec<String>,
    /// Entries evicted from the dynamic namespace.
    pub trimmed: usize,
    /// Client IDs newly controlled.
    pub claimed: Vec<String>,
}

/// Runs install and activate for one worker version.
pub struct LifecycleManager {
    config: Arc<WorkerConfig>,
    host: HostEnvironment,
    policy: CachePolicy,
}

impl LifecycleManager {
    pub fn new(config: Arc<WorkerConfig>, host: HostEnvironment) -> Self {
        let policy = CachePolicy::new(config.cache_opaque_responses);
        Self {
            config,
            host,
            policy,
        }
    }

    fn state_change(&self, worker: &ServiceWorker) {
        debug!(worker = %worker.id, version = %worker.version, state = ?worker.state, "Worker state changed");
        self.host.emit(ServiceWorkerEvent::StateChange {
            worker_id: worker.id,
            version: worker.version.clone(),
            new_state: worker.state,
        });
    }

    /// Install: precache the manifest into the static namespace.
    ///
    /// Individual manifest failures are skipped. Only failing to open the
    /// static namespace fails the install, and the worker becomes redundant.
    pub async fn install(&self, id: ServiceWorkerId) -> Result<PrecacheReport, WorkerError> {
        let worker = ServiceWorker::new(id, self.config.version.clone());
        {
            let mut registration = self.host.registration.write().await;
            if let Some(superseded) = registration.begin_install(worker.clone()) {
                self.state_change(&superseded);
            }
        }
        self.state_change(&ServiceWorker {
            state: ServiceWorkerState::Installing,
            ..worker
        });

        let prepared = async {
            let urls = self.config.precache_urls()?;
            let namespace =
                Namespace::open(self.host.storage.as_ref(), self.config.static_namespace()).await?;
            Ok::<_, WorkerError>((urls, namespace))
        }
        .await;

        let (urls, namespace) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(worker = %id, error = %e, "Install failed");
                if let Some(failed) = self.host.registration.write().await.fail_install(id) {
                    self.state_change(&failed);
                }
                return Err(e);
            }
        };

        let retry = RetryConfig::attempts(self.config.precache_attempts);
        let mut report = PrecacheReport::default();
        for url in urls {
            match retry_with_backoff(&retry, || self.precache_one(&namespace, &url)).await {
                Ok(()) => report.cached.push(url),
                Err(e) => {
                    warn!(url = %url, cache = %namespace.name(), error = %e, "Precache failed, skipping");
                    report.failed.push(url);
                }
            }
        }

        let installed = {
            let mut registration = self.host.registration.write().await;
            let replaced = registration.install_complete(id)?;
            (replaced, registration.waiting.clone())
        };
        if let Some(replaced) = installed.0 {
            self.state_change(&replaced);
        }
        if let Some(waiting) = installed.1 {
            self.state_change(&waiting);
        }

        info!(
            worker = %id,
            cache = %namespace.name(),
            cached = report.cached.len(),
            failed = report.failed.len(),
            "Install complete"
        );
        Ok(report)
    }

    async fn precache_one(&self, namespace: &Namespace, url: &Url) -> Result<(), WorkerError> {
        let response = fetch_with_timeout(
            self.host.fetcher.as_ref(),
            &Request::get(url.clone()),
            self.config.network_timeout(),
        )
        .await
        .map_err(|e| WorkerError::NetworkError(e.to_string()))?;

        if !self.policy.is_storable(&response) {
            return Err(WorkerError::NetworkError(format!(
                "unstorable response ({})",
                response.status
            )));
        }
        namespace.put(RequestIdentity::for_url(url), response).await?;
        Ok(())
    }

    /// Activate: purge stale namespaces, trim the dynamic namespace, and
    /// claim clients.
    pub async fn activate(&self, id: ServiceWorkerId) -> Result<ActivationReport, WorkerError> {
        let (activating, previous) = {
            let mut registration = self.host.registration.write().await;
            let previous = registration.begin_activate(id)?;
            (registration.active.clone(), previous)
        };
        if let Some(previous) = previous {
            self.state_change(&previous);
        }
        if let Some(activating) = activating {
            self.state_change(&activating);
        }

        let mut report = ActivationReport {
            deleted: self.purge_stale_caches().await,
            ..Default::default()
        };

        if self.config.trim_on_activate {
            report.trimmed = self.trim_dynamic().await;
        }

        if self.config.claim_clients {
            let scope = self.host.registration.read().await.scope.clone();
            report.claimed = self.host.clients.write().await.claim(id, &scope);
            for client_id in &report.claimed {
                self.host.emit(ServiceWorkerEvent::ControllerChange {
                    client_id: client_id.clone(),
                    worker_id: id,
                });
            }
        }

        let activated = {
            let mut registration = self.host.registration.write().await;
            registration.activate_complete(id)?;
            registration.active.clone()
        };
        if let Some(activated) = activated {
            self.state_change(&activated);
        }

        info!(
            worker = %id,
            deleted = report.deleted.len(),
            trimmed = report.trimmed,
            claimed = report.claimed.len(),
            "Activation complete"
        );
        Ok(report)
    }

    async fn purge_stale_caches(&self) -> Vec<String> {
        let allowed = self.config.allowed_cache_names();
        let names = match self.host.storage.keys().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate caches");
                return Vec::new();
            }
        };

        let mut deleted = Vec::new();
        for name in names.into_iter().filter(|n| !allowed.contains(n)) {
            match self.host.storage.delete(&name).await {
                Ok(true) => {
                    debug!(cache = %name, "Deleted stale cache");
                    deleted.push(name);
                }
                Ok(false) => {}
                Err(e) => warn!(cache = %name, error = %e, "Failed to delete stale cache"),
            }
        }
        deleted
    }

    async fn trim_dynamic(&self) -> usize {
        let trimmed = async {
            Namespace::open(self.host.storage.as_ref(), self.config.dynamic_namespace())
                .await?
                .trim()
                .await
        }
        .await;

        match trimmed {
            Ok(evicted) => evicted.len(),
            Err(e) => {
                warn!(error = %e, "Failed to trim dynamic cache");
                0
            }
        }
    }
}
