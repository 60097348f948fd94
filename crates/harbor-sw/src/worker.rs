//! A worker version and its event loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use harbor_core::WorkerConfig;
use harbor_net::Request;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dispatch::{ServedResponse, StrategyDispatcher};
use crate::host::HostEnvironment;
use crate::lifecycle::{
    ActivationReport, LifecycleManager, PrecacheReport, ServiceWorkerId, ServiceWorkerState,
};
use crate::message::WorkerMessage;
use crate::notification::{ClickOutcome, Notification, Notifier};
use crate::reminder::ReminderScheduler;
use crate::WorkerError;

/// Outcome of [`OfflineWorker::init`].
#[derive(Debug, Clone, Default)]
pub struct InitReport {
    pub precache: PrecacheReport,
    /// Present if the worker activated straight away.
    pub activation: Option<ActivationReport>,
}

/// One version of the offline worker bound to a host.
pub struct OfflineWorker {
    id: ServiceWorkerId,
    config: Arc<WorkerConfig>,
    host: HostEnvironment,
    dispatcher: StrategyDispatcher,
    notifier: Arc<Notifier>,
    reminders: ReminderScheduler,
    lifecycle: LifecycleManager,
    running: AtomicBool,
}

impl OfflineWorker {
    pub fn new(config: WorkerConfig, host: HostEnvironment) -> Self {
        let config = Arc::new(config);
        let notifier = Arc::new(Notifier::new(config.clone(), host.clone()));

        Self {
            id: ServiceWorkerId::new(),
            dispatcher: StrategyDispatcher::new(
                config.clone(),
                host.storage.clone(),
                host.fetcher.clone(),
            ),
            reminders: ReminderScheduler::new(notifier.clone()),
            lifecycle: LifecycleManager::new(config.clone(), host.clone()),
            notifier,
            config,
            host,
            running: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> ServiceWorkerId {
        self.id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn host(&self) -> &HostEnvironment {
        &self.host
    }

    pub fn dispatcher(&self) -> &StrategyDispatcher {
        &self.dispatcher
    }

    pub fn reminders(&self) -> &ReminderScheduler {
        &self.reminders
    }

    pub async fn state(&self) -> ServiceWorkerState {
        self.host
            .registration
            .read()
            .await
            .state_of(self.id)
            .unwrap_or_default()
    }

    /// Install, then activate if `skip_waiting` is set or nothing is active.
    pub async fn init(&self) -> Result<InitReport, WorkerError> {
        let precache = self.install().await?;

        let nothing_active = self.host.registration.read().await.active.is_none();
        let activation = if self.config.skip_waiting || nothing_active {
            Some(self.activate().await?)
        } else {
            info!(worker = %self.id, version = %self.config.version, "Installed, waiting to activate");
            None
        };

        Ok(InitReport {
            precache,
            activation,
        })
    }

    pub async fn install(&self) -> Result<PrecacheReport, WorkerError> {
        self.lifecycle.install(self.id).await
    }

    pub async fn activate(&self) -> Result<ActivationReport, WorkerError> {
        self.lifecycle.activate(self.id).await
    }

    /// Activate now if this worker is waiting.
    pub async fn skip_waiting(&self) -> Result<Option<ActivationReport>, WorkerError> {
        if self.state().await != ServiceWorkerState::Installed {
            debug!(worker = %self.id, "skip_waiting ignored, worker is not waiting");
            return Ok(None);
        }
        self.activate().await.map(Some)
    }

    /// Handle an intercepted request. `None` means the host should perform
    /// the request itself.
    pub async fn handle_fetch(&self, request: &Request) -> Option<ServedResponse> {
        if !self.running.load(Ordering::Acquire) {
            return None;
        }
        if self.state().await != ServiceWorkerState::Activated {
            return None;
        }
        self.dispatcher.dispatch(request).await
    }

    fn torn_down(&self) -> WorkerError {
        WorkerError::StateError(format!("worker {} has been torn down", self.id))
    }

    fn ensure_running(&self) -> Result<(), WorkerError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(self.torn_down())
        }
    }

    pub async fn handle_push(&self, data: Option<&[u8]>) -> Result<Notification, WorkerError> {
        self.ensure_running()?;
        self.notifier.show_push(data).await
    }

    pub async fn handle_notification_click(
        &self,
        notification: &Notification,
    ) -> Result<ClickOutcome, WorkerError> {
        self.ensure_running()?;
        self.notifier.click(notification).await
    }

    pub async fn handle_message(&self, data: serde_json::Value) -> Result<(), WorkerError> {
        self.ensure_running()?;
        match WorkerMessage::from_value(data)? {
            WorkerMessage::ScheduleNotification(request) => {
                if !self.reminders.schedule(request).await {
                    return Err(self.torn_down());
                }
            }
            WorkerMessage::SkipWaiting => {
                self.skip_waiting().await?;
            }
            WorkerMessage::CacheUrls { urls } => {
                let cached = self.dispatcher.cache_urls(&urls).await;
                debug!(requested = urls.len(), cached = cached.len(), "Cached URLs on request");
            }
        }
        Ok(())
    }

    /// Stop intercepting and drop pending reminders.
    pub async fn teardown(&self) {
        self.running.store(false, Ordering::Release);
        let cancelled = self.reminders.close().await;
        info!(worker = %self.id, cancelled, "Worker torn down");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Events delivered to a running worker.
#[derive(Debug)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch {
        request: Request,
        respond_to: oneshot::Sender<Option<ServedResponse>>,
    },
    Push {
        data: Option<Bytes>,
    },
    NotificationClick {
        notification: Notification,
    },
    Message {
        data: serde_json::Value,
    },
    Terminate,
}

/// Sender side of a worker's event loop.
pub struct WorkerHandle {
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn send(&self, event: WorkerEvent) -> Result<(), WorkerError> {
        self.event_tx
            .send(event)
            .map_err(|_| WorkerError::StateError("worker event loop has stopped".to_string()))
    }

    /// Dispatch a fetch and wait for the worker's answer.
    pub async fn fetch(&self, request: Request) -> Result<Option<ServedResponse>, WorkerError> {
        let (respond_to, response) = oneshot::channel();
        self.send(WorkerEvent::Fetch {
            request,
            respond_to,
        })?;
        response
            .await
            .map_err(|_| WorkerError::StateError("fetch handler dropped".to_string()))
    }

    pub fn push(&self, data: Option<Bytes>) -> Result<(), WorkerError> {
        self.send(WorkerEvent::Push { data })
    }

    pub fn post_message(&self, data: serde_json::Value) -> Result<(), WorkerError> {
        self.send(WorkerEvent::Message { data })
    }

    /// Tear the worker down and wait for the loop to exit.
    pub async fn terminate(self) {
        if self.send(WorkerEvent::Terminate).is_ok() {
            let _ = self.task.await;
        }
    }
}

/// Run `worker` on an event loop.
///
/// Install and activate are awaited before the next event is taken; other
/// events run as independent tasks.
pub fn spawn_event_loop(worker: Arc<OfflineWorker>) -> WorkerHandle {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                WorkerEvent::Install => {
                    if let Err(e) = worker.install().await {
                        warn!(worker = %worker.id(), error = %e, "Install event failed");
                    }
                }
                WorkerEvent::Activate => {
                    if let Err(e) = worker.activate().await {
                        warn!(worker = %worker.id(), error = %e, "Activate event failed");
                    }
                }
                WorkerEvent::Fetch {
                    request,
                    respond_to,
                } => {
                    let worker = worker.clone();
                    tokio::spawn(async move {
                        let _ = respond_to.send(worker.handle_fetch(&request).await);
                    });
                }
                WorkerEvent::Push { data } => {
                    let worker = worker.clone();
                    tokio::spawn(async move {
                        if let Err(e) = worker.handle_push(data.as_deref()).await {
                            warn!(error = %e, "Push event failed");
                        }
                    });
                }
                WorkerEvent::NotificationClick { notification } => {
                    let worker = worker.clone();
                    tokio::spawn(async move {
                        if let Err(e) = worker.handle_notification_click(&notification).await {
                            warn!(error = %e, "Notification click failed");
                        }
                    });
                }
                WorkerEvent::Message { data } => {
                    let worker = worker.clone();
                    tokio::spawn(async move {
                        if let Err(e) = worker.handle_message(data).await {
                            warn!(error = %e, "Message event failed");
                        }
                    });
                }
                WorkerEvent::Terminate => {
                    worker.teardown().await;
                    break;
                }
            }
        }
        debug!(worker = %worker.id(), "Event loop exited");
    });

    WorkerHandle { event_tx, task }
}
