//! Shared fixtures for worker integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use harbor_cache::{CacheStorage, MemoryCacheStorage};
use harbor_core::WorkerConfig;
use harbor_net::{Fetcher, NetError, Request, Response};
use harbor_sw::{HostEnvironment, NotificationTray, OfflineWorker, ServiceWorkerEvent};
use hashbrown::HashMap;
use http::StatusCode;
use tokio::sync::mpsc;
use url::Url;

pub const ORIGIN: &str = "https://shop.example/";

/// Route worker logs to the test output; `RUST_LOG=harbor_sw=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-process network. Unscripted paths answer `200 "ok:<path>"`.
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, (StatusCode, String)>>,
    offline: AtomicBool,
    hanging: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, path: &str, status: u16, body: impl Into<String>) {
        let status = StatusCode::from_u16(status).unwrap();
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.into()));
    }

    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    /// Accept requests but never answer them.
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    /// Number of fetch attempts, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::Offline);
        }
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let path = request.url.path().to_string();
        let (status, body) = self
            .routes
            .lock()
            .unwrap()
            .get(&path)
            .cloned()
            .unwrap_or_else(|| (StatusCode::OK, format!("ok:{}", path)));
        Ok(Response::new(request.url.clone(), status, body))
    }
}

pub fn origin() -> Url {
    Url::parse(ORIGIN).unwrap()
}

pub fn url(path: &str) -> Url {
    origin().join(path).unwrap()
}

pub fn config(version: &str) -> WorkerConfig {
    let mut config = WorkerConfig::new("shop", version, origin());
    config.precache = vec![
        "/".to_string(),
        "/offline.html".to_string(),
        "/static/app.css".to_string(),
    ];
    config
}

pub struct Harness {
    pub fetcher: Arc<ScriptedFetcher>,
    pub storage: Arc<MemoryCacheStorage>,
    pub tray: Arc<NotificationTray>,
    pub host: HostEnvironment,
    pub events: mpsc::UnboundedReceiver<ServiceWorkerEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_storage(MemoryCacheStorage::new())
    }

    pub fn with_storage(storage: MemoryCacheStorage) -> Self {
        init_tracing();
        let fetcher = ScriptedFetcher::new();
        fetcher.route("/offline.html", 200, "<h1>Offline</h1>");
        fetcher.route("/static/app.css", 200, "body { color: navy }");

        let storage = Arc::new(storage);
        let tray = Arc::new(NotificationTray::new());
        let (host, events) =
            HostEnvironment::new(origin(), storage.clone(), fetcher.clone(), tray.clone());
        Self {
            fetcher,
            storage,
            tray,
            host,
            events,
        }
    }

    pub fn worker(&self, config: WorkerConfig) -> Arc<OfflineWorker> {
        Arc::new(OfflineWorker::new(config, self.host.clone()))
    }

    /// A worker for `version` that has been installed and activated.
    pub async fn active_worker(&self, version: &str) -> Arc<OfflineWorker> {
        let worker = self.worker(config(version));
        worker.init().await.unwrap();
        worker
    }

    pub async fn cache_names(&self) -> Vec<String> {
        self.storage.keys().await.unwrap()
    }

    pub fn drain_events(&mut self) -> Vec<ServiceWorkerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
