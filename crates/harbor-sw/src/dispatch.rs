//! Fetch strategies.
//!
//! Each strategy is an ordered plan of [`ResponseSource`]s tried in turn; the
//! first one that yields a response wins. The offline fallback is always last
//! and always answers, so an intercepted request never fails.

use std::sync::Arc;
use std::time::Duration;

use harbor_cache::{CachePolicy, CacheStorage, Namespace, RequestIdentity};
use harbor_common::with_timeout;
use harbor_core::{NamespaceKind, WorkerConfig};
use harbor_net::{Fetcher, NetError, Request, Response};
use http::Method;
use tracing::{debug, trace, warn};
use url::Url;

use crate::fallback::OfflineFallback;
use crate::router::{Route, Router};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache(NamespaceKind),
    Network,
    Fallback,
}

impl std::fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cache(kind) => write!(f, "cache:{}", kind),
            Self::Network => f.write_str("network"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

/// Strategy for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
}

const CACHE_FIRST_PLAN: &[ResponseSource] = &[
    ResponseSource::Cache(NamespaceKind::Static),
    ResponseSource::Cache(NamespaceKind::Dynamic),
    ResponseSource::Network,
    ResponseSource::Fallback,
];

const NETWORK_FIRST_PLAN: &[ResponseSource] = &[
    ResponseSource::Network,
    ResponseSource::Cache(NamespaceKind::Dynamic),
    ResponseSource::Cache(NamespaceKind::Static),
    ResponseSource::Fallback,
];

impl Strategy {
    /// Sources to try, in order.
    pub fn plan(&self) -> &'static [ResponseSource] {
        match self {
            Strategy::CacheFirst => CACHE_FIRST_PLAN,
            Strategy::NetworkFirst => NETWORK_FIRST_PLAN,
        }
    }

    /// Namespace that storable network responses are written to.
    pub fn store_target(&self) -> NamespaceKind {
        match self {
            Strategy::CacheFirst => NamespaceKind::Static,
            Strategy::NetworkFirst => NamespaceKind::Dynamic,
        }
    }
}

/// A response together with its source.
#[derive(Debug, Clone)]
pub struct ServedResponse {
    pub response: Response,
    pub source: ResponseSource,
}

/// Fetch, treating an elapsed `timeout` as a network failure.
pub(crate) async fn fetch_with_timeout(
    fetcher: &dyn Fetcher,
    request: &Request,
    timeout: Option<Duration>,
) -> Result<Response, NetError> {
    match timeout {
        Some(limit) => with_timeout(limit, || fetcher.fetch(request))
            .await
            .unwrap_or(Err(NetError::Timeout(limit))),
        None => fetcher.fetch(request).await,
    }
}

/// Chooses and runs the strategy for each intercepted request.
pub struct StrategyDispatcher {
    config: Arc<WorkerConfig>,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    router: Router,
    policy: CachePolicy,
    fallback: OfflineFallback,
}

impl StrategyDispatcher {
    pub fn new(
        config: Arc<WorkerConfig>,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            router: Router::from_config(&config),
            policy: CachePolicy::new(config.cache_opaque_responses),
            fallback: OfflineFallback::new(config.clone(), storage.clone()),
            config,
            storage,
            fetcher,
        }
    }

    /// Replace the routing table.
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Strategy for a request, or `None` if it should not be intercepted.
    pub fn classify(&self, request: &Request) -> Option<Strategy> {
        if request.method != Method::GET || !request.is_same_origin(&self.config.origin) {
            return None;
        }
        match self.router.route(&request.url) {
            Route::CacheFirst => Some(Strategy::CacheFirst),
            Route::NetworkFirst => Some(Strategy::NetworkFirst),
            Route::Passthrough => None,
        }
    }

    /// Handle a request. `None` means pass it through to the network untouched.
    pub async fn dispatch(&self, request: &Request) -> Option<ServedResponse> {
        let Some(strategy) = self.classify(request) else {
            trace!(url = %request.url, method = %request.method, "Passing request through");
            return None;
        };
        Some(self.serve(request, strategy).await)
    }

    /// Run `strategy` for `request`.
    pub async fn serve(&self, request: &Request, strategy: Strategy) -> ServedResponse {
        let key = RequestIdentity::for_request(request);

        for &source in strategy.plan() {
            let response = match source {
                ResponseSource::Cache(kind) => match &key {
                    Some(key) => self.lookup(kind, key).await,
                    None => None,
                },
                ResponseSource::Network => {
                    self.fetch_and_store(request, key.as_ref(), strategy.store_target())
                        .await
                }
                ResponseSource::Fallback => Some(self.fallback.respond(request).await),
            };

            if let Some(response) = response {
                debug!(
                    url = %request.url,
                    ?strategy,
                    source = %source,
                    status = response.status.as_u16(),
                    "Served request"
                );
                return ServedResponse { response, source };
            }
        }

        // The plan always ends in the fallback.
        ServedResponse {
            response: self.fallback.respond(request).await,
            source: ResponseSource::Fallback,
        }
    }

    async fn lookup(&self, kind: NamespaceKind, key: &RequestIdentity) -> Option<Response> {
        let lookup = async {
            Namespace::open(self.storage.as_ref(), self.config.namespace(kind))
                .await?
                .get(key)
                .await
        }
        .await;

        match lookup {
            Ok(entry) => entry.map(|e| e.response),
            Err(e) => {
                warn!(cache = kind.as_str(), key = %key, error = %e, "Cache read failed");
                None
            }
        }
    }

    /// Network step: any response is returned; storable ones are written
    /// to `target` first. Transport failure yields `None`.
    async fn fetch_and_store(
        &self,
        request: &Request,
        key: Option<&RequestIdentity>,
        target: NamespaceKind,
    ) -> Option<Response> {
        let response =
            match fetch_with_timeout(self.fetcher.as_ref(), request, self.config.network_timeout())
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    debug!(url = %request.url, error = %e, "Network unavailable");
                    return None;
                }
            };

        if let Some(key) = key {
            self.store(target, key.clone(), &response).await;
        }
        Some(response)
    }

    /// Write a storable response. Failures are logged and ignored.
    async fn store(&self, kind: NamespaceKind, key: RequestIdentity, response: &Response) {
        if !self.policy.is_storable(response) {
            trace!(key = %key, status = response.status.as_u16(), "Response not storable");
            return;
        }

        let stored = async {
            Namespace::open(self.storage.as_ref(), self.config.namespace(kind))
                .await?
                .put(key.clone(), response.clone())
                .await
        }
        .await;

        if let Err(e) = stored {
            warn!(cache = kind.as_str(), key = %key, error = %e, "Cache write failed");
        }
    }

    /// Fetch same-origin URLs and store them in the dynamic namespace.
    /// Returns the URLs that were cached.
    pub async fn cache_urls(&self, urls: &[String]) -> Vec<Url> {
        let mut cached = Vec::new();
        for raw in urls {
            let url = match self.config.resolve(raw) {
                Ok(url) if url.origin() == self.config.origin.origin() => url,
                Ok(url) => {
                    warn!(url = %url, "Refusing to cache cross-origin URL");
                    continue;
                }
                Err(e) => {
                    warn!(url = %raw, error = %e, "Invalid URL in cache request");
                    continue;
                }
            };

            let request = Request::get(url.clone());
            let response =
                match fetch_with_timeout(self.fetcher.as_ref(), &request, self.config.network_timeout())
                    .await
                {
                    Ok(response) if self.policy.is_storable(&response) => response,
                    Ok(response) => {
                        warn!(url = %url, status = response.status.as_u16(), "Not caching response");
                        continue;
                    }
                    Err(e) => {
                        warn!(url = %url, error = %e, "Failed to fetch URL for caching");
                        continue;
                    }
                };

            self.store(NamespaceKind::Dynamic, RequestIdentity::for_url(&url), &response)
                .await;
            cached.push(url);
        }
        cached
    }
}
