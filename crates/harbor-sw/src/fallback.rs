//! Responses served when neither cache nor network can answer.

use std::sync::Arc;

use harbor_cache::{CacheStorage, Namespace, RequestIdentity};
use harbor_core::{NamespaceKind, WorkerConfig};
use harbor_net::{Request, Response};
use http::StatusCode;
use tracing::{debug, warn};

const OFFLINE_MESSAGE: &str = "You appear to be offline. Please check your connection and try again.";

/// Builds the offline response for a request. Never fails.
pub struct OfflineFallback {
    config: Arc<WorkerConfig>,
    storage: Arc<dyn CacheStorage>,
}

impl OfflineFallback {
    pub fn new(config: Arc<WorkerConfig>, storage: Arc<dyn CacheStorage>) -> Self {
        Self { config, storage }
    }

    /// The cached offline document for navigations, otherwise a 503 JSON error.
    pub async fn respond(&self, request: &Request) -> Response {
        if request.is_navigation() {
            if let Some(page) = self.cached_offline_page().await {
                return page;
            }
            debug!(url = %request.url, "No cached offline page, using built-in document");
            return self.offline_document(request);
        }

        offline_json(request)
    }

    async fn cached_offline_page(&self) -> Option<Response> {
        let url = match self.config.offline_url() {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Offline page URL is invalid");
                return None;
            }
        };
        let key = RequestIdentity::for_url(&url);

        for kind in [NamespaceKind::Static, NamespaceKind::Dynamic] {
            let lookup = async {
                Namespace::open(self.storage.as_ref(), self.config.namespace(kind))
                    .await?
                    .get(&key)
                    .await
            }
            .await;

            match lookup {
                Ok(Some(entry)) => return Some(entry.response),
                Ok(None) => {}
                Err(e) => warn!(cache = kind.as_str(), error = %e, "Offline page lookup failed"),
            }
        }
        None
    }

    fn offline_document(&self, request: &Request) -> Response {
        let body = format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
             <title>{app} is offline</title>\n</head>\n<body>\n\
             <h1>You're offline</h1>\n<p>{message}</p>\n</body>\n</html>\n",
            app = self.config.app_name,
            message = OFFLINE_MESSAGE,
        );
        Response::html(request.url.clone(), StatusCode::OK, body)
    }
}

fn offline_json(request: &Request) -> Response {
    let body = serde_json::json!({
        "error": "Offline",
        "message": OFFLINE_MESSAGE,
    });
    Response::json_value(request.url.clone(), StatusCode::SERVICE_UNAVAILABLE, &body)
}
