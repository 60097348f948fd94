//! A fetcher for hosts with no connectivity.

use async_trait::async_trait;
use tracing::trace;

use crate::{Fetcher, NetError, Request, Response};

/// Fails every request with [`NetError::Offline`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

#[async_trait]
impl Fetcher for OfflineFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        trace!(url = %request.url, "Network disabled");
        Err(NetError::Offline)
    }
}
