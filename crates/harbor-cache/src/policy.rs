//! Which responses may be stored.

use harbor_net::{Response, ResponseType};
use http::StatusCode;

/// Storage eligibility rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachePolicy {
    /// Store opaque cross-origin responses.
    pub cache_opaque: bool,
}

impl CachePolicy {
    pub fn new(cache_opaque: bool) -> Self {
        Self { cache_opaque }
    }

    /// 2xx (except partial content), not an error, and not opaque unless allowed.
    pub fn is_storable(&self, response: &Response) -> bool {
        match response.response_type {
            ResponseType::Error => false,
            ResponseType::Opaque => self.cache_opaque,
            ResponseType::Basic | ResponseType::Cors => {
                response.status.is_success() && response.status != StatusCode::PARTIAL_CONTENT
            }
        }
    }
}
