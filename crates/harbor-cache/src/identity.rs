//! Cache keys.

use harbor_net::Request;
use http::Method;
use url::Url;

/// Normalized method + URL a response is stored under.
///
/// Only `GET` requests have an identity; everything else bypasses the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestIdentity {
    method: Method,
    url: String,
}

impl RequestIdentity {
    /// Identity of a request, or `None` if the request is not cacheable.
    pub fn for_request(request: &Request) -> Option<Self> {
        if request.method != Method::GET {
            return None;
        }
        Some(Self::for_url(&request.url))
    }

    /// Identity of a `GET` for `url`.
    pub fn for_url(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: Method::GET,
            url: url.into(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Display for RequestIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
