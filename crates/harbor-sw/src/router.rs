//! Path-based routing of intercepted requests to strategies.

use harbor_core::WorkerConfig;
use tracing::trace;
use url::Url;

/// How an intercepted request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    /// Serve from cache, fall back to network.
    CacheFirst,
    /// Try network, fall back to cache.
    #[default]
    NetworkFirst,
    /// Not intercepted.
    Passthrough,
}

/// Type of path pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternType {
    Exact,
    Prefix,
    Suffix,
    Contains,
}

/// Pattern matched against the URL path.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    pub pattern_type: PatternType,
    pub pattern: String,
}

impl UrlPattern {
    pub fn exact(path: &str) -> Self {
        Self {
            pattern_type: PatternType::Exact,
            pattern: path.to_string(),
        }
    }

    pub fn prefix(prefix: &str) -> Self {
        Self {
            pattern_type: PatternType::Prefix,
            pattern: prefix.to_string(),
        }
    }

    /// e.g. `".woff2"`
    pub fn suffix(suffix: &str) -> Self {
        Self {
            pattern_type: PatternType::Suffix,
            pattern: suffix.to_string(),
        }
    }

    pub fn contains(substring: &str) -> Self {
        Self {
            pattern_type: PatternType::Contains,
            pattern: substring.to_string(),
        }
    }

    pub fn matches(&self, url: &Url) -> bool {
        let path = url.path();
        match self.pattern_type {
            PatternType::Exact => path == self.pattern,
            PatternType::Prefix => path.starts_with(&self.pattern),
            PatternType::Suffix => path.ends_with(&self.pattern),
            PatternType::Contains => path.contains(&self.pattern),
        }
    }
}

/// A routing rule.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub pattern: UrlPattern,
    pub route: Route,
    /// Priority (higher = first).
    pub priority: i32,
}

/// Ordered routing rules with a default route.
#[derive(Debug, Clone, Default)]
pub struct Router {
    rules: Vec<RouteRule>,
    default_route: Route,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Passthrough prefixes win over static prefixes; everything else is
    /// network-first.
    pub fn from_config(config: &WorkerConfig) -> Self {
        let mut router = Self::new();
        for prefix in &config.static_prefixes {
            router.cache_first(UrlPattern::prefix(prefix));
        }
        for prefix in &config.passthrough_prefixes {
            router.passthrough(UrlPattern::prefix(prefix));
        }
        router
    }

    pub fn set_default_route(&mut self, route: Route) {
        self.default_route = route;
    }

    pub fn add_rule(&mut self, rule: RouteRule) {
        self.rules.push(rule);
        // Stable, so equal priorities keep insertion order.
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    pub fn cache_first(&mut self, pattern: UrlPattern) {
        self.add_rule(RouteRule {
            pattern,
            route: Route::CacheFirst,
            priority: 10,
        });
    }

    pub fn network_first(&mut self, pattern: UrlPattern) {
        self.add_rule(RouteRule {
            pattern,
            route: Route::NetworkFirst,
            priority: 10,
        });
    }

    pub fn passthrough(&mut self, pattern: UrlPattern) {
        self.add_rule(RouteRule {
            pattern,
            route: Route::Passthrough,
            priority: 20,
        });
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Route for a URL: the first matching rule, or the default.
    pub fn route(&self, url: &Url) -> Route {
        let route = self
            .rules
            .iter()
            .find(|rule| rule.pattern.matches(url))
            .map(|rule| rule.route)
            .unwrap_or(self.default_route);
        trace!(url = %url, ?route, "Routed request");
        route
    }
}
