//! Worker configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{CacheNamespace, NamespaceKind};

/// Configuration for one deployed worker version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Application name, used as the cache namespace prefix
    pub app_name: String,

    /// Deployed version; bumping it invalidates every cache namespace
    pub version: String,

    /// Origin the worker serves, e.g. `https://app.example.com`
    pub origin: Url,

    /// Paths precached into the static namespace at install time
    #[serde(default)]
    pub precache: Vec<String>,

    /// Path of the offline fallback document
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// Path prefixes served cache-first
    #[serde(default = "default_static_prefixes")]
    pub static_prefixes: Vec<String>,

    /// Path prefixes never intercepted
    #[serde(default)]
    pub passthrough_prefixes: Vec<String>,

    /// Entry cap of the dynamic namespace
    #[serde(default = "default_dynamic_max_entries")]
    pub dynamic_max_entries: usize,

    /// Optional bound on network-first fetches, in milliseconds
    #[serde(default)]
    pub network_timeout_ms: Option<u64>,

    /// Attempts per precache manifest entry
    #[serde(default = "default_precache_attempts")]
    pub precache_attempts: u32,

    /// Promote out of the waiting state right after install
    #[serde(default = "default_true")]
    pub skip_waiting: bool,

    /// Take control of already-open clients on activation
    #[serde(default = "default_true")]
    pub claim_clients: bool,

    /// Trim the dynamic namespace to its cap on activation
    #[serde(default = "default_true")]
    pub trim_on_activate: bool,

    /// Store opaque cross-origin responses
    #[serde(default)]
    pub cache_opaque_responses: bool,

    /// Notification defaults
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Defaults applied to push payloads and reminders
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub default_title: String,
    pub default_body: String,
    pub default_icon: String,
    pub default_badge: String,
    pub default_tag: String,
    pub default_url: String,
    pub default_vibrate: Vec<u32>,
    /// Tag shared by every scheduled reminder, so reminders replace each other
    pub reminder_tag: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_title: "New notification".to_string(),
            default_body: "You have a new update.".to_string(),
            default_icon: "/static/icons/icon-192.png".to_string(),
            default_badge: "/static/icons/badge-72.png".to_string(),
            default_tag: "general".to_string(),
            default_url: "/".to_string(),
            default_vibrate: vec![200, 100, 200],
            reminder_tag: "reminder".to_string(),
        }
    }
}

fn default_offline_page() -> String {
    "/offline.html".to_string()
}

fn default_static_prefixes() -> Vec<String> {
    vec!["/static/".to_string()]
}

fn default_dynamic_max_entries() -> usize {
    50
}

fn default_precache_attempts() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl WorkerConfig {
    /// Create a configuration with defaults for everything but identity.
    pub fn new(app_name: impl Into<String>, version: impl Into<String>, origin: Url) -> Self {
        Self {
            app_name: app_name.into(),
            version: version.into(),
            origin,
            precache: Vec::new(),
            offline_page: default_offline_page(),
            static_prefixes: default_static_prefixes(),
            passthrough_prefixes: Vec::new(),
            dynamic_max_entries: default_dynamic_max_entries(),
            network_timeout_ms: None,
            precache_attempts: default_precache_attempts(),
            skip_waiting: true,
            claim_clients: true,
            trim_on_activate: true,
            cache_opaque_responses: false,
            notifications: NotificationConfig::default(),
        }
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading worker config");
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check invariants the engine relies on.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.app_name.trim().is_empty() {
            return Err(ConfigError::invalid("app_name must not be empty"));
        }
        if self.app_name.chars().any(char::is_whitespace) {
            return Err(ConfigError::invalid("app_name must not contain whitespace"));
        }
        if self.version.trim().is_empty() {
            return Err(ConfigError::invalid("version must not be empty"));
        }
        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(format!(
                "origin must be http or https, got '{}'",
                self.origin.scheme()
            )));
        }
        if self.dynamic_max_entries == 0 {
            return Err(ConfigError::invalid("dynamic_max_entries must be at least 1"));
        }
        for prefix in self.static_prefixes.iter().chain(&self.passthrough_prefixes) {
            if !prefix.starts_with('/') {
                return Err(ConfigError::invalid(format!(
                    "route prefix '{}' must start with '/'",
                    prefix
                )));
            }
        }
        for path in &self.precache {
            self.resolve(path)?;
        }
        if !self.precache.iter().any(|p| p == &self.offline_page) {
            warn!(
                offline_page = %self.offline_page,
                "Offline page is not in the precache manifest; navigations will get the built-in page"
            );
        }
        Ok(())
    }

    /// Namespace for precached assets at the current version.
    pub fn static_namespace(&self) -> CacheNamespace {
        CacheNamespace::new(&self.app_name, &self.version, NamespaceKind::Static, None)
    }

    /// Bounded runtime namespace at the current version.
    pub fn dynamic_namespace(&self) -> CacheNamespace {
        CacheNamespace::new(
            &self.app_name,
            &self.version,
            NamespaceKind::Dynamic,
            Some(self.dynamic_max_entries),
        )
    }

    /// Namespace for the given kind at the current version.
    pub fn namespace(&self, kind: NamespaceKind) -> CacheNamespace {
        match kind {
            NamespaceKind::Static => self.static_namespace(),
            NamespaceKind::Dynamic => self.dynamic_namespace(),
        }
    }

    /// Cache names that survive activation.
    pub fn allowed_cache_names(&self) -> Vec<String> {
        vec![self.static_namespace().name, self.dynamic_namespace().name]
    }

    /// Resolve a manifest path or URL against the origin.
    pub fn resolve(&self, path: &str) -> ConfigResult<Url> {
        Ok(self.origin.join(path)?)
    }

    /// Absolute URLs of the precache manifest, in order.
    pub fn precache_urls(&self) -> ConfigResult<Vec<Url>> {
        self.precache.iter().map(|p| self.resolve(p)).collect()
    }

    /// Absolute URL of the offline document.
    pub fn offline_url(&self) -> ConfigResult<Url> {
        self.resolve(&self.offline_page)
    }

    pub fn network_timeout(&self) -> Option<Duration> {
        self.network_timeout_ms.map(Duration::from_millis)
    }
}
