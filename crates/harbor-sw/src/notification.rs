//! Push notifications.
//!
//! Payloads are parsed leniently: anything that isn't a JSON object becomes
//! the body of a notification with configured defaults for the rest. Display
//! goes through a [`NotificationSurface`], which replaces notifications that
//! share a tag.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use harbor_core::{NotificationConfig, WorkerConfig};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::clients::{ClientMatchOptions, ClientType};
use crate::host::{HostEnvironment, ServiceWorkerEvent};
use crate::WorkerError;

/// Push message data as sent by the application server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub tag: Option<String>,
    pub url: Option<String>,
    pub vibrate: Option<Vec<u32>>,
    pub require_interaction: Option<bool>,
}

impl PushPayload {
    /// Parse push data. Never fails: non-object data becomes the body text.
    pub fn parse(data: Option<&[u8]>) -> Self {
        let Some(data) = data else {
            return Self::default();
        };

        let parsed = serde_json::from_slice::<serde_json::Value>(data)
            .ok()
            .filter(serde_json::Value::is_object)
            .and_then(|value| serde_json::from_value::<Self>(value).ok());

        parsed.unwrap_or_else(|| {
            debug!(len = data.len(), "Push payload is not a JSON object, using it as text");
            Self {
                body: Some(String::from_utf8_lossy(data).into_owned()),
                ..Default::default()
            }
        })
    }
}

/// A notification ready for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    /// Page to open when clicked.
    pub url: String,
    pub vibrate: Vec<u32>,
    pub require_interaction: bool,
    pub timestamp_ms: u64,
}

fn or_default(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl Notification {
    /// Fill missing or blank payload fields from `defaults`.
    pub fn from_payload(payload: PushPayload, defaults: &NotificationConfig) -> Self {
        Self {
            title: or_default(payload.title, &defaults.default_title),
            body: or_default(payload.body, &defaults.default_body),
            icon: or_default(payload.icon, &defaults.default_icon),
            badge: or_default(payload.badge, &defaults.default_badge),
            tag: or_default(payload.tag, &defaults.default_tag),
            url: or_default(payload.url, &defaults.default_url),
            vibrate: payload
                .vibrate
                .unwrap_or_else(|| defaults.default_vibrate.clone()),
            require_interaction: payload.require_interaction.unwrap_or(false),
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
        }
    }
}

/// Where notifications are displayed.
///
/// Showing a notification whose tag is already visible replaces it.
#[async_trait]
pub trait NotificationSurface: Send + Sync {
    async fn show(&self, notification: Notification) -> Result<(), WorkerError>;

    /// Close the notification with `tag`. Returns whether one was visible.
    async fn close(&self, tag: &str) -> bool;

    /// Visible notifications, oldest first.
    async fn visible(&self) -> Vec<Notification>;
}

/// In-memory notification surface.
#[derive(Debug, Default)]
pub struct NotificationTray {
    shown: Mutex<Vec<Notification>>,
}

impl NotificationTray {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationSurface for NotificationTray {
    async fn show(&self, notification: Notification) -> Result<(), WorkerError> {
        let mut shown = self.shown.lock().await;
        shown.retain(|n| n.tag != notification.tag);
        shown.push(notification);
        Ok(())
    }

    async fn close(&self, tag: &str) -> bool {
        let mut shown = self.shown.lock().await;
        let before = shown.len();
        shown.retain(|n| n.tag != tag);
        shown.len() != before
    }

    async fn visible(&self) -> Vec<Notification> {
        self.shown.lock().await.clone()
    }
}

/// What a notification click did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// An existing window at the target URL was focused.
    Focused(String),
    /// A new window was opened.
    Opened(String),
}

/// Shows notifications and handles clicks on them.
pub struct Notifier {
    config: Arc<WorkerConfig>,
    host: HostEnvironment,
}

impl Notifier {
    pub fn new(config: Arc<WorkerConfig>, host: HostEnvironment) -> Self {
        Self { config, host }
    }

    pub fn defaults(&self) -> &NotificationConfig {
        &self.config.notifications
    }

    /// Handle a push message.
    pub async fn show_push(&self, data: Option<&[u8]>) -> Result<Notification, WorkerError> {
        let notification = Notification::from_payload(PushPayload::parse(data), self.defaults());
        self.show(notification.clone()).await?;
        Ok(notification)
    }

    pub async fn show(&self, notification: Notification) -> Result<(), WorkerError> {
        let tag = notification.tag.clone();
        info!(tag = %tag, title = %notification.title, "Showing notification");
        self.host.notifications.show(notification).await?;
        self.host.emit(ServiceWorkerEvent::NotificationShown { tag });
        Ok(())
    }

    /// Close the clicked notification, then focus a window already at its
    /// URL or open a new one.
    pub async fn click(&self, notification: &Notification) -> Result<ClickOutcome, WorkerError> {
        self.host.notifications.close(&notification.tag).await;

        let target = self.config.resolve(&notification.url)?;
        let mut clients = self.host.clients.write().await;

        let options = ClientMatchOptions {
            include_uncontrolled: true,
            client_type: ClientType::Window,
        };
        let existing = clients
            .match_all(&options)
            .into_iter()
            .find(|c| c.url == target);

        let outcome = match existing {
            Some(client) => ClickOutcome::Focused(clients.focus(&client.id)?.id),
            None => ClickOutcome::Opened(clients.open_window(target).id),
        };
        debug!(tag = %notification.tag, ?outcome, "Handled notification click");
        Ok(outcome)
    }
}
