//! Locally scheduled reminder notifications.
//!
//! Reminders live only as long as the worker: they are tokio timers, not
//! persisted, and [`ReminderScheduler::close`] drops them and refuses new ones.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::notification::{Notification, Notifier, PushPayload};

/// Body of a `SCHEDULE_NOTIFICATION` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Delay in milliseconds. Negative, fractional, and `null` delays are
    /// accepted the way a page timer accepts them.
    #[serde(
        rename = "delay",
        alias = "delayMs",
        default,
        deserialize_with = "lenient_delay"
    )]
    pub delay_ms: u64,
}

fn lenient_delay<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let ms = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    // `as` saturates, so huge delays clamp to u64::MAX.
    Ok(if ms.is_finite() && ms > 0.0 { ms as u64 } else { 0 })
}

impl ReminderRequest {
    pub fn new(title: impl Into<String>, body: impl Into<String>, delay: Duration) -> Self {
        Self {
            title: Some(title.into()),
            body: Some(body.into()),
            delay_ms: delay.as_millis() as u64,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Default)]
struct Pending {
    handles: Vec<JoinHandle<()>>,
    closed: bool,
}

pub struct ReminderScheduler {
    notifier: Arc<Notifier>,
    pending: Mutex<Pending>,
}

impl ReminderScheduler {
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self {
            notifier,
            pending: Mutex::new(Pending::default()),
        }
    }

    /// Show a reminder after its delay, tagged with the reminder tag.
    ///
    /// Returns `false` without scheduling anything once the scheduler is closed.
    pub async fn schedule(&self, request: ReminderRequest) -> bool {
        let mut pending = self.pending.lock().await;
        if pending.closed {
            debug!("Scheduler closed, dropping reminder");
            return false;
        }

        let delay = request.delay();
        let defaults = self.notifier.defaults();
        let mut notification = Notification::from_payload(
            PushPayload {
                title: request.title,
                body: request.body,
                ..Default::default()
            },
            defaults,
        );
        notification.tag = defaults.reminder_tag.clone();

        debug!(?delay, title = %notification.title, "Scheduling reminder");
        let notifier = self.notifier.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = notifier.show(notification).await {
                warn!(error = %e, "Failed to show reminder");
            }
        });

        pending.handles.retain(|h| !h.is_finished());
        pending.handles.push(handle);
        true
    }

    /// Reminders not yet fired.
    pub async fn pending(&self) -> usize {
        self.pending
            .lock()
            .await
            .handles
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Cancel pending reminders and refuse any scheduled afterwards.
    /// Returns how many were cancelled.
    pub async fn close(&self) -> usize {
        let mut pending = self.pending.lock().await;
        pending.closed = true;
        let mut cancelled = 0;
        for handle in pending.handles.drain(..) {
            if !handle.is_finished() {
                handle.abort();
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            debug!(cancelled, "Cancelled pending reminders");
        }
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request: ReminderRequest =
            serde_json::from_str(r#"{"title":"Cart","body":"Still there?","delay":60000}"#).unwrap();
        assert_eq!(request.delay(), Duration::from_secs(60));

        let request: ReminderRequest = serde_json::from_str(r#"{"delayMs":5}"#).unwrap();
        assert_eq!(request.delay_ms, 5);
        assert_eq!(request.title, None);
    }

    #[test]
    fn test_delay_is_lenient() {
        let delay = |raw: &str| {
            serde_json::from_str::<ReminderRequest>(&format!(r#"{{"delay":{raw}}}"#))
                .unwrap()
                .delay_ms
        };
        assert_eq!(delay("-1"), 0);
        assert_eq!(delay("1500.5"), 1500);
        assert_eq!(delay("null"), 0);
        assert_eq!(delay("1e300"), u64::MAX);
        assert_eq!(
            serde_json::from_str::<ReminderRequest>("{}").unwrap().delay_ms,
            0
        );
    }
}
