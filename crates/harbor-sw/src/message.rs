//! Messages posted to the worker by pages.

use serde::{Deserialize, Serialize};

use crate::reminder::ReminderRequest;

/// A page-to-worker message, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// `{"type":"SCHEDULE_NOTIFICATION","title":..,"body":..,"delay":ms}`
    ScheduleNotification(ReminderRequest),
    /// Promote the waiting worker now.
    SkipWaiting,
    /// Fetch and store the given same-origin URLs.
    CacheUrls { urls: Vec<String> },
}

impl WorkerMessage {
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}
