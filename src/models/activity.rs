//! Activity records for the live feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::message::{InboundMessage, MessagePayload};

/// Bot action behind an activity entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Apply,
    Email,
    Error,
    Resume,
    Scraping,
    #[default]
    Success,
}

impl ActivityKind {
    /// Map the wire value; anything unrecognised is `Success`.
    pub fn from_wire(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "apply" => ActivityKind::Apply,
            "email" => ActivityKind::Email,
            "error" => ActivityKind::Error,
            "resume" => ActivityKind::Resume,
            "scraping" => ActivityKind::Scraping,
            _ => ActivityKind::Success,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub kind: ActivityKind,
    pub title: String,
    pub description: String,
    /// Human "time ago" label computed at receipt.
    pub time: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Activity {
    /// Build an activity from an `activity` message; `None` for any other kind.
    pub fn from_message(message: &InboundMessage, now: DateTime<Utc>) -> Option<Self> {
        let MessagePayload::Activity(payload) = &message.payload else {
            return None;
        };
        let at = message.effective_time();
        Some(Self {
            id: Uuid::new_v4(),
            kind: payload.kind(),
            title: payload
                .title
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Activity".to_string()),
            description: payload.description.clone().unwrap_or_default(),
            time: format_time_ago(at, now),
            timestamp: at.timestamp_millis(),
        })
    }
}

/// `Just now` under a minute, then whole minutes, hours, days.
pub fn format_time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds();
    if seconds < 60 {
        "Just now".to_string()
    } else if seconds < 3600 {
        format!("{} mins ago", seconds / 60)
    } else if seconds < 86_400 {
        format!("{} hours ago", seconds / 3600)
    } else {
        format!("{} days ago", seconds / 86_400)
    }
}
