//! Inbound wire messages from the real-time endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::models::activity::ActivityKind;
use crate::models::notification::Severity;

/// Message body, tagged by the wire `type` field with its payload under `data`.
///
/// Unknown `type` values fail to decode; nothing is default-routed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessagePayload {
    Notification(NotificationPayload),
    Activity(ActivityPayload),
    Status(serde_json::Map<String, serde_json::Value>),
    Error(ErrorPayload),
}

impl MessagePayload {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessagePayload::Notification(_) => MessageKind::Notification,
            MessagePayload::Activity(_) => MessageKind::Activity,
            MessagePayload::Status(_) => MessageKind::Status,
            MessagePayload::Error(_) => MessageKind::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Notification,
    Activity,
    Status,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// Severity as sent by the server; see [`NotificationPayload::severity`].
    #[serde(rename = "type", default)]
    pub severity: Option<String>,
}

impl NotificationPayload {
    /// Unknown or missing severities are shown as `info`.
    pub fn severity(&self) -> Severity {
        self.severity
            .as_deref()
            .map(Severity::from_wire)
            .unwrap_or_default()
    }

    /// Frames carrying neither a title nor a message are not worth showing.
    pub fn is_empty(&self) -> bool {
        is_blank(&self.title) && is_blank(&self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPayload {
    #[serde(default)]
    pub activity_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ActivityPayload {
    pub fn kind(&self) -> ActivityKind {
        self.activity_type
            .as_deref()
            .map(ActivityKind::from_wire)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub payload: MessagePayload,
    /// Server timestamp, when present and well formed.
    pub server_time: Option<DateTime<Utc>>,
    /// Client clock at decode time.
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Decode one text frame. Non-JSON, missing or unknown `type`, and ill-typed `data` are errors.
    pub fn parse(text: &str, received_at: DateTime<Utc>) -> ClientResult<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let payload = MessagePayload::deserialize(&value)
            .map_err(|e| ClientError::MalformedMessage(e.to_string()))?;
        let server_time = value
            .get("timestamp")
            .and_then(serde_json::Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));

        Ok(Self {
            payload,
            server_time,
            received_at,
        })
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    /// Timestamp used for ordering and display.
    pub fn effective_time(&self) -> DateTime<Utc> {
        self.server_time.unwrap_or(self.received_at)
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |s| s.trim().is_empty())
}
