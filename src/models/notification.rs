//! Notification records shown in the notification center.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    /// Map the wire value; anything unrecognised is `Info`.
    pub fn from_wire(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => Severity::Success,
            "warning" => Severity::Warning,
            "error" => Severity::Error,
            _ => Severity::Info,
        }
    }

    pub fn is_high_priority(&self) -> bool {
        matches!(self, Severity::Warning | Severity::Error)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

/// Input for a new notification; id, timestamp and read flag are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub title: String,
    pub message: String,
    pub severity: Severity,
}

impl NewNotification {
    pub fn new(title: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Local id; unique within this process only.
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    pub fn from_new(new: NewNotification, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: new.title,
            message: new.message,
            severity: new.severity,
            timestamp,
            read: false,
        }
    }
}

/// Read-only view handed to consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NotificationSnapshot {
    /// Newest first.
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}

/// When a new notification plays an audio cue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundPolicy {
    Never,
    /// Warnings and errors only.
    #[default]
    HighPriority,
    Always,
}

impl SoundPolicy {
    pub fn should_play(&self, severity: Severity) -> bool {
        match self {
            SoundPolicy::Never => false,
            SoundPolicy::HighPriority => severity.is_high_priority(),
            SoundPolicy::Always => true,
        }
    }
}

impl FromStr for SoundPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" | "off" => Ok(SoundPolicy::Never),
            "high" | "high_priority" => Ok(SoundPolicy::HighPriority),
            "always" | "on" => Ok(SoundPolicy::Always),
            other => Err(format!("unknown sound policy: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_from_wire() {
        assert_eq!(Severity::from_wire("success"), Severity::Success);
        assert_eq!(Severity::from_wire("WARNING"), Severity::Warning);
        assert_eq!(Severity::from_wire("error"), Severity::Error);
        assert_eq!(Severity::from_wire("whatever"), Severity::Info);
    }

    #[test]
    fn sound_policy_gates_by_severity() {
        assert!(SoundPolicy::HighPriority.should_play(Severity::Error));
        assert!(!SoundPolicy::HighPriority.should_play(Severity::Success));
        assert!(SoundPolicy::Always.should_play(Severity::Info));
        assert!(!SoundPolicy::Never.should_play(Severity::Error));
        assert_eq!("high".parse::<SoundPolicy>(), Ok(SoundPolicy::HighPriority));
        assert!("loud".parse::<SoundPolicy>().is_err());
    }
}
