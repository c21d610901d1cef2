//! Close classification and reconnect policy.

use std::fmt;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Close code browsers report when the peer sent a close frame without a status.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Close code for a connection lost without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Policy violation; the backend uses it for rejected credentials.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectKind {
    /// `disconnect()` was called.
    Requested,
    /// Network drop or a non-terminal close; a retry follows when enabled.
    Transient,
    /// Credentials refused or missing. Terminal: the caller must re-authenticate.
    AuthRejected,
    /// The max-attempts limit was hit.
    RetriesExhausted,
}

impl DisconnectKind {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DisconnectKind::Transient)
    }
}

impl fmt::Display for DisconnectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DisconnectKind::Requested => "requested",
            DisconnectKind::Transient => "transient",
            DisconnectKind::AuthRejected => "auth_rejected",
            DisconnectKind::RetriesExhausted => "retries_exhausted",
        };
        f.write_str(s)
    }
}

/// Why the connection went to `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    pub kind: DisconnectKind,
    /// WebSocket close code, or the HTTP status of a rejected handshake.
    pub code: Option<u16>,
    pub message: String,
}

impl DisconnectReason {
    pub fn new(kind: DisconnectKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    pub fn closed(code: u16, message: impl Into<String>, kind: DisconnectKind) -> Self {
        Self {
            kind,
            code: Some(code),
            message: message.into(),
        }
    }

    pub fn requested() -> Self {
        Self::new(DisconnectKind::Requested, "client disconnected")
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} ({}, code: {})", self.message, self.kind, code),
            None => write!(f, "{} ({})", self.message, self.kind),
        }
    }
}

/// Whether and when to re-dial after a drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub auto_reconnect: bool,
    /// Fixed wait before each attempt.
    pub delay: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Close codes treated as auth rejection.
    pub terminal_close_codes: Vec<u16>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            delay: Duration::from_millis(3000),
            max_attempts: None,
            terminal_close_codes: vec![CLOSE_POLICY_VIOLATION],
        }
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            auto_reconnect: config.auto_reconnect,
            delay: config.reconnect_delay(),
            max_attempts: config.max_reconnect_attempts,
            terminal_close_codes: config.terminal_close_codes.clone(),
        }
    }

    /// Classify a close frame (or its absence) from the server.
    pub fn classify_close(&self, code: u16, reason: &str) -> DisconnectReason {
        let kind = if self.terminal_close_codes.contains(&code) {
            DisconnectKind::AuthRejected
        } else {
            DisconnectKind::Transient
        };
        let message = if reason.is_empty() {
            "server closed connection".to_string()
        } else {
            reason.to_string()
        };
        DisconnectReason::closed(code, message, kind)
    }

    /// Classify a failed handshake or transport error.
    pub fn classify_error(&self, err: &ClientError) -> DisconnectReason {
        match err {
            ClientError::Handshake { status } if err.is_auth_rejection() => DisconnectReason::closed(
                *status,
                "handshake rejected",
                DisconnectKind::AuthRejected,
            ),
            ClientError::Handshake { status } => {
                DisconnectReason::closed(*status, "handshake failed", DisconnectKind::Transient)
            }
            ClientError::Auth(msg) => DisconnectReason::new(DisconnectKind::AuthRejected, msg.clone()),
            other => DisconnectReason::closed(CLOSE_ABNORMAL, other.to_string(), DisconnectKind::Transient),
        }
    }

    /// `attempt` is 1-based: the number of the retry about to be scheduled.
    pub fn allows(&self, attempt: u32) -> bool {
        self.auto_reconnect && self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_violation_is_terminal() {
        let policy = ReconnectPolicy::default();
        let reason = policy.classify_close(1008, "invalid token");
        assert_eq!(reason.kind, DisconnectKind::AuthRejected);
        assert_eq!(reason.code, Some(1008));
        assert!(reason.is_terminal());
    }

    #[test]
    fn other_codes_are_transient() {
        let policy = ReconnectPolicy::default();
        for code in [1000, CLOSE_NO_STATUS, CLOSE_ABNORMAL, 1011, 1012] {
            assert_eq!(policy.classify_close(code, "").kind, DisconnectKind::Transient);
        }
    }

    #[test]
    fn configured_codes_extend_terminal_set() {
        let policy = ReconnectPolicy {
            terminal_close_codes: vec![1008, 4001],
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.classify_close(4001, "").kind, DisconnectKind::AuthRejected);
    }

    #[test]
    fn handshake_errors() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            policy.classify_error(&ClientError::Handshake { status: 401 }).kind,
            DisconnectKind::AuthRejected
        );
        assert_eq!(
            policy.classify_error(&ClientError::Handshake { status: 503 }).kind,
            DisconnectKind::Transient
        );
        let refused = policy.classify_error(&ClientError::WebSocket("connection refused".into()));
        assert_eq!(refused.kind, DisconnectKind::Transient);
        assert_eq!(refused.code, Some(CLOSE_ABNORMAL));
    }

    #[test]
    fn missing_token_is_terminal_without_code() {
        let policy = ReconnectPolicy::default();
        let reason = policy.classify_error(&ClientError::Auth("bearer token expired".into()));
        assert_eq!(reason.kind, DisconnectKind::AuthRejected);
        assert_eq!(reason.code, None);
        assert_eq!(reason.message, "bearer token expired");
    }

    #[test]
    fn max_attempts_bounds_retries() {
        let policy = ReconnectPolicy {
            max_attempts: Some(2),
            ..ReconnectPolicy::default()
        };
        assert!(policy.allows(1));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));

        let off = ReconnectPolicy {
            auto_reconnect: false,
            ..ReconnectPolicy::default()
        };
        assert!(!off.allows(1));
    }
}
