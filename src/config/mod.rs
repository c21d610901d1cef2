//! Client configuration loaded from environment.

use std::time::Duration;

use url::Url;
use validator::Validate;

use crate::models::SoundPolicy;

/// Client configuration loaded from `.env` and environment variables.
#[derive(Debug, Clone, Validate)]
pub struct ClientConfig {
    /// Base URL of the real-time endpoint (e.g. `ws://localhost:8000`). `/ws` is appended when missing.
    #[validate(url)]
    pub ws_url: String,
    /// Reconnect automatically after transient drops.
    pub auto_reconnect: bool,
    /// Fixed delay before each reconnect attempt, in milliseconds.
    #[validate(range(min = 1))]
    pub reconnect_delay_ms: u64,
    /// Give up after this many consecutive attempts. `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    /// Close codes that mean "do not retry" (auth rejected).
    #[validate(length(min = 1))]
    pub terminal_close_codes: Vec<u16>,
    /// Skip connecting when the bearer token is a JWT that has already expired.
    pub check_token_expiry: bool,
    /// Number of activities kept in the live feed.
    #[validate(range(min = 1))]
    pub activity_capacity: usize,
    /// Number of raw messages kept in the live log.
    #[validate(range(min = 1))]
    pub message_log_capacity: usize,
    /// When notifications play an audio cue.
    pub sound: SoundPolicy,
    /// Log level: `error`, `warn`, `info`, `debug`, `trace`.
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8000".to_string(),
            auto_reconnect: true,
            reconnect_delay_ms: 3000,
            max_reconnect_attempts: None,
            terminal_close_codes: vec![1008],
            check_token_expiry: true,
            activity_capacity: 10,
            message_log_capacity: 50,
            sound: SoundPolicy::HighPriority,
            log_level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment. Call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (environment, map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let ws_url = lookup("WS_URL").unwrap_or(defaults.ws_url);
        let auto_reconnect = match lookup("WS_AUTO_RECONNECT") {
            Some(v) => parse_bool(&v).ok_or(ConfigLoadError::Invalid("WS_AUTO_RECONNECT"))?,
            None => defaults.auto_reconnect,
        };
        let reconnect_delay_ms = match lookup("WS_RECONNECT_DELAY_MS") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| ConfigLoadError::Invalid("WS_RECONNECT_DELAY_MS"))?,
            None => defaults.reconnect_delay_ms,
        };
        let max_reconnect_attempts = match lookup("WS_MAX_RECONNECT_ATTEMPTS") {
            Some(v) if !v.trim().is_empty() => Some(
                v.trim()
                    .parse()
                    .map_err(|_| ConfigLoadError::Invalid("WS_MAX_RECONNECT_ATTEMPTS"))?,
            ),
            _ => None,
        };
        let terminal_close_codes = match lookup("WS_TERMINAL_CLOSE_CODES") {
            Some(v) => v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<u16>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ConfigLoadError::Invalid("WS_TERMINAL_CLOSE_CODES"))?,
            None => defaults.terminal_close_codes,
        };
        let check_token_expiry = match lookup("WS_CHECK_TOKEN_EXPIRY") {
            Some(v) => parse_bool(&v).ok_or(ConfigLoadError::Invalid("WS_CHECK_TOKEN_EXPIRY"))?,
            None => defaults.check_token_expiry,
        };
        let activity_capacity = match lookup("ACTIVITY_FEED_CAPACITY") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| ConfigLoadError::Invalid("ACTIVITY_FEED_CAPACITY"))?,
            None => defaults.activity_capacity,
        };
        let message_log_capacity = match lookup("MESSAGE_LOG_CAPACITY") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| ConfigLoadError::Invalid("MESSAGE_LOG_CAPACITY"))?,
            None => defaults.message_log_capacity,
        };
        let sound = match lookup("NOTIFICATION_SOUND") {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigLoadError::Invalid("NOTIFICATION_SOUND"))?,
            None => defaults.sound,
        };
        let log_level = lookup("LOG_LEVEL").unwrap_or(defaults.log_level);

        let config = Self {
            ws_url,
            auto_reconnect,
            reconnect_delay_ms,
            max_reconnect_attempts,
            terminal_close_codes,
            check_token_expiry,
            activity_capacity,
            message_log_capacity,
            sound,
            log_level,
        };
        config
            .validate()
            .map_err(|e| ConfigLoadError::Validation(e.to_string()))?;
        config.base_url()?;
        Ok(config)
    }

    /// Parsed base URL; only `ws` and `wss` schemes are accepted.
    pub fn base_url(&self) -> Result<Url, ConfigLoadError> {
        let url = Url::parse(&self.ws_url).map_err(|_| ConfigLoadError::InvalidWsUrl)?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            _ => Err(ConfigLoadError::InvalidWsUrl),
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Invalid WS_URL (expected ws:// or wss://)")]
    InvalidWsUrl,
    #[error("Invalid {0}")]
    Invalid(&'static str),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<ClientConfig, ConfigLoadError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = tokio_test::assert_ok!(load(&[]));
        assert_eq!(config.ws_url, "ws://localhost:8000");
        assert_eq!(config.reconnect_delay(), Duration::from_secs(3));
        assert_eq!(config.terminal_close_codes, vec![1008]);
        assert_eq!(config.activity_capacity, 10);
        assert_eq!(config.message_log_capacity, 50);
        assert!(config.auto_reconnect);
        assert!(config.max_reconnect_attempts.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = tokio_test::assert_ok!(load(&[
            ("WS_URL", "wss://api.example.com/ws"),
            ("WS_AUTO_RECONNECT", "false"),
            ("WS_RECONNECT_DELAY_MS", "5000"),
            ("WS_MAX_RECONNECT_ATTEMPTS", "7"),
            ("WS_TERMINAL_CLOSE_CODES", "1008, 4001"),
            ("NOTIFICATION_SOUND", "always"),
        ]));
        assert_eq!(config.ws_url, "wss://api.example.com/ws");
        assert!(!config.auto_reconnect);
        assert_eq!(config.reconnect_delay_ms, 5000);
        assert_eq!(config.max_reconnect_attempts, Some(7));
        assert_eq!(config.terminal_close_codes, vec![1008, 4001]);
        assert_eq!(config.sound, SoundPolicy::Always);
    }

    #[test]
    fn rejects_http_scheme() {
        assert!(matches!(
            load(&[("WS_URL", "http://localhost:8000")]),
            Err(ConfigLoadError::InvalidWsUrl)
        ));
    }

    #[test]
    fn rejects_zero_capacity_and_delay() {
        assert!(matches!(
            load(&[("ACTIVITY_FEED_CAPACITY", "0")]),
            Err(ConfigLoadError::Validation(_))
        ));
        assert!(matches!(
            load(&[("WS_RECONNECT_DELAY_MS", "0")]),
            Err(ConfigLoadError::Validation(_))
        ));
    }

    #[test]
    fn rejects_garbage_numbers() {
        assert!(matches!(
            load(&[("WS_TERMINAL_CLOSE_CODES", "1008,abc")]),
            Err(ConfigLoadError::Invalid("WS_TERMINAL_CLOSE_CODES"))
        ));
        assert!(matches!(
            load(&[("WS_AUTO_RECONNECT", "maybe")]),
            Err(ConfigLoadError::Invalid("WS_AUTO_RECONNECT"))
        ));
    }
}
