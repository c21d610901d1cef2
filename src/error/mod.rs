//! Client error types.

use thiserror::Error;

/// Errors surfaced by the live client.
///
/// None of these are shown to end users verbatim; they are logged and
/// folded into connection state or [`DisconnectReason`](crate::DisconnectReason)s.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The server answered the upgrade request with a plain HTTP status.
    #[error("WebSocket handshake rejected with HTTP {status}")]
    Handshake { status: u16 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// No usable bearer token: missing, or a JWT past its `exp`.
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Presentation failed: {0}")]
    Presentation(String),
}

impl ClientError {
    /// Handshake statuses that mean the credentials were refused.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, ClientError::Auth(_))
            || matches!(self, ClientError::Handshake { status } if *status == 401 || *status == 403)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        match err {
            tokio_tungstenite::tungstenite::Error::Http(response) => ClientError::Handshake {
                status: response.status().as_u16(),
            },
            other => ClientError::WebSocket(other.to_string()),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_401_and_403_are_auth_rejections() {
        assert!(ClientError::Handshake { status: 401 }.is_auth_rejection());
        assert!(ClientError::Handshake { status: 403 }.is_auth_rejection());
        assert!(!ClientError::Handshake { status: 502 }.is_auth_rejection());
        assert!(!ClientError::WebSocket("reset".to_string()).is_auth_rejection());
        assert!(ClientError::Auth("no bearer token available".to_string()).is_auth_rejection());
    }
}
