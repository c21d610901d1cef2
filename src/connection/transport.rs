//! Socket transport seam and its tokio-tungstenite implementation.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use crate::connection::close::CLOSE_NO_STATUS;
use crate::error::ClientResult;

const TOKEN_PARAM: &str = "token";
const WS_PATH: &str = "/ws";

/// Inbound frame as seen by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// Close frame; a frame without a status is reported as 1005.
    Close { code: u16, reason: String },
}

/// One established socket.
#[async_trait]
pub trait Socket: Send {
    async fn send_text(&mut self, text: String) -> ClientResult<()>;

    /// Next frame; `None` once the stream has ended. Must be cancel safe.
    async fn recv(&mut self) -> Option<ClientResult<Frame>>;

    /// Start the closing handshake. Errors are ignored.
    async fn close(&mut self);
}

/// Dials the real-time endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &Url) -> ClientResult<Box<dyn Socket>>;
}

/// `<base>/ws?token=<bearer>`; `/ws` is only appended when the path does not already end with it.
pub fn build_endpoint(base: &Url, token: &str) -> Url {
    let mut url = base.clone();
    let path = base.path().trim_end_matches('/');
    if !path.ends_with(WS_PATH) {
        url.set_path(&format!("{}{}", path, WS_PATH));
    }

    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(k, _)| k != TOKEN_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.set_query(None);
    {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair(TOKEN_PARAM, token);
    }
    url
}

/// Endpoint with the token masked, for logs.
pub(crate) fn redact(endpoint: &Url) -> String {
    let mut url = endpoint.clone();
    let pairs: Vec<(String, String)> = endpoint
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == TOKEN_PARAM { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    url.set_query(None);
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }
    url.to_string()
}

/// Production connector over tokio-tungstenite (TLS via rustls for `wss`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, endpoint: &Url) -> ClientResult<Box<dyn Socket>> {
        let (stream, response) = connect_async(endpoint.as_str()).await?;
        debug!(status = %response.status(), "websocket handshake complete");
        Ok(Box::new(TungsteniteSocket { inner: stream }))
    }
}

struct TungsteniteSocket {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Socket for TungsteniteSocket {
    async fn send_text(&mut self, text: String) -> ClientResult<()> {
        self.inner.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<ClientResult<Frame>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text))),
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => return Some(Ok(Frame::Text(text))),
                    Err(_) => warn!("dropping non-UTF-8 binary frame"),
                },
                Ok(Message::Close(frame)) => {
                    let (code, reason) = match frame {
                        Some(f) => (u16::from(f.code), f.reason.into_owned()),
                        None => (CLOSE_NO_STATUS, String::new()),
                    };
                    return Some(Ok(Frame::Close { code, reason }));
                }
                // tungstenite queues the pong itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.close(None).await {
            debug!(error = %e, "close handshake failed");
        }
    }
}
