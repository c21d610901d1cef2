//! Connection manager: one shared socket, its reconnect policy, and message dispatch.
//!
//! A background task per connection session drives the state machine:
//!
//! - `Idle → Connecting` on [`ConnectionManager::connect`]
//! - `Connecting → Open` on handshake success (retry counter reset, connect subscribers notified)
//! - `Connecting | Open → Closed` on close, error or failed handshake (disconnect subscribers notified)
//! - `Closed → Connecting` after the fixed delay, unless the close was terminal, requested,
//!   or auto-reconnect is off / exhausted
//!
//! Only this module writes the state; everyone else reads snapshots or watches changes.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::auth::{token_expired, TokenSource};
use crate::config::ClientConfig;
use crate::connection::close::{DisconnectKind, DisconnectReason, ReconnectPolicy, CLOSE_ABNORMAL};
use crate::connection::transport::{build_endpoint, redact, Connector, Frame, Socket, TungsteniteConnector};
use crate::error::{ClientError, ClientResult};
use crate::models::InboundMessage;
use crate::services::Subscribers;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Where to connect and how to recover.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Base URL; see [`build_endpoint`].
    pub base_url: Url,
    pub reconnect: ReconnectPolicy,
    /// Refuse to dial with a JWT whose `exp` has passed.
    pub check_token_expiry: bool,
}

impl ConnectionSettings {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            reconnect: ReconnectPolicy::default(),
            check_token_expiry: true,
        }
    }

    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        let base_url = config
            .base_url()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        Ok(Self {
            base_url,
            reconnect: ReconnectPolicy::from_config(config),
            check_token_expiry: config.check_token_expiry,
        })
    }
}

enum ConnCmd {
    Send(String),
    /// Skip the remaining retry delay.
    ConnectNow,
    Shutdown,
}

struct Worker {
    epoch: u64,
    cmd_tx: mpsc::UnboundedSender<ConnCmd>,
    handle: JoinHandle<()>,
}

struct Shared {
    settings: ConnectionSettings,
    tokens: Arc<dyn TokenSource>,
    connector: Arc<dyn Connector>,
    subscribers: Subscribers,
    state: watch::Sender<ConnectionState>,
    retry_attempt: AtomicU32,
    /// Bumped on every connect/disconnect; a task whose epoch is stale stays silent.
    epoch: AtomicU64,
    worker: Mutex<Option<Worker>>,
}

impl Shared {
    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn transition(&self, epoch: u64, next: ConnectionState) -> bool {
        let _guard = self.lock_worker();
        if !self.is_current(epoch) {
            return false;
        }
        let prev = self.state.send_replace(next);
        debug!(from = %prev, to = %next, "connection state");
        true
    }

    /// Resolve the endpoint for the next attempt. The token is read fresh every time.
    fn endpoint(&self) -> ClientResult<Url> {
        let token = self
            .tokens
            .bearer_token()
            .ok_or_else(|| ClientError::Auth("no bearer token available".to_string()))?;
        if self.settings.check_token_expiry && token_expired(&token, Utc::now()) == Some(true) {
            return Err(ClientError::Auth("bearer token expired".to_string()));
        }
        Ok(build_endpoint(&self.settings.base_url, &token))
    }

    /// Called by a task about to exit. Returns `true` if `connect()` asked it to keep going.
    fn retire(&self, epoch: u64, cmd_rx: &mut mpsc::UnboundedReceiver<ConnCmd>) -> bool {
        let mut worker = self.lock_worker();
        if !self.is_current(epoch) {
            return false;
        }
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                ConnCmd::ConnectNow => return true,
                ConnCmd::Send(_) => warn!("socket not open; dropping outbound message"),
                ConnCmd::Shutdown => break,
            }
        }
        if worker.as_ref().map_or(false, |w| w.epoch == epoch) {
            *worker = None;
        }
        false
    }
}

/// Handle to the process-wide connection. Cloning is cheap; clones share one socket.
///
/// The background task keeps running until [`disconnect`](Self::disconnect) is called or a
/// terminal close arrives, so owners must disconnect on logout.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("retry_attempt", &self.retry_attempt())
            .field("base_url", &self.shared.settings.base_url.as_str())
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(
        settings: ConnectionSettings,
        tokens: Arc<dyn TokenSource>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            shared: Arc::new(Shared {
                settings,
                tokens,
                connector,
                subscribers: Subscribers::new(),
                state,
                retry_attempt: AtomicU32::new(0),
                epoch: AtomicU64::new(0),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Manager over the tokio-tungstenite connector.
    pub fn from_config(config: &ClientConfig, tokens: Arc<dyn TokenSource>) -> ClientResult<Self> {
        Ok(Self::new(
            ConnectionSettings::from_config(config)?,
            tokens,
            Arc::new(TungsteniteConnector),
        ))
    }

    pub fn subscribers(&self) -> &Subscribers {
        &self.shared.subscribers
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Consecutive reconnect attempts since the last successful open or explicit `connect()`.
    pub fn retry_attempt(&self) -> u32 {
        self.shared.retry_attempt.load(Ordering::SeqCst)
    }

    /// Stream of state changes, e.g. for a live/offline indicator.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Start connecting. Returns `false` without side effects when already connecting or open,
    /// when no usable bearer token is available, or outside a tokio runtime.
    /// During a pending retry this dials immediately instead of waiting out the delay.
    pub fn connect(&self) -> bool {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("connect() called outside a tokio runtime");
                return false;
            }
        };

        let mut worker = self.shared.lock_worker();
        let state = self.state();
        if matches!(state, ConnectionState::Connecting | ConnectionState::Open) {
            debug!(state = %state, "already connecting or open; ignoring connect()");
            return false;
        }
        if let Err(e) = self.shared.endpoint() {
            warn!(error = %e, "not connecting");
            return false;
        }

        if let Some(w) = worker.as_ref() {
            if w.cmd_tx.send(ConnCmd::ConnectNow).is_ok() {
                debug!("retry pending; dialing now");
                return true;
            }
        }

        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.retry_attempt.store(0, Ordering::SeqCst);
        self.shared.state.send_replace(ConnectionState::Connecting);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = runtime.spawn(run(self.shared.clone(), epoch, cmd_rx));
        *worker = Some(Worker {
            epoch,
            cmd_tx,
            handle,
        });
        true
    }

    /// Stop for good: cancel any pending retry and close the live socket. Idempotent.
    ///
    /// The state is `Closed` when this returns; subscribers see a `Requested` disconnect
    /// if the connection was connecting or open.
    pub fn disconnect(&self) {
        self.stop();
    }

    /// [`disconnect`](Self::disconnect), then wait for the background task to finish.
    pub async fn close(&self) {
        if let Some(handle) = self.stop() {
            if let Err(e) = handle.await {
                debug!(error = %e, "connection task ended abnormally");
            }
        }
    }

    /// Serialize and send when open. Otherwise drop with a warning and return `false`.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        if !self.is_connected() {
            warn!(state = %self.state(), "socket not open; dropping outbound message");
            return false;
        }
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "could not serialize outbound message");
                return false;
            }
        };
        let worker = self.shared.lock_worker();
        match worker.as_ref() {
            Some(w) => w.cmd_tx.send(ConnCmd::Send(text)).is_ok(),
            None => false,
        }
    }

    fn stop(&self) -> Option<JoinHandle<()>> {
        let (handle, was_live) = {
            let mut worker = self.shared.lock_worker();
            let w = worker.take()?;
            self.shared.epoch.fetch_add(1, Ordering::SeqCst);
            let _ = w.cmd_tx.send(ConnCmd::Shutdown);
            let prev = self.shared.state.send_replace(ConnectionState::Closed);
            (
                w.handle,
                matches!(prev, ConnectionState::Connecting | ConnectionState::Open),
            )
        };
        info!("disconnect requested");
        if was_live {
            self.shared
                .subscribers
                .emit_disconnect(&DisconnectReason::requested());
        }
        Some(handle)
    }
}

enum PumpExit {
    Shutdown,
    Closed(DisconnectReason),
}

async fn run(shared: Arc<Shared>, epoch: u64, mut cmd_rx: mpsc::UnboundedReceiver<ConnCmd>) {
    let policy = shared.settings.reconnect.clone();

    loop {
        let mut reason = match shared.endpoint() {
            Err(e) => policy.classify_error(&e),
            Ok(endpoint) => {
                info!(
                    endpoint = %redact(&endpoint),
                    retry_attempt = shared.retry_attempt.load(Ordering::SeqCst),
                    "connecting"
                );
                let attempt = tokio::select! {
                    result = shared.connector.connect(&endpoint) => result,
                    _ = until_shutdown(&mut cmd_rx) => return,
                };
                match attempt {
                    Ok(mut socket) => {
                        if !shared.transition(epoch, ConnectionState::Open) {
                            socket.close().await;
                            return;
                        }
                        shared.retry_attempt.store(0, Ordering::SeqCst);
                        info!("connected");
                        shared.subscribers.emit_connect();

                        match pump(&shared, epoch, &policy, socket.as_mut(), &mut cmd_rx).await {
                            PumpExit::Shutdown => {
                                socket.close().await;
                                return;
                            }
                            PumpExit::Closed(reason) => reason,
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "connection attempt failed");
                        policy.classify_error(&e)
                    }
                }
            }
        };

        let next_attempt = shared.retry_attempt.load(Ordering::SeqCst) + 1;
        let will_retry = if reason.is_terminal() || !policy.auto_reconnect {
            false
        } else if policy.allows(next_attempt) {
            true
        } else {
            reason.kind = DisconnectKind::RetriesExhausted;
            false
        };
        if will_retry {
            shared.retry_attempt.store(next_attempt, Ordering::SeqCst);
        }

        if !shared.transition(epoch, ConnectionState::Closed) {
            return;
        }
        match reason.kind {
            DisconnectKind::AuthRejected => warn!(reason = %reason, "connection rejected; not retrying"),
            DisconnectKind::RetriesExhausted => warn!(reason = %reason, "giving up reconnecting"),
            _ => info!(reason = %reason, will_retry, "disconnected"),
        }
        shared.subscribers.emit_disconnect(&reason);

        if !will_retry {
            if shared.retire(epoch, &mut cmd_rx) && shared.transition(epoch, ConnectionState::Connecting) {
                shared.retry_attempt.store(0, Ordering::SeqCst);
                continue;
            }
            return;
        }

        let delay = tokio::time::sleep(policy.delay);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                biased;
                cmd = cmd_rx.recv() => match cmd {
                    Some(ConnCmd::ConnectNow) => break,
                    Some(ConnCmd::Send(_)) => warn!("socket not open; dropping outbound message"),
                    Some(ConnCmd::Shutdown) | None => return,
                },
                _ = &mut delay => break,
            }
        }

        if !shared.transition(epoch, ConnectionState::Connecting) {
            return;
        }
        info!(attempt = next_attempt, "reconnecting");
    }
}

async fn pump(
    shared: &Shared,
    epoch: u64,
    policy: &ReconnectPolicy,
    socket: &mut dyn Socket,
    cmd_rx: &mut mpsc::UnboundedReceiver<ConnCmd>,
) -> PumpExit {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(ConnCmd::Send(text)) => {
                    if let Err(e) = socket.send_text(text).await {
                        warn!(error = %e, "send failed");
                        return PumpExit::Closed(policy.classify_error(&e));
                    }
                }
                Some(ConnCmd::ConnectNow) => {}
                Some(ConnCmd::Shutdown) | None => return PumpExit::Shutdown,
            },
            frame = socket.recv() => match frame {
                Some(Ok(Frame::Text(text))) => {
                    if !shared.is_current(epoch) {
                        return PumpExit::Shutdown;
                    }
                    match InboundMessage::parse(&text, Utc::now()) {
                        Ok(message) => {
                            trace!(kind = ?message.kind(), "message received");
                            shared.subscribers.dispatch(&message);
                        }
                        Err(e) => warn!(error = %e, "dropping malformed frame"),
                    }
                }
                Some(Ok(Frame::Close { code, reason })) => {
                    return PumpExit::Closed(policy.classify_close(code, &reason));
                }
                Some(Err(e)) => {
                    warn!(error = %e, "socket error");
                    return PumpExit::Closed(DisconnectReason::closed(
                        CLOSE_ABNORMAL,
                        "connection lost",
                        DisconnectKind::Transient,
                    ));
                }
                None => {
                    return PumpExit::Closed(DisconnectReason::closed(
                        CLOSE_ABNORMAL,
                        "connection lost",
                        DisconnectKind::Transient,
                    ));
                }
            },
        }
    }
}

async fn until_shutdown(cmd_rx: &mut mpsc::UnboundedReceiver<ConnCmd>) {
    loop {
        match cmd_rx.recv().await {
            Some(ConnCmd::Send(_)) => warn!("socket not open; dropping outbound message"),
            Some(ConnCmd::ConnectNow) => {}
            Some(ConnCmd::Shutdown) | None => return,
        }
    }
}
