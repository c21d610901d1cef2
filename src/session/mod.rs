//! One logged-in session: the shared connection plus the state fed by it.

use std::sync::Arc;

use tracing::info;

use crate::auth::TokenSource;
use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionSettings, Connector};
use crate::error::ClientResult;
use crate::services::{ActivityFeed, MessageLog, NotificationPresenter, NotificationStore, Subscription};

/// Owns the connection for the lifetime of a login. Dropping it disconnects.
pub struct LiveSession {
    manager: ConnectionManager,
    notifications: NotificationStore,
    activities: ActivityFeed,
    messages: MessageLog,
    _subscriptions: Vec<Subscription>,
}

impl LiveSession {
    /// Wire the stores to a new connection and start connecting.
    ///
    /// A missing or expired token leaves the session idle; call [`connect`](Self::connect)
    /// once the auth layer has a fresh one.
    pub fn start(
        config: &ClientConfig,
        tokens: Arc<dyn TokenSource>,
        connector: Arc<dyn Connector>,
        presenter: Arc<dyn NotificationPresenter>,
    ) -> ClientResult<Self> {
        let session = Self::new(config, tokens, connector, presenter)?;
        session.connect();
        Ok(session)
    }

    /// Wire the stores without connecting, so callers can subscribe first.
    pub fn new(
        config: &ClientConfig,
        tokens: Arc<dyn TokenSource>,
        connector: Arc<dyn Connector>,
        presenter: Arc<dyn NotificationPresenter>,
    ) -> ClientResult<Self> {
        let manager = ConnectionManager::new(ConnectionSettings::from_config(config)?, tokens, connector);
        let notifications = NotificationStore::new(presenter, config.sound);
        let activities = ActivityFeed::new(config.activity_capacity);
        let messages = MessageLog::new(config.message_log_capacity);

        let subscribers = manager.subscribers();
        let subscriptions = vec![
            notifications.attach(subscribers),
            activities.attach(subscribers),
            messages.attach(subscribers),
        ];

        Ok(Self {
            manager,
            notifications,
            activities,
            messages,
            _subscriptions: subscriptions,
        })
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn notifications(&self) -> &NotificationStore {
        &self.notifications
    }

    pub fn activities(&self) -> &ActivityFeed {
        &self.activities
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    /// Live indicator.
    pub fn is_live(&self) -> bool {
        self.manager.is_connected()
    }

    /// Start connecting, or connect again after a terminal close (e.g. once a token was
    /// refreshed). See [`ConnectionManager::connect`].
    pub fn connect(&self) -> bool {
        self.manager.connect()
    }

    /// Logout: close the socket and wait for the connection task to end.
    pub async fn shutdown(self) {
        info!("ending live session");
        self.manager.close().await;
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.manager.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SharedToken;
    use crate::connection::{ConnectionState, TungsteniteConnector};
    use crate::services::LogPresenter;

    #[tokio::test]
    async fn without_token_session_stays_idle() {
        let tokens = SharedToken::default();
        let session = LiveSession::start(
            &ClientConfig::default(),
            Arc::new(tokens),
            Arc::new(TungsteniteConnector),
            Arc::new(LogPresenter),
        )
        .unwrap();

        assert_eq!(session.manager().state(), ConnectionState::Idle);
        assert!(!session.is_live());
        assert!(session.notifications().is_empty());
        assert_eq!(session.activities().capacity(), 10);
        assert_eq!(session.messages().capacity(), 50);
        assert_eq!(session.manager().subscribers().count(crate::services::Topic::Message), 2);
        session.shutdown().await;
    }

    struct RejectingConnector;

    #[async_trait::async_trait]
    impl Connector for RejectingConnector {
        async fn connect(&self, _endpoint: &url::Url) -> ClientResult<Box<dyn crate::connection::Socket>> {
            Err(crate::error::ClientError::Handshake { status: 401 })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn subscribers_registered_before_connect_see_first_rejection() {
        let session = LiveSession::new(
            &ClientConfig::default(),
            Arc::new(crate::auth::StaticToken::new("t")),
            Arc::new(RejectingConnector),
            Arc::new(LogPresenter),
        )
        .unwrap();
        assert_eq!(session.manager().state(), ConnectionState::Idle);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _sub = session.manager().subscribers().on_disconnect(move |reason| {
            let _ = tx.send(reason.clone());
        });
        assert!(session.connect());

        let reason = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason.kind, crate::connection::DisconnectKind::AuthRejected);
        assert_eq!(reason.code, Some(401));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn dropping_session_releases_subscribers() {
        let session = LiveSession::start(
            &ClientConfig::default(),
            Arc::new(SharedToken::default()),
            Arc::new(TungsteniteConnector),
            Arc::new(LogPresenter),
        )
        .unwrap();
        let subscribers = session.manager().subscribers().clone();
        drop(session);
        assert_eq!(subscribers.count(crate::services::Topic::Activity), 0);
    }
}
