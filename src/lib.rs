//! Real-time notification client for the job-application dashboard.
//!
//! One shared WebSocket per session, authenticated with the bearer token, delivering
//! typed events (notifications, activities, status, errors) to any number of subscribers.
//! Notifications land in a read/unread store; activities in a short newest-first feed.

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod models;
pub mod services;
pub mod session;

pub use config::ClientConfig;
pub use connection::{
    ConnectionManager, ConnectionState, DisconnectKind, DisconnectReason, ReconnectPolicy,
};
pub use error::{ClientError, ClientResult};
pub use services::{NotificationStore, Subscribers, Subscription};
pub use session::LiveSession;
