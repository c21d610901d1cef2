//! Data models for inbound messages, notifications, and activities.

pub mod activity;
pub mod message;
pub mod notification;

pub use activity::*;
pub use message::*;
pub use notification::*;
