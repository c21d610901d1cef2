//! Consumers of the connection: subscriber registry, notification state, feeds.

pub mod feed;
pub mod notifications;
pub mod presenter;
pub mod subscribers;

pub use feed::{ActivityFeed, MessageLog, RecentFeed};
pub use notifications::NotificationStore;
pub use presenter::{LogPresenter, NotificationPresenter};
pub use subscribers::{Subscribers, Subscription, Topic};
