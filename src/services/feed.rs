//! Bounded newest-first feeds for the activity panel and the live message log.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use crate::models::{Activity, InboundMessage};
use crate::services::subscribers::{Subscribers, Subscription};

/// Keeps the most recent `capacity` items; pushing past capacity drops the oldest.
#[derive(Debug, Clone)]
pub struct RecentFeed<T> {
    items: Arc<RwLock<VecDeque<T>>>,
    capacity: usize,
}

pub type ActivityFeed = RecentFeed<Activity>;
pub type MessageLog = RecentFeed<InboundMessage>;

impl<T: Clone> RecentFeed<T> {
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, item: T) {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        items.push_front(item);
        items.truncate(self.capacity);
    }

    /// Newest first.
    pub fn items(&self) -> Vec<T> {
        self.items
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn latest(&self) -> Option<T> {
        self.items
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .front()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.items.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl RecentFeed<Activity> {
    pub fn attach(&self, subscribers: &Subscribers) -> Subscription {
        let feed = self.clone();
        subscribers.on_activity(move |activity| feed.push(activity.clone()))
    }
}

impl RecentFeed<InboundMessage> {
    pub fn attach(&self, subscribers: &Subscribers) -> Subscription {
        let feed = self.clone();
        subscribers.on_message(move |message| feed.push(message.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn overflow_drops_oldest() {
        let feed = RecentFeed::new(3);
        for i in 0..5 {
            feed.push(i);
        }
        assert_eq!(feed.items(), vec![4, 3, 2]);
        assert_eq!(feed.latest(), Some(4));
    }

    #[test]
    fn zero_capacity_keeps_one() {
        let feed = RecentFeed::new(0);
        feed.push("a");
        feed.push("b");
        assert_eq!(feed.items(), vec!["b"]);
        assert_eq!(feed.capacity(), 1);
    }

    #[test]
    fn activity_feed_keeps_arrival_order_newest_first() {
        let subscribers = Subscribers::new();
        let feed = ActivityFeed::new(10);
        let _sub = feed.attach(&subscribers);

        for title in ["one", "two", "three"] {
            let text = format!(r#"{{"type":"activity","data":{{"title":"{title}"}}}}"#);
            subscribers.dispatch(&InboundMessage::parse(&text, Utc::now()).unwrap());
        }

        let titles: Vec<_> = feed.items().into_iter().map(|a| a.title).collect();
        assert_eq!(titles, vec!["three", "two", "one"]);
    }

    #[test]
    fn message_log_sees_every_kind() {
        let subscribers = Subscribers::new();
        let log = MessageLog::new(50);
        let _sub = log.attach(&subscribers);

        subscribers.dispatch(&InboundMessage::parse(r#"{"type":"status","data":{}}"#, Utc::now()).unwrap());
        subscribers.dispatch(
            &InboundMessage::parse(r#"{"type":"error","data":{"message":"x"}}"#, Utc::now()).unwrap(),
        );

        assert_eq!(log.len(), 2);
        log.clear();
        assert!(log.is_empty());
    }
}
