//! Subscriber registry: fan-out of connection events to independent consumers.
//!
//! Every registration returns a [`Subscription`]; dropping it deregisters the callback.
//! Callbacks run outside the registry lock and a panicking callback is isolated from the rest.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tracing::{error, trace};

use crate::connection::DisconnectReason;
use crate::models::{Activity, InboundMessage};

pub type OnMessage = dyn Fn(&InboundMessage) + Send + Sync;
pub type OnActivity = dyn Fn(&Activity) + Send + Sync;
pub type OnConnect = dyn Fn() + Send + Sync;
pub type OnDisconnect = dyn Fn(&DisconnectReason) + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Message,
    Activity,
    Connect,
    Disconnect,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Topic::Message => "message",
            Topic::Activity => "activity",
            Topic::Connect => "connect",
            Topic::Disconnect => "disconnect",
        };
        f.write_str(s)
    }
}

struct Slots<F: ?Sized> {
    entries: RwLock<Vec<(u64, Arc<F>)>>,
}

impl<F: ?Sized> Default for Slots<F> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<F: ?Sized> Slots<F> {
    fn insert(&self, id: u64, callback: Arc<F>) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, callback));
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    message: Slots<OnMessage>,
    activity: Slots<OnActivity>,
    connect: Slots<OnConnect>,
    disconnect: Slots<OnDisconnect>,
}

impl Registry {
    fn remove(&self, topic: Topic, id: u64) -> bool {
        match topic {
            Topic::Message => self.message.remove(id),
            Topic::Activity => self.activity.remove(id),
            Topic::Connect => self.connect.remove(id),
            Topic::Disconnect => self.disconnect.remove(id),
        }
    }
}

/// Shared registry of event callbacks. Cloning is cheap; clones share registrations.
#[derive(Clone, Default)]
pub struct Subscribers {
    inner: Arc<Registry>,
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("message", &self.inner.message.len())
            .field("activity", &self.inner.activity.len())
            .field("connect", &self.inner.connect.len())
            .field("disconnect", &self.inner.disconnect.len())
            .finish()
    }
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every decoded message, whatever its kind.
    pub fn on_message(&self, f: impl Fn(&InboundMessage) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id();
        self.inner.message.insert(id, Arc::new(f));
        self.handle(Topic::Message, id)
    }

    /// Activity records built from `activity` messages.
    pub fn on_activity(&self, f: impl Fn(&Activity) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id();
        self.inner.activity.insert(id, Arc::new(f));
        self.handle(Topic::Activity, id)
    }

    pub fn on_connect(&self, f: impl Fn() + Send + Sync + 'static) -> Subscription {
        let id = self.next_id();
        self.inner.connect.insert(id, Arc::new(f));
        self.handle(Topic::Connect, id)
    }

    pub fn on_disconnect(
        &self,
        f: impl Fn(&DisconnectReason) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id();
        self.inner.disconnect.insert(id, Arc::new(f));
        self.handle(Topic::Disconnect, id)
    }

    pub fn count(&self, topic: Topic) -> usize {
        match topic {
            Topic::Message => self.inner.message.len(),
            Topic::Activity => self.inner.activity.len(),
            Topic::Connect => self.inner.connect.len(),
            Topic::Disconnect => self.inner.disconnect.len(),
        }
    }

    // --- Dispatch (connection manager only) ---

    /// Message subscribers first, then activity subscribers if the message is an activity.
    pub(crate) fn dispatch(&self, message: &InboundMessage) {
        self.emit_message(message);
        if let Some(activity) = Activity::from_message(message, chrono::Utc::now()) {
            self.emit_activity(&activity);
        }
    }

    pub(crate) fn emit_message(&self, message: &InboundMessage) {
        for cb in self.inner.message.snapshot() {
            isolate(Topic::Message, || cb(message));
        }
    }

    pub(crate) fn emit_activity(&self, activity: &Activity) {
        for cb in self.inner.activity.snapshot() {
            isolate(Topic::Activity, || cb(activity));
        }
    }

    pub(crate) fn emit_connect(&self) {
        for cb in self.inner.connect.snapshot() {
            isolate(Topic::Connect, || cb());
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: &DisconnectReason) {
        for cb in self.inner.disconnect.snapshot() {
            isolate(Topic::Disconnect, || cb(reason));
        }
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn handle(&self, topic: Topic, id: u64) -> Subscription {
        trace!(topic = %topic, id, "subscribed");
        Subscription {
            topic,
            id,
            registry: Arc::downgrade(&self.inner),
            active: true,
        }
    }
}

fn isolate(topic: Topic, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        error!(topic = %topic, panic = %panic_message(&panic), "subscriber panicked");
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Disposer for one registered callback. Deregisters on drop.
#[must_use = "dropping a Subscription immediately deregisters its callback"]
pub struct Subscription {
    topic: Topic,
    id: u64,
    registry: Weak<Registry>,
    active: bool,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Deregister now. Same as dropping the handle.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    /// Keep the callback registered for as long as the registry lives.
    pub fn detach(mut self) {
        self.active = false;
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(self.topic, self.id) {
                trace!(topic = %self.topic, id = self.id, "unsubscribed");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{DisconnectKind, DisconnectReason};
    use std::sync::atomic::AtomicUsize;

    fn status_message() -> InboundMessage {
        InboundMessage::parse(r#"{"type":"status","data":{}}"#, chrono::Utc::now()).unwrap()
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&InboundMessage) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move |_: &InboundMessage| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn all_subscribers_receive_each_message() {
        let subs = Subscribers::new();
        let (a, fa) = counter();
        let (b, fb) = counter();
        let _sa = subs.on_message(fa);
        let _sb = subs.on_message(fb);

        subs.emit_message(&status_message());
        subs.emit_message(&status_message());

        assert_eq!(a.load(Ordering::SeqCst), 2);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribed_callback_is_never_invoked() {
        let subs = Subscribers::new();
        let (count, f) = counter();
        let sub = subs.on_message(f);
        sub.unsubscribe();

        subs.emit_message(&status_message());

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(subs.count(Topic::Message), 0);
    }

    #[test]
    fn dropping_handle_deregisters_but_detach_keeps() {
        let subs = Subscribers::new();
        {
            let _scoped = subs.on_connect(|| {});
        }
        assert_eq!(subs.count(Topic::Connect), 0);

        subs.on_connect(|| {}).detach();
        assert_eq!(subs.count(Topic::Connect), 1);
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let subs = Subscribers::new();
        let _bad = subs.on_message(|_| panic!("consumer bug"));
        let (count, f) = counter();
        let _good = subs.on_message(f);

        subs.emit_message(&status_message());

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callbacks_may_subscribe_during_dispatch() {
        let subs = Subscribers::new();
        let inner = subs.clone();
        let _s = subs.on_connect(move || inner.on_connect(|| {}).detach());

        subs.emit_connect();

        assert_eq!(subs.count(Topic::Connect), 2);
    }

    #[test]
    fn disconnect_reason_is_forwarded() {
        let subs = Subscribers::new();
        let seen = Arc::new(RwLock::new(None));
        let s = seen.clone();
        let _sub = subs.on_disconnect(move |reason| {
            *s.write().unwrap() = Some(reason.kind);
        });

        subs.emit_disconnect(&DisconnectReason::closed(1008, "policy", DisconnectKind::AuthRejected));

        assert_eq!(*seen.read().unwrap(), Some(DisconnectKind::AuthRejected));
    }

    #[test]
    fn activity_messages_reach_both_topics() {
        let subs = Subscribers::new();
        let (messages, f) = counter();
        let _m = subs.on_message(f);
        let activities = Arc::new(AtomicUsize::new(0));
        let a = activities.clone();
        let _a = subs.on_activity(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });

        let activity = InboundMessage::parse(
            r#"{"type":"activity","data":{"title":"Applied"}}"#,
            chrono::Utc::now(),
        )
        .unwrap();
        subs.dispatch(&activity);
        subs.dispatch(&status_message());

        assert_eq!(messages.load(Ordering::SeqCst), 2);
        assert_eq!(activities.load(Ordering::SeqCst), 1);
    }
}
