//! Notification center state: newest-first list with read/unread tracking.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::models::{
    MessagePayload, NewNotification, Notification, NotificationSnapshot, SoundPolicy,
};
use crate::services::presenter::NotificationPresenter;
use crate::services::subscribers::{Subscribers, Subscription};

/// In-memory notification list. Independent of connection state: it survives reconnects
/// and is only emptied by [`clear_all`](NotificationStore::clear_all) or dropping it.
#[derive(Clone)]
pub struct NotificationStore {
    notifications: Arc<RwLock<Vec<Notification>>>,
    presenter: Arc<dyn NotificationPresenter>,
    sound: SoundPolicy,
}

impl NotificationStore {
    pub fn new(presenter: Arc<dyn NotificationPresenter>, sound: SoundPolicy) -> Self {
        Self {
            notifications: Arc::new(RwLock::new(Vec::new())),
            presenter,
            sound,
        }
    }

    /// Feed `notification` messages from `subscribers` into this store.
    ///
    /// Messages with neither title nor message are ignored.
    pub fn attach(&self, subscribers: &Subscribers) -> Subscription {
        let store = self.clone();
        subscribers.on_message(move |message| {
            let MessagePayload::Notification(payload) = &message.payload else {
                return;
            };
            if payload.is_empty() {
                debug!("ignoring empty notification");
                return;
            }
            store.add_notification(NewNotification {
                title: payload
                    .title
                    .clone()
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| "Notification".to_string()),
                message: payload.message.clone().unwrap_or_default(),
                severity: payload.severity(),
            });
        })
    }

    /// Prepend a new unread notification, then toast it and maybe play a sound.
    #[instrument(skip(self, new), fields(severity = %new.severity))]
    pub fn add_notification(&self, new: NewNotification) -> Notification {
        let notification = Notification::from_new(new, Utc::now());
        self.write().insert(0, notification.clone());
        info!(id = %notification.id, "notification added");

        self.presenter.toast(&notification);
        if self.sound.should_play(notification.severity) {
            if let Err(e) = self.presenter.play_sound(notification.severity) {
                debug!(error = %e, "audio cue skipped");
            }
        }
        notification
    }

    /// Returns `false` when no notification has `id`.
    pub fn mark_as_read(&self, id: Uuid) -> bool {
        let mut list = self.write();
        match list.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_as_read(&self) {
        for n in self.write().iter_mut() {
            n.read = true;
        }
    }

    pub fn clear_all(&self) {
        self.write().clear();
    }

    pub fn unread_count(&self) -> usize {
        self.read().iter().filter(|n| !n.read).count()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.read().clone()
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        let list = self.read();
        NotificationSnapshot {
            unread_count: list.iter().filter(|n| !n.read).count(),
            notifications: list.clone(),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Notification>> {
        self.notifications.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Notification>> {
        self.notifications.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{ClientError, ClientResult};
    use crate::models::{InboundMessage, Severity};
    use std::sync::Mutex;

    /// Records every toast and sound request; sound always fails.
    #[derive(Default)]
    pub(crate) struct RecordingPresenter {
        pub toasts: Mutex<Vec<(Severity, String)>>,
        pub sounds: Mutex<Vec<Severity>>,
    }

    impl NotificationPresenter for RecordingPresenter {
        fn toast(&self, n: &Notification) {
            self.toasts
                .lock()
                .unwrap()
                .push((n.severity, n.message.clone()));
        }

        fn play_sound(&self, severity: Severity) -> ClientResult<()> {
            self.sounds.lock().unwrap().push(severity);
            Err(ClientError::Presentation("autoplay blocked".to_string()))
        }
    }

    fn store() -> (NotificationStore, Arc<RecordingPresenter>) {
        let presenter = Arc::new(RecordingPresenter::default());
        (
            NotificationStore::new(presenter.clone(), SoundPolicy::HighPriority),
            presenter,
        )
    }

    #[test]
    fn unread_count_tracks_every_add() {
        let (store, _) = store();
        for i in 0..5 {
            store.add_notification(NewNotification::new(format!("n{i}"), "", Severity::Info));
            let snapshot = store.snapshot();
            assert_eq!(
                snapshot.unread_count,
                snapshot.notifications.iter().filter(|n| !n.read).count()
            );
            assert_eq!(store.unread_count(), i + 1);
        }
    }

    #[test]
    fn newest_first() {
        let (store, _) = store();
        store.add_notification(NewNotification::new("first", "", Severity::Info));
        store.add_notification(NewNotification::new("second", "", Severity::Info));
        let titles: Vec<_> = store.notifications().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["second", "first"]);
    }

    #[test]
    fn mark_as_read_and_mark_all() {
        let (store, _) = store();
        let a = store.add_notification(NewNotification::new("a", "", Severity::Info));
        store.add_notification(NewNotification::new("b", "", Severity::Info));

        assert!(store.mark_as_read(a.id));
        assert_eq!(store.unread_count(), 1);
        assert!(!store.mark_as_read(Uuid::new_v4()));

        store.mark_all_as_read();
        assert_eq!(store.unread_count(), 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn clear_all_then_add_yields_one() {
        let (store, _) = store();
        store.add_notification(NewNotification::new("a", "", Severity::Info));
        store.add_notification(NewNotification::new("b", "", Severity::Info));
        store.clear_all();
        assert!(store.is_empty());

        store.add_notification(NewNotification::new("c", "", Severity::Info));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn failed_audio_still_delivers() {
        let (store, presenter) = store();
        store.add_notification(NewNotification::new("boom", "bot crashed", Severity::Error));
        store.add_notification(NewNotification::new("ok", "sent", Severity::Success));

        assert_eq!(store.len(), 2);
        assert_eq!(presenter.toasts.lock().unwrap().len(), 2);
        // success is not high priority, so only the error asked for audio
        assert_eq!(*presenter.sounds.lock().unwrap(), vec![Severity::Error]);
    }

    #[test]
    fn attach_converts_notification_messages() {
        let (store, presenter) = store();
        let subscribers = Subscribers::new();
        let _sub = store.attach(&subscribers);

        let msg = InboundMessage::parse(
            r#"{"type":"notification","data":{"title":"Job Application Sent","message":"Applied to Acme","type":"success"}}"#,
            Utc::now(),
        )
        .unwrap();
        subscribers.emit_message(&msg);
        let empty =
            InboundMessage::parse(r#"{"type":"notification","data":{}}"#, Utc::now()).unwrap();
        subscribers.emit_message(&empty);
        let status = InboundMessage::parse(r#"{"type":"status","data":{}}"#, Utc::now()).unwrap();
        subscribers.emit_message(&status);

        assert_eq!(store.len(), 1);
        assert_eq!(store.unread_count(), 1);
        assert_eq!(
            presenter.toasts.lock().unwrap()[0],
            (Severity::Success, "Applied to Acme".to_string())
        );
    }
}
