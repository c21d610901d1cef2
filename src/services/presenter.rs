//! Side-effect presentation of new notifications: toasts and audio cues.

use tracing::{error, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::models::{Notification, Severity};

/// Shows a notification the moment it arrives.
///
/// Audio is best effort: an `Err` from [`play_sound`](NotificationPresenter::play_sound)
/// is logged and the notification is still delivered.
pub trait NotificationPresenter: Send + Sync {
    fn toast(&self, notification: &Notification);

    fn play_sound(&self, severity: Severity) -> ClientResult<()>;
}

/// Presenter that writes toasts to the log. Has no audio device.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPresenter;

impl NotificationPresenter for LogPresenter {
    fn toast(&self, n: &Notification) {
        match n.severity {
            Severity::Error => error!(id = %n.id, title = %n.title, "{}", n.message),
            Severity::Warning => warn!(id = %n.id, title = %n.title, "{}", n.message),
            Severity::Info | Severity::Success => {
                info!(id = %n.id, severity = %n.severity, title = %n.title, "{}", n.message)
            }
        }
    }

    fn play_sound(&self, _severity: Severity) -> ClientResult<()> {
        Err(ClientError::Presentation("no audio output".to_string()))
    }
}
