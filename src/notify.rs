//! User-visible notifications.
//!
//! DESIGN
//! ======
//! `Notifier` is an injected dispatcher: services and UI code hold a clone and
//! publish on the same broadcast channel, so nothing needs a rendering context
//! to raise a toast. `ToastTray` is the consumer side and owns the dismissal
//! policy: destructive notifications stay until dismissed, everything else
//! expires after the configured duration.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const NOTIFY_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Default,
    Success,
    Warning,
    Destructive,
}

impl Variant {
    #[must_use]
    pub fn auto_dismisses(self) -> bool {
        !matches!(self, Self::Destructive)
    }
}

/// A toast raised by a service or the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Unique id, used to dismiss the toast.
    pub id: Uuid,
    /// Short headline.
    pub title: String,
    /// One-sentence detail line.
    pub description: String,
    /// Styling and dismissal policy.
    pub variant: Variant,
}

impl Notification {
    pub fn new(title: impl Into<String>, description: impl Into<String>, variant: Variant) -> Self {
        Self { id: Uuid::new_v4(), title: title.into(), description: description.into(), variant }
    }

    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(title, description, Variant::Default)
    }

    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(title, description, Variant::Success)
    }

    pub fn warning(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(title, description, Variant::Warning)
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(title, description, Variant::Destructive)
    }
}

// =============================================================================
// DISPATCHER
// =============================================================================

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTIFY_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish a notification and return its id.
    pub fn notify(&self, notification: Notification) -> Uuid {
        tracing::debug!(
            title = %notification.title,
            variant = ?notification.variant,
            "notification"
        );
        let id = notification.id;
        let _ = self.tx.send(notification);
        id
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TOAST TRAY
// =============================================================================

/// Visible notifications with their arrival time.
pub struct ToastTray {
    toasts: Vec<(Notification, Instant)>,
    duration: Duration,
}

impl ToastTray {
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self { toasts: Vec::new(), duration }
    }

    pub fn push(&mut self, notification: Notification) {
        self.push_at(notification, Instant::now());
    }

    pub(crate) fn push_at(&mut self, notification: Notification, now: Instant) {
        self.toasts.push((notification, now));
    }

    /// Move every notification waiting on `rx` into the tray. Returns how
    /// many arrived.
    pub fn drain(&mut self, rx: &mut broadcast::Receiver<Notification>) -> usize {
        let mut arrived = 0;
        loop {
            match rx.try_recv() {
                Ok(notification) => {
                    self.push(notification);
                    arrived += 1;
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return arrived,
            }
        }
    }

    /// Remove toasts whose display time has run out and return them.
    pub fn expire(&mut self) -> Vec<Notification> {
        self.expire_at(Instant::now())
    }

    pub(crate) fn expire_at(&mut self, now: Instant) -> Vec<Notification> {
        let duration = self.duration;
        let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.toasts)
            .into_iter()
            .partition(|(n, at)| n.variant.auto_dismisses() && now.duration_since(*at) >= duration);
        self.toasts = kept;
        expired.into_iter().map(|(n, _)| n).collect()
    }

    /// Drop expired toasts and return the ones still visible.
    pub fn visible(&mut self) -> Vec<&Notification> {
        self.visible_at(Instant::now())
    }

    pub(crate) fn visible_at(&mut self, now: Instant) -> Vec<&Notification> {
        self.expire_at(now);
        self.toasts.iter().map(|(n, _)| n).collect()
    }

    /// Dismiss a toast by id. Returns `true` if it was visible.
    pub fn dismiss(&mut self, id: Uuid) -> bool {
        let before = self.toasts.len();
        self.toasts.retain(|(n, _)| n.id != id);
        self.toasts.len() != before
    }
}

#[cfg(test)]
#[path = "notify_test.rs"]
mod tests;
