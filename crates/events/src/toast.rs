//! Toast notifications.
//!
//! [`NotificationService`] is created explicitly, handed to whoever needs to
//! show messages, and shut down by its owner. A background sweeper removes
//! toasts once their display time is over.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How often expired toasts are swept.
const SWEEP_INTERVAL: Duration = Duration::from_millis(250);

const CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Toast
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastLevel {
    Success,
    Info,
    Warning,
    Error,
}

impl ToastLevel {
    /// How long a toast of this level stays visible.
    pub fn display_time(self) -> Duration {
        match self {
            ToastLevel::Success | ToastLevel::Info => Duration::from_secs(3),
            ToastLevel::Warning => Duration::from_secs(4),
            ToastLevel::Error => Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toast {
    pub id: Uuid,
    pub level: ToastLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToastEvent {
    Shown(Toast),
    Dismissed(Uuid),
}

// ---------------------------------------------------------------------------
// NotificationService
// ---------------------------------------------------------------------------

pub struct NotificationService {
    active: Arc<Mutex<Vec<Toast>>>,
    sender: broadcast::Sender<ToastEvent>,
    cancel: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationService {
    /// Create the service and start its sweeper.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let active = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let sweeper = tokio::spawn(sweep(
            Arc::clone(&active),
            sender.clone(),
            cancel.clone(),
        ));
        Self {
            active,
            sender,
            cancel,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    pub fn success(&self, message: impl Into<String>) -> Uuid {
        self.show(ToastLevel::Success, message)
    }

    pub fn info(&self, message: impl Into<String>) -> Uuid {
        self.show(ToastLevel::Info, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> Uuid {
        self.show(ToastLevel::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) -> Uuid {
        self.show(ToastLevel::Error, message)
    }

    /// Queue a toast. Ignored after [`shutdown`](Self::shutdown).
    pub fn show(&self, level: ToastLevel, message: impl Into<String>) -> Uuid {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(level.display_time()).unwrap_or_default();
        let toast = Toast {
            id: Uuid::new_v4(),
            level,
            message: message.into(),
            created_at: now,
            expires_at: now + ttl,
        };
        let id = toast.id;
        if self.cancel.is_cancelled() {
            return id;
        }

        tracing::debug!(toast_id = %id, level = ?level, message = %toast.message, "Toast shown");
        lock(&self.active).push(toast.clone());
        let _ = self.sender.send(ToastEvent::Shown(toast));
        id
    }

    /// Remove a toast before it expires. Returns whether it was visible.
    pub fn dismiss(&self, id: Uuid) -> bool {
        let removed = {
            let mut active = lock(&self.active);
            let before = active.len();
            active.retain(|t| t.id != id);
            active.len() != before
        };
        if removed {
            let _ = self.sender.send(ToastEvent::Dismissed(id));
        }
        removed
    }

    /// Currently visible toasts, oldest first.
    pub fn active(&self) -> Vec<Toast> {
        lock(&self.active).clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ToastEvent> {
        self.sender.subscribe()
    }

    /// Stop the sweeper and clear every toast. Idempotent.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Toast sweeper ended abnormally");
            }
        }
        lock(&self.active).clear();
        tracing::debug!("Notification service shut down");
    }
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NotificationService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lock(active: &Mutex<Vec<Toast>>) -> std::sync::MutexGuard<'_, Vec<Toast>> {
    // Poisoning is ignored: every critical section leaves the list valid.
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn sweep(
    active: Arc<Mutex<Vec<Toast>>>,
    sender: broadcast::Sender<ToastEvent>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let now = Utc::now();
                let expired: Vec<Uuid> = {
                    let mut list = lock(&active);
                    let expired = list
                        .iter()
                        .filter(|t| t.expires_at <= now)
                        .map(|t| t.id)
                        .collect();
                    list.retain(|t| t.expires_at > now);
                    expired
                };
                for id in expired {
                    let _ = sender.send(ToastEvent::Dismissed(id));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn show_and_dismiss() {
        let service = NotificationService::new();
        let mut rx = service.subscribe();

        let id = service.warning("Generate the title first");
        assert_eq!(service.active().len(), 1);
        assert_eq!(service.active()[0].level, ToastLevel::Warning);
        assert!(matches!(rx.recv().await, Ok(ToastEvent::Shown(t)) if t.id == id));

        assert!(service.dismiss(id));
        assert!(!service.dismiss(id));
        assert!(service.active().is_empty());
        assert_eq!(rx.recv().await.ok(), Some(ToastEvent::Dismissed(id)));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_clears_and_ignores_new_toasts() {
        let service = NotificationService::new();
        service.error("Request failed");
        service.shutdown().await;
        assert!(service.active().is_empty());

        service.success("too late");
        assert!(service.active().is_empty());

        // Second shutdown is a no-op.
        service.shutdown().await;
    }

    #[tokio::test]
    async fn expired_toasts_are_swept() {
        let service = NotificationService::new();
        let mut rx = service.subscribe();
        let id = service.success("Saved");
        assert!(matches!(rx.recv().await, Ok(ToastEvent::Shown(_))));

        let dismissed = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("sweeper should dismiss within the display time");
        assert_eq!(dismissed.ok(), Some(ToastEvent::Dismissed(id)));
        assert!(service.active().is_empty());

        service.shutdown().await;
    }

    #[test]
    fn error_toasts_stay_longest() {
        assert!(ToastLevel::Error.display_time() > ToastLevel::Success.display_time());
    }
}
