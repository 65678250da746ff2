//! Per-recipient notifications with cancellable auto-dismiss timers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use strum::Display;
use tokio::task::JoinHandle;
use utoipa::ToSchema;
use uuid::Uuid;

/// Auto-close delay for success and info notifications
pub const DEFAULT_AUTO_CLOSE: Duration = Duration::from_millis(15_000);

/// Entries kept per recipient; the oldest are evicted past this.
pub const MAX_PER_RECIPIENT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

impl Severity {
    /// Errors and warnings stay until dismissed.
    pub fn default_auto_close(self) -> Option<Duration> {
        match self {
            Self::Success | Self::Info => Some(DEFAULT_AUTO_CLOSE),
            Self::Error | Self::Warning => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_close_after_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<String, Vec<Notification>>>,
    timers: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl Inner {
    fn abort_timers(&self, ids: &[Uuid]) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            if let Some(timer) = timers.remove(id) {
                timer.abort();
            }
        }
    }

    fn remove(&self, recipient: &str, id: Uuid) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = entries.get_mut(recipient) else {
            return false;
        };
        let before = list.len();
        list.retain(|n| n.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            entries.remove(recipient);
        }
        removed
    }
}

/// Notification store shared by request handlers.
///
/// Each auto-closing notification owns one spawned timer task;
/// [`dismiss`](Self::dismiss) aborts it.
#[derive(Clone, Default)]
pub struct NotificationCenter {
    inner: Arc<Inner>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show with the severity's default auto-close.
    pub fn show(
        &self,
        recipient: &str,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Notification {
        self.show_with(recipient, title, message, severity, severity.default_auto_close())
    }

    /// Must run inside a tokio runtime when `auto_close` is set.
    pub fn show_with(
        &self,
        recipient: &str,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        auto_close: Option<Duration>,
    ) -> Notification {
        let notification = Notification {
            id: Uuid::now_v7(),
            title: title.into(),
            message: message.into(),
            severity,
            auto_close_after_ms: auto_close.map(|d| d.as_millis() as u64),
            created_at: Utc::now(),
        };

        let evicted: Vec<Uuid> = {
            let mut entries = self.inner.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let list = entries.entry(recipient.to_string()).or_default();
            list.push(notification.clone());
            let excess = list.len().saturating_sub(MAX_PER_RECIPIENT);
            list.drain(..excess).map(|n| n.id).collect()
        };
        if !evicted.is_empty() {
            tracing::debug!(recipient, count = evicted.len(), "Evicted oldest notifications");
            self.inner.abort_timers(&evicted);
        }

        if let Some(delay) = auto_close {
            let inner = Arc::clone(&self.inner);
            let recipient = recipient.to_string();
            let id = notification.id;
            let timer = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                inner.remove(&recipient, id);
                inner
                    .timers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
                tracing::trace!(notification_id = %id, "Notification expired");
            });
            self.inner
                .timers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id, timer);
        }

        notification
    }

    /// Oldest first.
    pub fn list(&self, recipient: &str) -> Vec<Notification> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(recipient)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove a notification before its timer fires.
    pub fn dismiss(&self, recipient: &str, id: Uuid) -> bool {
        let removed = self.inner.remove(recipient, id);
        if removed {
            self.inner.abort_timers(&[id]);
        }
        removed
    }

    /// Timers still pending
    pub fn pending_timers(&self) -> usize {
        self.inner
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
