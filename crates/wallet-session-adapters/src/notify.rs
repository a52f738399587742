use std::sync::{Arc, Mutex};

use wallet_session_core::{Notification, NotificationSink, NotifyLevel};

/// Routes notifications into the log.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotifyLevel::Success | NotifyLevel::Info => {
                tracing::info!(level = ?notification.level, "{}", notification.message)
            }
            NotifyLevel::Error => tracing::warn!("{}", notification.message),
        }
    }
}

/// Buffers notifications until a UI (or test) drains them.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    inner: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryNotifier {
    pub fn drain(&self) -> Vec<Notification> {
        match self.inner.lock() {
            Ok(mut g) => std::mem::take(&mut *g),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        match self.inner.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl NotificationSink for MemoryNotifier {
    fn notify(&self, notification: Notification) {
        tracing::debug!(level = ?notification.level, message = %notification.message, "notification");
        match self.inner.lock() {
            Ok(mut g) => g.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}
