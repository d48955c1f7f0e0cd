//! Fire-and-forget notification channel

use chrono::{DateTime, Utc};
use serde_json::Value;
use temporal_lock_types::{Lock, LockNotification, NotificationKind};
use tokio::sync::broadcast;
use tracing::trace;

/// Broadcasts lock signals. Publishing never blocks and never fails the
/// caller; slow subscribers lag and drop messages.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<LockNotification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LockNotification> {
        self.tx.subscribe()
    }

    pub fn publish(&self, lock: &Lock, kind: NotificationKind, payload: Value, at: DateTime<Utc>) {
        let notification = LockNotification {
            lock_id: lock.lock_id,
            capsule_id: lock.capsule_id.clone(),
            kind,
            at,
            payload,
        };
        // no subscribers is fine
        let delivered = self.tx.send(notification).unwrap_or(0);
        trace!(lock_id = %lock.lock_id, ?kind, delivered, "Notification published");
    }
}
