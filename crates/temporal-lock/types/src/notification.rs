//! Fire-and-forget signals published by the engine

use crate::ids::LockId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Expired,
    Triggered,
    Canceled,
    Notify,
}

/// Signal broadcast to subscribers; delivery is best effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockNotification {
    pub lock_id: LockId,
    pub capsule_id: String,
    pub kind: NotificationKind,
    pub at: DateTime<Utc>,
    pub payload: Value,
}
