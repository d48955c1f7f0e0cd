//! The lock record, its kinds and its lifecycle status

use crate::action::LockAction;
use crate::condition::EventCondition;
use crate::ids::LockId;
use crate::operation::DeadlineKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Which family of contract a lock belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    TimeBound,
    EventBound,
    Hybrid,
}

impl LockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimeBound => "time_bound",
            Self::EventBound => "event_bound",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a lock.
///
/// `Expired`, `Triggered` and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    Pending,
    Active,
    Expired,
    Triggered,
    Canceled,
}

impl LockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Triggered => "triggered",
            Self::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Triggered | Self::Canceled)
    }

    /// Whether `self -> next` is an edge of the lifecycle table.
    ///
    /// Deadline expiry is accepted from `Pending` as well as `Active`: the
    /// scheduler re-validates either status before expiring a lock.
    pub fn can_transition_to(&self, next: LockStatus) -> bool {
        use LockStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Active, Pending)
                | (Pending, Canceled)
                | (Active, Canceled)
                | (Pending, Expired)
                | (Active, Expired)
                | (Pending, Triggered)
                | (Active, Triggered)
        )
    }
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terms of a time-bound lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBoundTerms {
    pub duration_seconds: u64,
    pub expiration_at: DateTime<Utc>,
}

/// Terms of an event-bound lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBoundTerms {
    pub conditions: Vec<EventCondition>,
    pub timeout_seconds: u64,
    pub timeout_at: DateTime<Utc>,
}

/// Terms of a hybrid lock: a deadline plus event conditions with a timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridTerms {
    pub duration_seconds: u64,
    pub expiration_at: DateTime<Utc>,
    pub conditions: Vec<EventCondition>,
    pub timeout_seconds: u64,
    pub timeout_at: DateTime<Utc>,
}

/// Kind-specific terms. Each variant carries only the fields valid for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LockTerms {
    TimeBound(TimeBoundTerms),
    EventBound(EventBoundTerms),
    Hybrid(HybridTerms),
}

impl LockTerms {
    pub fn kind(&self) -> LockKind {
        match self {
            Self::TimeBound(_) => LockKind::TimeBound,
            Self::EventBound(_) => LockKind::EventBound,
            Self::Hybrid(_) => LockKind::Hybrid,
        }
    }

    pub fn expiration_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::TimeBound(t) => Some(t.expiration_at),
            Self::Hybrid(t) => Some(t.expiration_at),
            Self::EventBound(_) => None,
        }
    }

    pub fn timeout_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::EventBound(t) => Some(t.timeout_at),
            Self::Hybrid(t) => Some(t.timeout_at),
            Self::TimeBound(_) => None,
        }
    }

    pub fn duration_seconds(&self) -> Option<u64> {
        match self {
            Self::TimeBound(t) => Some(t.duration_seconds),
            Self::Hybrid(t) => Some(t.duration_seconds),
            Self::EventBound(_) => None,
        }
    }

    pub fn conditions(&self) -> &[EventCondition] {
        match self {
            Self::EventBound(t) => &t.conditions,
            Self::Hybrid(t) => &t.conditions,
            Self::TimeBound(_) => &[],
        }
    }

    pub fn deadline(&self, kind: DeadlineKind) -> Option<DateTime<Utc>> {
        match kind {
            DeadlineKind::Expiration => self.expiration_at(),
            DeadlineKind::Timeout => self.timeout_at(),
        }
    }

    /// Deadlines this lock carries, in the order they are scheduled.
    pub fn deadlines(&self) -> Vec<(DeadlineKind, DateTime<Utc>)> {
        let mut out = Vec::with_capacity(2);
        if let Some(at) = self.expiration_at() {
            out.push((DeadlineKind::Expiration, at));
        }
        if let Some(at) = self.timeout_at() {
            out.push((DeadlineKind::Timeout, at));
        }
        out
    }

    /// Earliest deadline that has passed at `now`, if any. Either deadline
    /// expires the lock once the scheduler sees it.
    pub fn elapsed_deadline(&self, now: DateTime<Utc>) -> Option<(DeadlineKind, DateTime<Utc>)> {
        self.deadlines()
            .into_iter()
            .filter(|(_, at)| *at <= now)
            .min_by_key(|(_, at)| *at)
    }

    /// Replace the expiration deadline. Returns `false` for kinds without one.
    pub fn set_expiration(&mut self, duration_seconds: u64, expiration_at: DateTime<Utc>) -> bool {
        match self {
            Self::TimeBound(t) => {
                t.duration_seconds = duration_seconds;
                t.expiration_at = expiration_at;
                true
            }
            Self::Hybrid(t) => {
                t.duration_seconds = duration_seconds;
                t.expiration_at = expiration_at;
                true
            }
            Self::EventBound(_) => false,
        }
    }
}

/// Point-in-time stamps written by transitions and operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockTimestamps {
    pub activated_at: Option<DateTime<Utc>>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub unlocked_at: Option<DateTime<Utc>>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub deescalated_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
}

/// A temporal or event contract attached to a capsule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lock {
    pub lock_id: LockId,
    pub capsule_id: String,
    pub terms: LockTerms,
    pub status: LockStatus,
    pub created_at: DateTime<Utc>,
    pub expiration_action: Option<LockAction>,
    pub trigger_action: Option<LockAction>,
    pub expiration_action_executed: bool,
    pub trigger_action_executed: bool,
    /// Privilege name -> level. Only escalation adds entries.
    pub privileges: BTreeMap<String, String>,
    /// Caller-owned bag; never interpreted by the engine.
    pub metadata: BTreeMap<String, Value>,
    pub timestamps: LockTimestamps,
}

impl Lock {
    pub fn kind(&self) -> LockKind {
        self.terms.kind()
    }

    pub fn expiration_at(&self) -> Option<DateTime<Utc>> {
        self.terms.expiration_at()
    }

    pub fn timeout_at(&self) -> Option<DateTime<Utc>> {
        self.terms.timeout_at()
    }

    pub fn conditions(&self) -> &[EventCondition] {
        self.terms.conditions()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Request to create a time-bound lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeBoundLockRequest {
    pub capsule_id: String,
    pub duration_seconds: u64,
    #[serde(default)]
    pub expiration_action: Option<LockAction>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl TimeBoundLockRequest {
    pub fn new(capsule_id: impl Into<String>, duration_seconds: u64) -> Self {
        Self {
            capsule_id: capsule_id.into(),
            duration_seconds,
            expiration_action: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_expiration_action(mut self, action: LockAction) -> Self {
        self.expiration_action = Some(action);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Request to create an event-bound lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBoundLockRequest {
    pub capsule_id: String,
    pub conditions: Vec<EventCondition>,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub expiration_action: Option<LockAction>,
    #[serde(default)]
    pub trigger_action: Option<LockAction>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl EventBoundLockRequest {
    pub fn new(
        capsule_id: impl Into<String>,
        conditions: Vec<EventCondition>,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            capsule_id: capsule_id.into(),
            conditions,
            timeout_seconds,
            expiration_action: None,
            trigger_action: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_expiration_action(mut self, action: LockAction) -> Self {
        self.expiration_action = Some(action);
        self
    }

    pub fn with_trigger_action(mut self, action: LockAction) -> Self {
        self.trigger_action = Some(action);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Request to create a hybrid lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridLockRequest {
    pub capsule_id: String,
    pub duration_seconds: u64,
    pub conditions: Vec<EventCondition>,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub expiration_action: Option<LockAction>,
    #[serde(default)]
    pub trigger_action: Option<LockAction>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl HybridLockRequest {
    pub fn new(
        capsule_id: impl Into<String>,
        duration_seconds: u64,
        conditions: Vec<EventCondition>,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            capsule_id: capsule_id.into(),
            duration_seconds,
            conditions,
            timeout_seconds,
            expiration_action: None,
            trigger_action: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_expiration_action(mut self, action: LockAction) -> Self {
        self.expiration_action = Some(action);
        self
    }

    pub fn with_trigger_action(mut self, action: LockAction) -> Self {
        self.trigger_action = Some(action);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Query filter for listing locks. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockFilter {
    pub capsule_id: Option<String>,
    pub status: Option<LockStatus>,
    pub kind: Option<LockKind>,
}

impl LockFilter {
    pub fn matches(&self, lock: &Lock) -> bool {
        if let Some(ref capsule_id) = self.capsule_id {
            if &lock.capsule_id != capsule_id {
                return false;
            }
        }

        if let Some(status) = self.status {
            if lock.status != status {
                return false;
            }
        }

        if let Some(kind) = self.kind {
            if lock.kind() != kind {
                return false;
            }
        }

        true
    }
}

/// Aggregate counts over the lock store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStatistics {
    pub total_locks: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_kind: BTreeMap<String, usize>,
    pub history_records: usize,
    pub pending_scheduled: usize,
    pub registered_listeners: usize,
}
