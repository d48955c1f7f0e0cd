//! Lock store: authoritative lock records and the lifecycle state machine
//!
//! Every status change goes through [`LockStore::transition`], which checks
//! the edge against [`LockStatus::can_transition_to`] and appends a history
//! record in the same step. The store knows nothing about scheduling or
//! listeners; the engine keeps those consistent around it.

use crate::config::EngineConfig;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use temporal_lock_types::{
    EventBoundLockRequest, EventBoundTerms, EventCondition, HistoryOperation, HistoryRecord,
    HybridLockRequest, HybridTerms, Lock, LockAction, LockError, LockFilter, LockId, LockResult,
    LockStatistics, LockStatus, LockTerms, LockTimestamps, Parameters, TimeBoundLockRequest,
    TimeBoundTerms,
};
use tracing::{debug, info};

/// Policy maxima enforced on creation and extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockBounds {
    pub max_duration_seconds: u64,
    pub max_timeout_seconds: u64,
    pub max_events_per_lock: usize,
}

impl From<&EngineConfig> for LockBounds {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_duration_seconds: config.max_duration_seconds,
            max_timeout_seconds: config.max_timeout_seconds,
            max_events_per_lock: config.max_events_per_lock,
        }
    }
}

impl LockBounds {
    fn check_duration(&self, duration_seconds: u64) -> LockResult<()> {
        if duration_seconds > self.max_duration_seconds {
            return Err(LockError::BoundsExceeded {
                field: "duration_seconds",
                value: duration_seconds,
                max: self.max_duration_seconds,
            });
        }
        Ok(())
    }

    fn check_timeout(&self, timeout_seconds: u64) -> LockResult<()> {
        if timeout_seconds > self.max_timeout_seconds {
            return Err(LockError::BoundsExceeded {
                field: "timeout_seconds",
                value: timeout_seconds,
                max: self.max_timeout_seconds,
            });
        }
        Ok(())
    }

    fn check_conditions(&self, conditions: &[EventCondition]) -> LockResult<()> {
        if conditions.len() > self.max_events_per_lock {
            return Err(LockError::BoundsExceeded {
                field: "event_conditions",
                value: conditions.len() as u64,
                max: self.max_events_per_lock as u64,
            });
        }
        if conditions.is_empty() {
            return Err(LockError::InvalidParameters(
                "event-bound locks require at least one event condition".into(),
            ));
        }
        if conditions.iter().any(|c| c.event_type.trim().is_empty()) {
            return Err(LockError::InvalidParameters(
                "event condition has an empty event_type".into(),
            ));
        }
        Ok(())
    }
}

/// Owns every lock record and its history.
#[derive(Debug)]
pub struct LockStore {
    locks: HashMap<LockId, Lock>,
    by_capsule: HashMap<String, Vec<LockId>>,
    history: HashMap<LockId, Vec<HistoryRecord>>,
    bounds: LockBounds,
}

impl LockStore {
    pub fn new(bounds: LockBounds) -> Self {
        Self {
            locks: HashMap::new(),
            by_capsule: HashMap::new(),
            history: HashMap::new(),
            bounds,
        }
    }

    pub fn bounds(&self) -> &LockBounds {
        &self.bounds
    }

    // ── Creation ─────────────────────────────────────────────────────

    pub fn create_time_bound(
        &mut self,
        request: TimeBoundLockRequest,
        now: DateTime<Utc>,
    ) -> LockResult<Lock> {
        validate_capsule(&request.capsule_id)?;
        self.bounds.check_duration(request.duration_seconds)?;
        let expiration_at = deadline_after(now, request.duration_seconds, "duration_seconds")?;

        let terms = LockTerms::TimeBound(TimeBoundTerms {
            duration_seconds: request.duration_seconds,
            expiration_at,
        });

        Ok(self.insert(
            request.capsule_id,
            terms,
            request.expiration_action,
            None,
            request.metadata,
            now,
        ))
    }

    pub fn create_event_bound(
        &mut self,
        request: EventBoundLockRequest,
        now: DateTime<Utc>,
    ) -> LockResult<Lock> {
        validate_capsule(&request.capsule_id)?;
        self.bounds.check_timeout(request.timeout_seconds)?;
        self.bounds.check_conditions(&request.conditions)?;
        let timeout_at = deadline_after(now, request.timeout_seconds, "timeout_seconds")?;

        let terms = LockTerms::EventBound(EventBoundTerms {
            conditions: request.conditions,
            timeout_seconds: request.timeout_seconds,
            timeout_at,
        });

        Ok(self.insert(
            request.capsule_id,
            terms,
            request.expiration_action,
            request.trigger_action,
            request.metadata,
            now,
        ))
    }

    pub fn create_hybrid(
        &mut self,
        request: HybridLockRequest,
        now: DateTime<Utc>,
    ) -> LockResult<Lock> {
        validate_capsule(&request.capsule_id)?;
        self.bounds.check_duration(request.duration_seconds)?;
        self.bounds.check_timeout(request.timeout_seconds)?;
        self.bounds.check_conditions(&request.conditions)?;
        let expiration_at = deadline_after(now, request.duration_seconds, "duration_seconds")?;
        let timeout_at = deadline_after(now, request.timeout_seconds, "timeout_seconds")?;

        let terms = LockTerms::Hybrid(HybridTerms {
            duration_seconds: request.duration_seconds,
            expiration_at,
            conditions: request.conditions,
            timeout_seconds: request.timeout_seconds,
            timeout_at,
        });

        Ok(self.insert(
            request.capsule_id,
            terms,
            request.expiration_action,
            request.trigger_action,
            request.metadata,
            now,
        ))
    }

    fn insert(
        &mut self,
        capsule_id: String,
        terms: LockTerms,
        expiration_action: Option<LockAction>,
        trigger_action: Option<LockAction>,
        metadata: std::collections::BTreeMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Lock {
        let lock = Lock {
            lock_id: LockId::generate(),
            capsule_id,
            terms,
            status: LockStatus::Pending,
            created_at: now,
            expiration_action,
            trigger_action,
            expiration_action_executed: false,
            trigger_action_executed: false,
            privileges: Default::default(),
            metadata,
            timestamps: LockTimestamps::default(),
        };

        let mut params = Parameters::new();
        params.insert("kind".into(), json!(lock.kind().as_str()));
        params.insert("capsule_id".into(), json!(lock.capsule_id));

        self.by_capsule
            .entry(lock.capsule_id.clone())
            .or_default()
            .push(lock.lock_id);
        self.locks.insert(lock.lock_id, lock.clone());
        self.record(lock.lock_id, HistoryOperation::Created, params, now);

        info!(
            lock_id = %lock.lock_id,
            capsule_id = %lock.capsule_id,
            kind = %lock.kind(),
            "Lock created"
        );

        lock
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    pub fn activate(&mut self, lock_id: &LockId, now: DateTime<Utc>) -> LockResult<Lock> {
        self.transition(lock_id, LockStatus::Active, "activate", Parameters::new(), now)
    }

    pub fn deactivate(&mut self, lock_id: &LockId, now: DateTime<Utc>) -> LockResult<Lock> {
        self.transition(lock_id, LockStatus::Pending, "deactivate", Parameters::new(), now)
    }

    pub fn cancel(&mut self, lock_id: &LockId, now: DateTime<Utc>) -> LockResult<Lock> {
        self.transition(lock_id, LockStatus::Canceled, "cancel", Parameters::new(), now)
    }

    pub fn expire(
        &mut self,
        lock_id: &LockId,
        params: Parameters,
        now: DateTime<Utc>,
    ) -> LockResult<Lock> {
        self.transition(lock_id, LockStatus::Expired, "expire", params, now)
    }

    pub fn trigger(
        &mut self,
        lock_id: &LockId,
        params: Parameters,
        now: DateTime<Utc>,
    ) -> LockResult<Lock> {
        self.transition(lock_id, LockStatus::Triggered, "trigger", params, now)
    }

    /// Move a lock along one edge of the lifecycle table.
    ///
    /// On rejection the lock is left untouched.
    pub fn transition(
        &mut self,
        lock_id: &LockId,
        to: LockStatus,
        action: &'static str,
        params: Parameters,
        now: DateTime<Utc>,
    ) -> LockResult<Lock> {
        let lock = self
            .locks
            .get_mut(lock_id)
            .ok_or(LockError::LockNotFound(*lock_id))?;

        let from = lock.status;
        if !from.can_transition_to(to) {
            return Err(LockError::InvalidTransition {
                lock_id: *lock_id,
                from,
                action,
            });
        }

        lock.status = to;
        let operation = match to {
            LockStatus::Active => {
                lock.timestamps.activated_at = Some(now);
                HistoryOperation::Activated
            }
            LockStatus::Pending => {
                lock.timestamps.deactivated_at = Some(now);
                HistoryOperation::Deactivated
            }
            LockStatus::Expired => {
                lock.timestamps.expired_at = Some(now);
                HistoryOperation::Expired
            }
            LockStatus::Triggered => {
                lock.timestamps.triggered_at = Some(now);
                HistoryOperation::Triggered
            }
            LockStatus::Canceled => {
                lock.timestamps.canceled_at = Some(now);
                HistoryOperation::Canceled
            }
        };
        let snapshot = lock.clone();

        self.record(*lock_id, operation, params, now);

        info!(
            lock_id = %lock_id,
            capsule_id = %snapshot.capsule_id,
            from = %from,
            to = %to,
            "Lock transitioned"
        );

        Ok(snapshot)
    }

    /// Push a lock's expiration deadline later by `additional_seconds`.
    pub fn extend(
        &mut self,
        lock_id: &LockId,
        additional_seconds: u64,
        now: DateTime<Utc>,
    ) -> LockResult<Lock> {
        let bounds = self.bounds;
        let lock = self
            .locks
            .get_mut(lock_id)
            .ok_or(LockError::LockNotFound(*lock_id))?;

        let current = match lock.terms.duration_seconds() {
            Some(d) if !lock.status.is_terminal() => d,
            _ => {
                return Err(LockError::InvalidTransition {
                    lock_id: *lock_id,
                    from: lock.status,
                    action: "extend",
                })
            }
        };

        let total = current.saturating_add(additional_seconds);
        bounds.check_duration(total)?;
        let expiration_at = deadline_after(lock.created_at, total, "duration_seconds")?;
        lock.terms.set_expiration(total, expiration_at);
        let snapshot = lock.clone();

        let mut params = Parameters::new();
        params.insert("additional_seconds".into(), json!(additional_seconds));
        params.insert("expiration_at".into(), json!(expiration_at));
        self.record(*lock_id, HistoryOperation::Extended, params, now);

        debug!(lock_id = %lock_id, %expiration_at, "Lock extended");
        Ok(snapshot)
    }

    // ── Access ───────────────────────────────────────────────────────

    pub fn get(&self, lock_id: &LockId) -> LockResult<&Lock> {
        self.locks
            .get(lock_id)
            .ok_or(LockError::LockNotFound(*lock_id))
    }

    pub fn get_mut(&mut self, lock_id: &LockId) -> LockResult<&mut Lock> {
        self.locks
            .get_mut(lock_id)
            .ok_or(LockError::LockNotFound(*lock_id))
    }

    pub fn contains_capsule(&self, capsule_id: &str) -> bool {
        self.by_capsule.contains_key(capsule_id)
    }

    /// Locks of a capsule in creation order.
    pub fn locks_for_capsule(&self, capsule_id: &str) -> Vec<&Lock> {
        self.by_capsule
            .get(capsule_id)
            .map(|ids| ids.iter().filter_map(|id| self.locks.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn list(&self, filter: &LockFilter) -> Vec<Lock> {
        let mut locks: Vec<_> = self
            .locks
            .values()
            .filter(|lock| filter.matches(lock))
            .cloned()
            .collect();
        locks.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.lock_id.cmp(&b.lock_id))
        });
        locks
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    // ── History ──────────────────────────────────────────────────────

    /// Append a history record for `lock_id`.
    pub fn record(
        &mut self,
        lock_id: LockId,
        operation: HistoryOperation,
        parameters: Parameters,
        now: DateTime<Utc>,
    ) -> HistoryRecord {
        let record = HistoryRecord::new(lock_id, operation, parameters, now);
        self.history.entry(lock_id).or_default().push(record.clone());
        record
    }

    pub fn history(&self, lock_id: &LockId) -> LockResult<&[HistoryRecord]> {
        if !self.locks.contains_key(lock_id) {
            return Err(LockError::LockNotFound(*lock_id));
        }
        Ok(self
            .history
            .get(lock_id)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    /// Counts by status and kind. Scheduler and listener counts are left
    /// for the caller to fill.
    pub fn statistics(&self) -> LockStatistics {
        let mut stats = LockStatistics {
            total_locks: self.locks.len(),
            history_records: self.history.values().map(Vec::len).sum(),
            ..Default::default()
        };
        for lock in self.locks.values() {
            *stats
                .by_status
                .entry(lock.status.as_str().to_string())
                .or_insert(0) += 1;
            *stats
                .by_kind
                .entry(lock.kind().as_str().to_string())
                .or_insert(0) += 1;
        }
        stats
    }
}

fn validate_capsule(capsule_id: &str) -> LockResult<()> {
    if capsule_id.trim().is_empty() {
        return Err(LockError::InvalidParameters(
            "capsule_id must not be empty".into(),
        ));
    }
    Ok(())
}

/// `start + seconds`, or `BoundsExceeded` when the instant is unrepresentable.
fn deadline_after(
    start: DateTime<Utc>,
    seconds: u64,
    field: &'static str,
) -> LockResult<DateTime<Utc>> {
    let overflow = || LockError::BoundsExceeded {
        field,
        value: seconds,
        max: (i64::MAX / 1000) as u64,
    };
    let secs = i64::try_from(seconds).map_err(|_| overflow())?;
    let delta = Duration::try_seconds(secs).ok_or_else(overflow)?;
    start.checked_add_signed(delta).ok_or_else(overflow)
}
