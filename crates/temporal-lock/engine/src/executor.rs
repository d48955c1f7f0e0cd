//! Operation executor: lock, unlock, escalate and de-escalate effects
//!
//! Each call appends exactly one history record. Status changes made here
//! still respect the lifecycle table; terminal locks keep their status.

use crate::store::LockStore;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use temporal_lock_types::{
    privileges_from_parameters, privileges_parameters, HistoryRecord, LockError, LockId,
    LockOperation, LockResult, LockStatus, Parameters,
};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default)]
pub struct OperationExecutor;

impl OperationExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `operation` with free-form parameters.
    ///
    /// Escalate and de-escalate read their privilege map from
    /// `parameters["privileges"]`.
    pub fn execute(
        &self,
        store: &mut LockStore,
        lock_id: &LockId,
        operation: LockOperation,
        parameters: &Parameters,
        now: DateTime<Utc>,
    ) -> LockResult<HistoryRecord> {
        store.get(lock_id)?;
        match operation {
            LockOperation::Lock => self.lock(store, lock_id, parameters.clone(), now),
            LockOperation::Unlock => self.unlock(store, lock_id, parameters.clone(), now),
            LockOperation::Escalate => {
                let privileges = privileges_from_parameters(parameters)?;
                self.escalate(store, lock_id, &privileges, now)
            }
            LockOperation::Deescalate => {
                let privileges = privileges_from_parameters(parameters)?;
                self.deescalate(store, lock_id, &privileges, now)
            }
        }
    }

    /// Put a lock into force: `Pending -> Active`, or re-stamp an active one.
    pub fn lock(
        &self,
        store: &mut LockStore,
        lock_id: &LockId,
        parameters: Parameters,
        now: DateTime<Utc>,
    ) -> LockResult<HistoryRecord> {
        let lock = store.get_mut(lock_id)?;
        if lock.status.is_terminal() {
            return Err(LockError::InvalidTransition {
                lock_id: *lock_id,
                from: lock.status,
                action: "lock",
            });
        }

        lock.status = LockStatus::Active;
        lock.timestamps.activated_at = Some(now);

        info!(lock_id = %lock_id, "Lock engaged");
        Ok(store.record(*lock_id, LockOperation::Lock.into(), parameters, now))
    }

    /// Release a lock. Unlock is terminal: a live lock becomes `Expired`,
    /// a lock already in a terminal status keeps it.
    pub fn unlock(
        &self,
        store: &mut LockStore,
        lock_id: &LockId,
        parameters: Parameters,
        now: DateTime<Utc>,
    ) -> LockResult<HistoryRecord> {
        let lock = store.get_mut(lock_id)?;
        if !lock.status.is_terminal() {
            lock.status = LockStatus::Expired;
            lock.timestamps.expired_at = Some(now);
        }
        lock.timestamps.unlocked_at = Some(now);
        let status = lock.status;

        info!(lock_id = %lock_id, status = %status, "Lock released");
        Ok(store.record(*lock_id, LockOperation::Unlock.into(), parameters, now))
    }

    /// Set each supplied privilege, creating entries that do not exist.
    pub fn escalate(
        &self,
        store: &mut LockStore,
        lock_id: &LockId,
        privileges: &BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> LockResult<HistoryRecord> {
        let lock = store.get_mut(lock_id)?;
        for (name, level) in privileges {
            lock.privileges.insert(name.clone(), level.clone());
        }
        lock.timestamps.escalated_at = Some(now);

        debug!(lock_id = %lock_id, count = privileges.len(), "Privileges escalated");
        Ok(store.record(
            *lock_id,
            LockOperation::Escalate.into(),
            privileges_parameters(privileges),
            now,
        ))
    }

    /// Update only privileges that already exist; unknown names are skipped
    /// so de-escalation can never fabricate an entry.
    pub fn deescalate(
        &self,
        store: &mut LockStore,
        lock_id: &LockId,
        privileges: &BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> LockResult<HistoryRecord> {
        let lock = store.get_mut(lock_id)?;
        let mut skipped = Vec::new();
        for (name, level) in privileges {
            match lock.privileges.get_mut(name) {
                Some(current) => *current = level.clone(),
                None => skipped.push(Value::String(name.clone())),
            }
        }
        lock.timestamps.deescalated_at = Some(now);

        let mut parameters = privileges_parameters(privileges);
        if !skipped.is_empty() {
            debug!(lock_id = %lock_id, skipped = skipped.len(), "Unknown privileges skipped");
            parameters.insert("skipped".into(), json!(skipped));
        }

        debug!(lock_id = %lock_id, count = privileges.len(), "Privileges de-escalated");
        Ok(store.record(*lock_id, LockOperation::Deescalate.into(), parameters, now))
    }
}
