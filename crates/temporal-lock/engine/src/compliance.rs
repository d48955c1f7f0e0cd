//! Compliance verifier: derives a temporal-governance verdict per capsule
//!
//! Reads the store only. An `Active` lock past its deadline is reported as
//! non-compliant: expiry is detected on the next scheduler tick, so such a
//! lock is inconsistent for at most one tick interval.

use crate::store::LockStore;
use chrono::{DateTime, Utc};
use temporal_lock_types::{
    ComplianceReport, ComplianceStatus, DeadlineKind, Lock, LockCompliance, LockError, LockResult,
    LockStatus,
};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct ComplianceVerifier;

impl ComplianceVerifier {
    pub fn new() -> Self {
        Self
    }

    pub fn verify(
        &self,
        store: &LockStore,
        capsule_id: &str,
        now: DateTime<Utc>,
    ) -> LockResult<ComplianceReport> {
        if !store.contains_capsule(capsule_id) {
            return Err(LockError::CapsuleNotFound(capsule_id.to_string()));
        }

        let locks: Vec<LockCompliance> = store
            .locks_for_capsule(capsule_id)
            .into_iter()
            .map(|lock| classify(lock, now))
            .collect();

        let overall_status = if locks
            .iter()
            .any(|entry| entry.compliance == ComplianceStatus::NonCompliant)
        {
            ComplianceStatus::NonCompliant
        } else {
            ComplianceStatus::Compliant
        };

        debug!(
            capsule_id = %capsule_id,
            locks = locks.len(),
            overall = overall_status.as_str(),
            "Compliance verified"
        );

        Ok(ComplianceReport {
            capsule_id: capsule_id.to_string(),
            overall_status,
            locks,
            verified_at: now,
        })
    }
}

/// Verdict for a single lock at `now`.
pub fn classify(lock: &Lock, now: DateTime<Utc>) -> LockCompliance {
    let (compliance, reason) = match lock.status {
        LockStatus::Active => match lock.terms.elapsed_deadline(now) {
            Some((DeadlineKind::Expiration, _)) => (
                ComplianceStatus::NonCompliant,
                "active but expired".to_string(),
            ),
            Some((DeadlineKind::Timeout, _)) => (
                ComplianceStatus::NonCompliant,
                "active but timed out".to_string(),
            ),
            None => (ComplianceStatus::Compliant, "active within deadline".to_string()),
        },
        LockStatus::Expired => match &lock.expiration_action {
            Some(action) if !lock.expiration_action_executed => (
                ComplianceStatus::NonCompliant,
                format!("expiration action '{}' not executed", action.action_type),
            ),
            _ => (ComplianceStatus::Compliant, "expired".to_string()),
        },
        LockStatus::Triggered => match &lock.trigger_action {
            Some(action) if !lock.trigger_action_executed => (
                ComplianceStatus::NonCompliant,
                format!("trigger action '{}' not executed", action.action_type),
            ),
            _ => (ComplianceStatus::Compliant, "triggered".to_string()),
        },
        LockStatus::Pending | LockStatus::Canceled => {
            (ComplianceStatus::Compliant, lock.status.as_str().to_string())
        }
    };

    LockCompliance {
        lock_id: lock.lock_id,
        kind: lock.kind(),
        status: lock.status,
        compliance,
        reason,
    }
}
