//! Temporal compliance report types

use crate::ids::LockId;
use crate::lock::{LockKind, LockStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compliant => "compliant",
            Self::NonCompliant => "non_compliant",
        }
    }
}

/// Verdict for a single lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockCompliance {
    pub lock_id: LockId,
    pub kind: LockKind,
    pub status: LockStatus,
    pub compliance: ComplianceStatus,
    pub reason: String,
}

/// Verdict over every lock of a capsule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub capsule_id: String,
    pub overall_status: ComplianceStatus,
    pub locks: Vec<LockCompliance>,
    pub verified_at: DateTime<Utc>,
}

impl ComplianceReport {
    pub fn is_compliant(&self) -> bool {
        self.overall_status == ComplianceStatus::Compliant
    }

    pub fn non_compliant(&self) -> impl Iterator<Item = &LockCompliance> {
        self.locks
            .iter()
            .filter(|entry| entry.compliance == ComplianceStatus::NonCompliant)
    }

    pub fn entry(&self, lock_id: &LockId) -> Option<&LockCompliance> {
        self.locks.iter().find(|entry| &entry.lock_id == lock_id)
    }
}
