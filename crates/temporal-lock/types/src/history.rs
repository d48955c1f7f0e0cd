//! Append-only per-lock history

use crate::ids::{LockId, OperationId};
use crate::operation::{LockOperation, Parameters};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a history record documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOperation {
    Created,
    Activated,
    Deactivated,
    Canceled,
    Extended,
    Expired,
    Triggered,
    Notified,
    Lock,
    Unlock,
    Escalate,
    Deescalate,
}

impl From<LockOperation> for HistoryOperation {
    fn from(op: LockOperation) -> Self {
        match op {
            LockOperation::Lock => Self::Lock,
            LockOperation::Unlock => Self::Unlock,
            LockOperation::Escalate => Self::Escalate,
            LockOperation::Deescalate => Self::Deescalate,
        }
    }
}

/// Immutable audit entry. Never mutated or removed once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub operation_id: OperationId,
    pub lock_id: LockId,
    pub operation: HistoryOperation,
    pub parameters: Parameters,
    pub timestamp: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(
        lock_id: LockId,
        operation: HistoryOperation,
        parameters: Parameters,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            operation_id: OperationId::generate(),
            lock_id,
            operation,
            parameters,
            timestamp,
        }
    }
}
