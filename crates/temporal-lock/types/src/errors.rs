//! Error types for the temporal lock engine

use crate::ids::{LockId, OperationId};
use crate::lock::LockStatus;
use thiserror::Error;

/// Errors surfaced by lock operations.
///
/// Every variant is returned synchronously from the call that caused it.
/// Failures inside the background scheduler are logged, never returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("{field} of {value} exceeds configured maximum {max}")]
    BoundsExceeded {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("invalid transition for {lock_id}: cannot {action} from {from:?}")]
    InvalidTransition {
        lock_id: LockId,
        from: LockStatus,
        action: &'static str,
    },

    #[error("lock not found: {0}")]
    LockNotFound(LockId),

    #[error("capsule not found: {0}")]
    CapsuleNotFound(String),

    #[error("scheduled operation not found: {0}")]
    ScheduledOperationNotFound(OperationId),

    #[error("action {action} failed for {lock_id}: {reason}")]
    ActionFailed {
        lock_id: LockId,
        action: String,
        reason: String,
    },

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("scheduler loop already running")]
    AlreadyRunning,
}

impl LockError {
    /// True for errors that mean the referenced entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::LockNotFound(_) | Self::CapsuleNotFound(_) | Self::ScheduledOperationNotFound(_)
        )
    }
}

/// Result type alias for lock operations
pub type LockResult<T> = Result<T, LockError>;
