//! Lock operations and scheduler entries

use crate::errors::{LockError, LockResult};
use crate::ids::{LockId, OperationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Free-form operation parameters.
pub type Parameters = Map<String, Value>;

/// Key under which privilege maps travel in [`Parameters`].
pub const PRIVILEGES_KEY: &str = "privileges";

/// Side effect the operation executor performs on a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockOperation {
    Lock,
    Unlock,
    Escalate,
    Deescalate,
}

impl LockOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::Escalate => "escalate",
            Self::Deescalate => "deescalate",
        }
    }
}

impl fmt::Display for LockOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which deadline of a lock an expiration check watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineKind {
    Expiration,
    Timeout,
}

/// What a scheduler entry does once due.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduledOperationKind {
    CheckExpiration {
        deadline: DeadlineKind,
    },
    ExecuteLockOperation {
        operation: LockOperation,
        #[serde(default)]
        parameters: Parameters,
    },
}

/// A time-keyed scheduler entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledOperation {
    pub operation_id: OperationId,
    pub lock_id: LockId,
    pub due_at: DateTime<Utc>,
    pub kind: ScheduledOperationKind,
}

/// Handle returned to callers that schedule a lock operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledOperationHandle {
    pub operation_id: OperationId,
    pub lock_id: LockId,
    pub operation: LockOperation,
    pub due_at: DateTime<Utc>,
}

/// Wrap a privilege map as operation parameters.
pub fn privileges_parameters(privileges: &BTreeMap<String, String>) -> Parameters {
    let inner: Map<String, Value> = privileges
        .iter()
        .map(|(name, level)| (name.clone(), Value::String(level.clone())))
        .collect();
    let mut params = Parameters::new();
    params.insert(PRIVILEGES_KEY.to_string(), Value::Object(inner));
    params
}

/// Extract the privilege map from operation parameters.
///
/// A missing key yields an empty map; a present key must hold an object of
/// string levels.
pub fn privileges_from_parameters(params: &Parameters) -> LockResult<BTreeMap<String, String>> {
    let Some(raw) = params.get(PRIVILEGES_KEY) else {
        return Ok(BTreeMap::new());
    };

    let object = raw.as_object().ok_or_else(|| {
        LockError::InvalidParameters(format!("'{PRIVILEGES_KEY}' must be an object"))
    })?;

    object
        .iter()
        .map(|(name, level)| match level {
            Value::String(level) => Ok((name.clone(), level.clone())),
            other => Err(LockError::InvalidParameters(format!(
                "privilege '{name}' has non-string level {other}"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn privileges_parameters_round_trip() {
        let mut privileges = BTreeMap::new();
        privileges.insert("admin_access".to_string(), "high".to_string());
        let params = privileges_parameters(&privileges);
        assert_eq!(privileges_from_parameters(&params).unwrap(), privileges);
    }

    #[test]
    fn malformed_privileges_are_rejected() {
        let mut params = Parameters::new();
        params.insert(PRIVILEGES_KEY.into(), json!({"admin_access": 3}));
        assert!(matches!(
            privileges_from_parameters(&params),
            Err(LockError::InvalidParameters(_))
        ));

        params.insert(PRIVILEGES_KEY.into(), json!(["admin_access"]));
        assert!(privileges_from_parameters(&params).is_err());
    }

    #[test]
    fn missing_privileges_yield_empty_map() {
        assert!(privileges_from_parameters(&Parameters::new())
            .unwrap()
            .is_empty());
    }
}
