//! Follow-up actions run when a lock expires or is triggered

use crate::operation::{privileges_parameters, Parameters};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Effect named by an action descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Unlock,
    Deescalate,
    Notify,
    Lock,
    Escalate,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unlock => "unlock",
            Self::Deescalate => "deescalate",
            Self::Notify => "notify",
            Self::Lock => "lock",
            Self::Escalate => "escalate",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action descriptor `{type, parameters}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub parameters: Parameters,
}

impl LockAction {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            parameters: Parameters::new(),
        }
    }

    pub fn unlock() -> Self {
        Self::new(ActionType::Unlock)
    }

    pub fn lock() -> Self {
        Self::new(ActionType::Lock)
    }

    pub fn notify(payload: Parameters) -> Self {
        Self {
            action_type: ActionType::Notify,
            parameters: payload,
        }
    }

    pub fn escalate(privileges: &BTreeMap<String, String>) -> Self {
        Self {
            action_type: ActionType::Escalate,
            parameters: privileges_parameters(privileges),
        }
    }

    pub fn deescalate(privileges: &BTreeMap<String, String>) -> Self {
        Self {
            action_type: ActionType::Deescalate,
            parameters: privileges_parameters(privileges),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn descriptor_uses_type_key() {
        let action: LockAction = serde_json::from_value(json!({"type": "unlock"})).unwrap();
        assert_eq!(action, LockAction::unlock());

        let mut privileges = BTreeMap::new();
        privileges.insert("admin_access".to_string(), "low".to_string());
        let json = serde_json::to_value(LockAction::deescalate(&privileges)).unwrap();
        assert_eq!(
            json,
            json!({"type": "deescalate", "parameters": {"privileges": {"admin_access": "low"}}})
        );
    }
}
