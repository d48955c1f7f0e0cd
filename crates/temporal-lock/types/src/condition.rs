//! Event conditions and their criteria

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Comparison operator of a criterion predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    NotIn,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a single field path must satisfy.
///
/// On the wire a criterion is either a bare literal (exact equality) or an
/// object `{"operator": ..., "value": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Criterion {
    Predicate { operator: Operator, value: Value },
    Literal(Value),
}

impl Criterion {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn predicate(operator: Operator, value: impl Into<Value>) -> Self {
        Self::Predicate {
            operator,
            value: value.into(),
        }
    }
}

/// An event type plus criteria keyed by dot-separated field path.
///
/// All criteria must hold for the condition to match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCondition {
    pub event_type: String,
    #[serde(default)]
    pub criteria: BTreeMap<String, Criterion>,
}

impl EventCondition {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            criteria: BTreeMap::new(),
        }
    }

    /// Require `path` to equal `value` exactly.
    pub fn with_literal(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criteria.insert(path.into(), Criterion::literal(value));
        self
    }

    /// Require `path` to satisfy `operator` against `value`.
    pub fn with_predicate(
        mut self,
        path: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Self {
        self.criteria
            .insert(path.into(), Criterion::predicate(operator, value));
        self
    }
}
