//! Events delivered by external producers

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An event offered to the matcher.
///
/// Fields other than `event_type` sit beside it at the top level and may be
/// nested objects, addressed by dot-separated paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockEvent {
    pub event_type: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl LockEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Build an event from a JSON object carrying an `event_type` string.
    pub fn from_value(value: Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }

    /// Resolve a dot-separated path against the event's fields.
    ///
    /// Returns `None` when any segment is missing or traverses a non-object.
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.fields.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}
