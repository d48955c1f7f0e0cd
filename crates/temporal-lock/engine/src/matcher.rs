//! Event matcher: listener index and criteria evaluation
//!
//! Listeners are indexed by event type so an incoming event only visits the
//! locks that could possibly match it. Evaluation is total: malformed
//! criteria or type mismatches resolve to "no match", never to an error.

use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use temporal_lock_types::{Criterion, EventCondition, LockEvent, LockId, Operator};
use tracing::{debug, trace};

/// Per-event-type index of lock listeners.
#[derive(Debug, Default)]
pub struct EventMatcher {
    listeners: HashMap<String, HashMap<LockId, Vec<EventCondition>>>,
}

impl EventMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index each condition of `lock_id` under its event type.
    ///
    /// Registering a lock again replaces its previous listeners.
    pub fn register(&mut self, lock_id: LockId, conditions: &[EventCondition]) {
        self.unregister(&lock_id);
        for condition in conditions {
            self.listeners
                .entry(condition.event_type.clone())
                .or_default()
                .entry(lock_id)
                .or_default()
                .push(condition.clone());
        }
        debug!(lock_id = %lock_id, conditions = conditions.len(), "Listeners registered");
    }

    /// Remove every listener of `lock_id` across all event types.
    ///
    /// Returns the number of conditions removed.
    pub fn unregister(&mut self, lock_id: &LockId) -> usize {
        let mut removed = 0;
        self.listeners.retain(|_, by_lock| {
            if let Some(conditions) = by_lock.remove(lock_id) {
                removed += conditions.len();
            }
            !by_lock.is_empty()
        });
        if removed > 0 {
            debug!(lock_id = %lock_id, removed, "Listeners unregistered");
        }
        removed
    }

    pub fn is_registered(&self, lock_id: &LockId) -> bool {
        self.listeners
            .values()
            .any(|by_lock| by_lock.contains_key(lock_id))
    }

    /// Total registered conditions.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .values()
            .flat_map(|by_lock| by_lock.values())
            .map(Vec::len)
            .sum()
    }

    /// Locks with at least one condition satisfied by `event`, in id order.
    ///
    /// Pure lookup: the caller performs the trigger and unregistration.
    pub fn matching_locks(&self, event: &LockEvent) -> Vec<LockId> {
        let Some(by_lock) = self.listeners.get(&event.event_type) else {
            trace!(event_type = %event.event_type, "No listeners for event type");
            return Vec::new();
        };

        let matched: BTreeSet<LockId> = by_lock
            .iter()
            .filter(|(_, conditions)| conditions.iter().any(|c| matches_condition(event, c)))
            .map(|(lock_id, _)| *lock_id)
            .collect();

        debug!(
            event_type = %event.event_type,
            candidates = by_lock.len(),
            matched = matched.len(),
            "Event evaluated"
        );

        matched.into_iter().collect()
    }
}

/// Whether `event` satisfies every criterion of `condition`.
pub fn matches_condition(event: &LockEvent, condition: &EventCondition) -> bool {
    if event.event_type != condition.event_type {
        return false;
    }

    condition.criteria.iter().all(|(path, criterion)| {
        let Some(actual) = event.resolve(path) else {
            return false;
        };
        match criterion {
            Criterion::Literal(expected) => values_equal(actual, expected),
            Criterion::Predicate { operator, value } => evaluate(*operator, actual, value),
        }
    })
}

/// Apply `operator` to the event's `actual` value and the criterion's
/// `expected` value.
pub fn evaluate(operator: Operator, actual: &Value, expected: &Value) -> bool {
    match operator {
        Operator::Eq => values_equal(actual, expected),
        Operator::Ne => !values_equal(actual, expected),
        Operator::Gt => compare(actual, expected) == Some(Ordering::Greater),
        Operator::Ge => matches!(
            compare(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::Lt => compare(actual, expected) == Some(Ordering::Less),
        Operator::Le => matches!(
            compare(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::In => match expected {
            Value::Array(items) => items.iter().any(|item| values_equal(actual, item)),
            _ => false,
        },
        Operator::NotIn => match expected {
            Value::Array(items) => !items.iter().any(|item| values_equal(actual, item)),
            _ => false,
        },
        Operator::Contains => contains(actual, expected).unwrap_or(false),
        Operator::NotContains => contains(actual, expected).map(|c| !c).unwrap_or(false),
        Operator::StartsWith => match (actual, expected) {
            (Value::String(a), Value::String(e)) => a.starts_with(e.as_str()),
            _ => false,
        },
        Operator::EndsWith => match (actual, expected) {
            (Value::String(a), Value::String(e)) => a.ends_with(e.as_str()),
            _ => false,
        },
    }
}

/// JSON equality with numbers compared by value, so `1` equals `1.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Ordering for numbers and for strings; `None` for anything else.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Integers compare exactly; f64 is used only when a float is involved.
fn compare_numbers(x: &Number, y: &Number) -> Option<Ordering> {
    if x.is_f64() || y.is_f64() {
        return x.as_f64()?.partial_cmp(&y.as_f64()?);
    }
    match (x.as_i64(), y.as_i64()) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        // an integer outside i64 is a u64 above i64::MAX
        (Some(_), None) => Some(Ordering::Less),
        (None, Some(_)) => Some(Ordering::Greater),
        (None, None) => Some(x.as_u64()?.cmp(&y.as_u64()?)),
    }
}

/// Substring test for strings, membership for arrays; `None` when the
/// operand types do not support containment.
fn contains(haystack: &Value, needle: &Value) -> Option<bool> {
    match (haystack, needle) {
        (Value::String(h), Value::String(n)) => Some(h.contains(n.as_str())),
        (Value::Array(items), needle) => Some(items.iter().any(|item| values_equal(item, needle))),
        _ => None,
    }
}
