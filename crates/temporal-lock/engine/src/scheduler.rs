//! Scheduler queue: a min-heap of time-keyed operations
//!
//! The heap is advisory. Entries are withdrawn lazily: cancelling or
//! re-scheduling only drops the entry from the live table, and stale heap
//! slots are discarded when they surface. Whoever dispatches a popped entry
//! must re-check the lock's state before acting on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use temporal_lock_types::{
    DeadlineKind, LockId, LockOperation, OperationId, Parameters, ScheduledOperation,
    ScheduledOperationHandle, ScheduledOperationKind,
};
use tracing::{debug, trace};

/// Outcome of one scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Entries applied successfully
    pub dispatched: usize,
    /// Entries whose dispatch returned an error (logged)
    pub failed: usize,
    /// Entries dropped because the lock had moved on
    pub skipped: usize,
    /// Due entries left for the next tick by the batch cap
    pub remaining_due: usize,
}

impl TickReport {
    pub fn processed(&self) -> usize {
        self.dispatched + self.failed + self.skipped
    }
}

/// Min-heap of scheduled operations keyed by `due_at`.
#[derive(Debug, Default)]
pub struct ScheduleQueue {
    heap: BinaryHeap<QueuedEntry>,
    live: HashMap<OperationId, ScheduledOperation>,
    checks: HashMap<(LockId, DeadlineKind), OperationId>,
    next_seq: u64,
}

impl ScheduleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule the expiration check for one deadline of a lock.
    ///
    /// A pending check for the same `(lock, deadline)` is replaced.
    pub fn schedule_check(
        &mut self,
        lock_id: LockId,
        deadline: DeadlineKind,
        due_at: DateTime<Utc>,
    ) -> OperationId {
        if let Some(previous) = self.checks.remove(&(lock_id, deadline)) {
            self.live.remove(&previous);
            trace!(lock_id = %lock_id, operation_id = %previous, "Replaced pending check");
        }

        let operation = ScheduledOperation {
            operation_id: OperationId::generate(),
            lock_id,
            due_at,
            kind: ScheduledOperationKind::CheckExpiration { deadline },
        };
        let operation_id = operation.operation_id;
        self.checks.insert((lock_id, deadline), operation_id);
        self.push(operation);

        debug!(lock_id = %lock_id, ?deadline, %due_at, "Scheduled expiration check");
        operation_id
    }

    /// Schedule a lock operation for execution at `due_at`.
    pub fn schedule_operation(
        &mut self,
        lock_id: LockId,
        operation: LockOperation,
        due_at: DateTime<Utc>,
        parameters: Parameters,
    ) -> ScheduledOperationHandle {
        let scheduled = ScheduledOperation {
            operation_id: OperationId::generate(),
            lock_id,
            due_at,
            kind: ScheduledOperationKind::ExecuteLockOperation {
                operation,
                parameters,
            },
        };
        let handle = ScheduledOperationHandle {
            operation_id: scheduled.operation_id,
            lock_id,
            operation,
            due_at,
        };
        self.push(scheduled);

        debug!(lock_id = %lock_id, %operation, %due_at, "Scheduled lock operation");
        handle
    }

    fn push(&mut self, operation: ScheduledOperation) {
        let entry = QueuedEntry {
            due_at: operation.due_at,
            seq: self.next_seq,
            operation_id: operation.operation_id,
        };
        self.next_seq += 1;
        self.live.insert(operation.operation_id, operation);
        self.heap.push(entry);
        self.compact_if_sparse();
    }

    /// Withdraw a pending entry.
    pub fn cancel(&mut self, operation_id: &OperationId) -> Option<ScheduledOperation> {
        let removed = self.live.remove(operation_id)?;
        if let ScheduledOperationKind::CheckExpiration { deadline } = removed.kind {
            self.checks.remove(&(removed.lock_id, deadline));
        }
        Some(removed)
    }

    /// Drop every pending expiration check of a lock.
    pub fn forget_checks(&mut self, lock_id: &LockId) -> usize {
        let mut removed = 0;
        for deadline in [DeadlineKind::Expiration, DeadlineKind::Timeout] {
            if let Some(id) = self.checks.remove(&(*lock_id, deadline)) {
                self.live.remove(&id);
                removed += 1;
            }
        }
        removed
    }

    /// Pop up to `limit` live entries with `due_at <= now`, earliest first.
    ///
    /// Entries due at the same instant come out in scheduling order.
    pub fn pop_due(&mut self, now: DateTime<Utc>, limit: usize) -> Vec<ScheduledOperation> {
        let mut due = Vec::new();
        while due.len() < limit {
            match self.heap.peek() {
                Some(top) if top.due_at <= now => {}
                _ => break,
            }
            let Some(entry) = self.heap.pop() else {
                break;
            };
            let Some(operation) = self.live.remove(&entry.operation_id) else {
                continue;
            };
            if let ScheduledOperationKind::CheckExpiration { deadline } = operation.kind {
                let key = (operation.lock_id, deadline);
                if self.checks.get(&key) == Some(&operation.operation_id) {
                    self.checks.remove(&key);
                }
            }
            due.push(operation);
        }
        due
    }

    /// Live entries with `due_at <= now`.
    pub fn due_count(&self, now: DateTime<Utc>) -> usize {
        self.live.values().filter(|op| op.due_at <= now).count()
    }

    /// Pending entries for a lock, earliest first.
    pub fn pending_for(&self, lock_id: &LockId) -> Vec<&ScheduledOperation> {
        let mut ops: Vec<_> = self
            .live
            .values()
            .filter(|op| &op.lock_id == lock_id)
            .collect();
        ops.sort_by_key(|op| op.due_at);
        ops
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Rebuild the heap once withdrawn slots dominate it.
    fn compact_if_sparse(&mut self) {
        if self.heap.len() <= 64 || self.heap.len() <= self.live.len() * 2 {
            return;
        }
        let before = self.heap.len();
        let live = &self.live;
        self.heap.retain(|entry| live.contains_key(&entry.operation_id));
        trace!(before, after = self.heap.len(), "Compacted schedule heap");
    }
}

/// Heap slot. Ordered so the max-heap yields the earliest `due_at` first,
/// breaking ties by insertion sequence.
#[derive(Debug)]
struct QueuedEntry {
    due_at: DateTime<Utc>,
    seq: u64,
    operation_id: OperationId,
}

impl Ord for QueuedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due_at
            .cmp(&self.due_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for QueuedEntry {}

impl PartialEq for QueuedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due_at == other.due_at && self.seq == other.seq
    }
}
