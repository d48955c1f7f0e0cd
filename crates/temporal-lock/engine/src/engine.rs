//! The temporal lock engine facade
//!
//! All shared state (lock store, listener index, schedule heap) lives behind
//! one coarse mutex. Every entry point takes it for the whole transition, so
//! API calls, event processing and scheduler ticks are serialized.
//!
//! Expiry is polled, not pushed: a lock whose deadline has passed stays
//! `Active` until the next tick, at most one `tick_interval` later. The
//! compliance verifier reports that window as "active but expired".

use crate::clock::{Clock, SystemClock};
use crate::compliance::ComplianceVerifier;
use crate::config::EngineConfig;
use crate::executor::OperationExecutor;
use crate::matcher::EventMatcher;
use crate::notify::Notifier;
use crate::scheduler::{ScheduleQueue, TickReport};
use crate::store::{LockBounds, LockStore};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use std::time::Duration;
use temporal_lock_types::{
    privileges_from_parameters, ActionType, ComplianceReport, DeadlineKind,
    EventBoundLockRequest, HistoryOperation, HistoryRecord, HybridLockRequest, Lock, LockAction,
    LockError, LockEvent, LockFilter, LockId, LockNotification, LockOperation, LockResult,
    LockStatistics, LockStatus, NotificationKind, OperationId, Parameters, ScheduledOperation,
    ScheduledOperationHandle, ScheduledOperationKind, TimeBoundLockRequest,
};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Mutable state guarded by the engine mutex.
#[derive(Debug)]
struct EngineState {
    store: LockStore,
    matcher: EventMatcher,
    queue: ScheduleQueue,
}

impl EngineState {
    /// Schedule a fresh lock's deadline checks and register its listeners.
    fn arm(&mut self, lock: &Lock) {
        for (deadline, due_at) in lock.terms.deadlines() {
            self.queue.schedule_check(lock.lock_id, deadline, due_at);
        }
        if !lock.conditions().is_empty() {
            self.matcher.register(lock.lock_id, lock.conditions());
        }
    }

    /// Drop listeners and pending checks of a lock leaving the live states.
    fn disarm(&mut self, lock_id: &LockId) {
        self.matcher.unregister(lock_id);
        self.queue.forget_checks(lock_id);
    }
}

/// Result of dispatching one due scheduler entry.
enum Dispatch {
    Applied,
    Skipped,
}

/// Temporal Lock Scheduler and Capsule Contract Engine.
///
/// Construct once with its policy configuration, call [`start`](Self::start)
/// to run the background scheduler, and [`shutdown`](Self::shutdown) to stop
/// it and wait for the loop to exit.
pub struct TemporalLockEngine {
    state: Mutex<EngineState>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    notifier: Notifier,
    executor: OperationExecutor,
    verifier: ComplianceVerifier,
    running: Arc<RwLock<bool>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl TemporalLockEngine {
    /// Create an engine reading wall-clock time.
    pub fn new(config: EngineConfig) -> LockResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an engine with an explicit time source.
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> LockResult<Self> {
        config.validate()?;

        let state = EngineState {
            store: LockStore::new(LockBounds::from(&config)),
            matcher: EventMatcher::new(),
            queue: ScheduleQueue::new(),
        };

        Ok(Self {
            state: Mutex::new(state),
            notifier: Notifier::new(config.notification_capacity),
            config,
            clock,
            executor: OperationExecutor::new(),
            verifier: ComplianceVerifier::new(),
            running: Arc::new(RwLock::new(false)),
            loop_handle: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Subscribe to expiration, trigger, cancel and notify signals.
    pub fn subscribe(&self) -> broadcast::Receiver<LockNotification> {
        self.notifier.subscribe()
    }

    // ── Lock creation ────────────────────────────────────────────────

    pub async fn create_time_bound_lock(&self, request: TimeBoundLockRequest) -> LockResult<Lock> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let lock = state.store.create_time_bound(request, now)?;
        state.arm(&lock);
        Ok(lock)
    }

    pub async fn create_event_bound_lock(
        &self,
        request: EventBoundLockRequest,
    ) -> LockResult<Lock> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let lock = state.store.create_event_bound(request, now)?;
        state.arm(&lock);
        Ok(lock)
    }

    pub async fn create_hybrid_lock(&self, request: HybridLockRequest) -> LockResult<Lock> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let lock = state.store.create_hybrid(request, now)?;
        state.arm(&lock);
        Ok(lock)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// `Pending -> Active`.
    pub async fn activate(&self, lock_id: &LockId) -> LockResult<Lock> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.store.activate(lock_id, now)
    }

    /// `Active -> Pending`.
    pub async fn deactivate(&self, lock_id: &LockId) -> LockResult<Lock> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.store.deactivate(lock_id, now)
    }

    /// `Pending | Active -> Canceled`, unregistering every listener of the
    /// lock in the same step.
    pub async fn cancel(&self, lock_id: &LockId) -> LockResult<Lock> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let lock = state.store.cancel(lock_id, now)?;
        state.disarm(lock_id);
        self.notifier
            .publish(&lock, NotificationKind::Canceled, Value::Null, now);
        Ok(lock)
    }

    /// Push the expiration deadline later and replace its pending check.
    pub async fn extend_lock(&self, lock_id: &LockId, additional_seconds: u64) -> LockResult<Lock> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let lock = state.store.extend(lock_id, additional_seconds, now)?;
        if let Some(expiration_at) = lock.expiration_at() {
            state
                .queue
                .schedule_check(*lock_id, DeadlineKind::Expiration, expiration_at);
        }
        Ok(lock)
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Schedule `operation` on a live lock for execution at `at`.
    pub async fn schedule_lock_operation(
        &self,
        lock_id: &LockId,
        operation: LockOperation,
        at: DateTime<Utc>,
        parameters: Parameters,
    ) -> LockResult<ScheduledOperationHandle> {
        let mut state = self.state.lock().await;
        let lock = state.store.get(lock_id)?;
        if lock.is_terminal() {
            return Err(LockError::InvalidTransition {
                lock_id: *lock_id,
                from: lock.status,
                action: "schedule",
            });
        }
        Ok(state
            .queue
            .schedule_operation(*lock_id, operation, at, parameters))
    }

    /// Withdraw a pending scheduled entry.
    pub async fn cancel_scheduled_operation(
        &self,
        operation_id: &OperationId,
    ) -> LockResult<ScheduledOperation> {
        let mut state = self.state.lock().await;
        let removed = state
            .queue
            .cancel(operation_id)
            .ok_or(LockError::ScheduledOperationNotFound(*operation_id))?;
        debug!(operation_id = %operation_id, lock_id = %removed.lock_id, "Scheduled operation withdrawn");
        Ok(removed)
    }

    /// Run an operation immediately.
    pub async fn execute_lock_operation(
        &self,
        lock_id: &LockId,
        operation: LockOperation,
        parameters: Parameters,
    ) -> LockResult<HistoryRecord> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        self.apply_operation(&mut state, lock_id, operation, &parameters, now)
    }

    fn apply_operation(
        &self,
        state: &mut EngineState,
        lock_id: &LockId,
        operation: LockOperation,
        parameters: &Parameters,
        now: DateTime<Utc>,
    ) -> LockResult<HistoryRecord> {
        let before = state.store.get(lock_id)?.status;
        let record = self
            .executor
            .execute(&mut state.store, lock_id, operation, parameters, now)?;
        let after = state.store.get(lock_id)?.status;

        if !before.is_terminal() && after == LockStatus::Expired {
            if let Err(e) = self.on_expired(state, lock_id, now) {
                error!(lock_id = %lock_id, error = %e, "Expiration follow-up failed");
            }
        }

        Ok(record)
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Offer an event to every pending listener of its type.
    ///
    /// Returns the ids of locks the event triggered. Malformed criteria
    /// simply do not match.
    pub async fn process_event(&self, event: LockEvent) -> Vec<LockId> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let matched = state.matcher.matching_locks(&event);
        let mut triggered = Vec::with_capacity(matched.len());

        for lock_id in matched {
            let mut params = Parameters::new();
            params.insert("event_type".into(), json!(event.event_type));

            let lock = match state.store.trigger(&lock_id, params, now) {
                Ok(lock) => lock,
                Err(e) => {
                    warn!(lock_id = %lock_id, error = %e, "Dropping stale listener");
                    state.disarm(&lock_id);
                    continue;
                }
            };
            state.disarm(&lock_id);

            let payload = serde_json::to_value(&event).unwrap_or(Value::Null);
            self.notifier
                .publish(&lock, NotificationKind::Triggered, payload, now);

            if let Some(action) = lock.trigger_action.as_ref() {
                match self.run_action(&mut state, &lock, action, now) {
                    Ok(()) => {
                        if let Ok(lock) = state.store.get_mut(&lock_id) {
                            lock.trigger_action_executed = true;
                        }
                    }
                    Err(e) => error!(lock_id = %lock_id, error = %e, "Trigger action failed"),
                }
            }

            triggered.push(lock_id);
        }

        if !triggered.is_empty() {
            info!(
                event_type = %event.event_type,
                triggered = triggered.len(),
                "Event triggered locks"
            );
        }
        triggered
    }

    // ── Compliance ───────────────────────────────────────────────────

    pub async fn verify_temporal_compliance(&self, capsule_id: &str) -> LockResult<ComplianceReport> {
        let now = self.clock.now();
        let state = self.state.lock().await;
        self.verifier.verify(&state.store, capsule_id, now)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub async fn get_lock(&self, lock_id: &LockId) -> LockResult<Lock> {
        let state = self.state.lock().await;
        state.store.get(lock_id).cloned()
    }

    /// Locks of a capsule in creation order; empty for unknown capsules.
    pub async fn get_locks_for_capsule(&self, capsule_id: &str) -> Vec<Lock> {
        let state = self.state.lock().await;
        state
            .store
            .locks_for_capsule(capsule_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// History of a lock in append order.
    pub async fn get_history(&self, lock_id: &LockId) -> LockResult<Vec<HistoryRecord>> {
        let state = self.state.lock().await;
        state.store.history(lock_id).map(<[HistoryRecord]>::to_vec)
    }

    pub async fn list_locks(&self, filter: LockFilter) -> Vec<Lock> {
        let state = self.state.lock().await;
        state.store.list(&filter)
    }

    /// Pending scheduler entries for a lock, earliest first.
    pub async fn pending_operations(&self, lock_id: &LockId) -> Vec<ScheduledOperation> {
        let state = self.state.lock().await;
        state
            .queue
            .pending_for(lock_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn pending_scheduled_count(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Whether the lock still has registered event listeners.
    pub async fn is_listening(&self, lock_id: &LockId) -> bool {
        self.state.lock().await.matcher.is_registered(lock_id)
    }

    pub async fn statistics(&self) -> LockStatistics {
        let state = self.state.lock().await;
        let mut stats = state.store.statistics();
        stats.pending_scheduled = state.queue.len();
        stats.registered_listeners = state.matcher.listener_count();
        stats
    }

    // ── Scheduler ────────────────────────────────────────────────────

    /// Run one scheduler batch at the clock's current time.
    ///
    /// Pops at most `max_ops_per_batch` due entries; the rest wait for the
    /// next tick in heap order. A failing entry is logged and counted, and
    /// never stops the batch.
    pub async fn tick(&self) -> TickReport {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let due = state.queue.pop_due(now, self.config.max_ops_per_batch);
        let mut report = TickReport::default();

        for operation in due {
            match self.dispatch(&mut state, &operation, now) {
                Ok(Dispatch::Applied) => report.dispatched += 1,
                Ok(Dispatch::Skipped) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(
                        operation_id = %operation.operation_id,
                        lock_id = %operation.lock_id,
                        error = %e,
                        "Scheduled operation failed"
                    );
                }
            }
        }

        report.remaining_due = state.queue.due_count(now);
        report
    }

    fn dispatch(
        &self,
        state: &mut EngineState,
        operation: &ScheduledOperation,
        now: DateTime<Utc>,
    ) -> LockResult<Dispatch> {
        let lock_id = &operation.lock_id;
        let lock = state.store.get(lock_id)?;

        // The heap is advisory; the lock's current state decides.
        if lock.is_terminal() {
            debug!(lock_id = %lock_id, status = %lock.status, "Skipping entry for settled lock");
            return Ok(Dispatch::Skipped);
        }

        match &operation.kind {
            ScheduledOperationKind::CheckExpiration { deadline } => {
                let deadline_at = match lock.terms.deadline(*deadline) {
                    Some(at) if at <= now => at,
                    _ => {
                        warn!(lock_id = %lock_id, ?deadline, "Deadline moved; skipping check");
                        return Ok(Dispatch::Skipped);
                    }
                };

                let mut params = Parameters::new();
                params.insert("deadline".into(), json!(deadline));
                params.insert("deadline_at".into(), json!(deadline_at));
                state.store.expire(lock_id, params, now)?;
                self.on_expired(state, lock_id, now)?;
            }
            ScheduledOperationKind::ExecuteLockOperation {
                operation,
                parameters,
            } => {
                self.apply_operation(state, lock_id, *operation, parameters, now)?;
            }
        }

        Ok(Dispatch::Applied)
    }

    /// Follow-up for a lock that just entered `Expired`: drop its listeners
    /// and checks, signal subscribers and run its expiration action once.
    fn on_expired(
        &self,
        state: &mut EngineState,
        lock_id: &LockId,
        now: DateTime<Utc>,
    ) -> LockResult<()> {
        state.disarm(lock_id);
        let lock = state.store.get(lock_id)?.clone();
        self.notifier
            .publish(&lock, NotificationKind::Expired, Value::Null, now);

        let Some(action) = lock.expiration_action.as_ref() else {
            return Ok(());
        };
        if lock.expiration_action_executed {
            return Ok(());
        }

        self.run_action(state, &lock, action, now)?;
        state.store.get_mut(lock_id)?.expiration_action_executed = true;
        Ok(())
    }

    /// Perform an action descriptor against `lock`.
    fn run_action(
        &self,
        state: &mut EngineState,
        lock: &Lock,
        action: &LockAction,
        now: DateTime<Utc>,
    ) -> LockResult<()> {
        let lock_id = &lock.lock_id;
        let params = &action.parameters;

        let result = match action.action_type {
            ActionType::Unlock => self
                .executor
                .unlock(&mut state.store, lock_id, params.clone(), now)
                .map(drop),
            ActionType::Lock => self
                .executor
                .lock(&mut state.store, lock_id, params.clone(), now)
                .map(drop),
            ActionType::Escalate => privileges_from_parameters(params).and_then(|privileges| {
                self.executor
                    .escalate(&mut state.store, lock_id, &privileges, now)
                    .map(drop)
            }),
            ActionType::Deescalate => privileges_from_parameters(params).and_then(|privileges| {
                self.executor
                    .deescalate(&mut state.store, lock_id, &privileges, now)
                    .map(drop)
            }),
            ActionType::Notify => {
                self.notifier.publish(
                    lock,
                    NotificationKind::Notify,
                    Value::Object(params.clone()),
                    now,
                );
                state
                    .store
                    .record(*lock_id, HistoryOperation::Notified, params.clone(), now);
                Ok(())
            }
        };

        result.map_err(|e| LockError::ActionFailed {
            lock_id: *lock_id,
            action: action.action_type.to_string(),
            reason: e.to_string(),
        })
    }

    // ── Background loop ──────────────────────────────────────────────

    /// Spawn the scheduler loop on the current tokio runtime.
    pub async fn start(self: &Arc<Self>) -> LockResult<()> {
        let mut slot = self.loop_handle.lock().await;
        if let Some(handle) = slot.take() {
            if *self.running.read().await && !handle.is_finished() {
                *slot = Some(handle);
                return Err(LockError::AlreadyRunning);
            }
            // stopped but still parked on its interval
            drain_loop(handle).await;
        }

        *self.running.write().await = true;
        let handle = tokio::spawn(run_loop(
            Arc::downgrade(self),
            Arc::clone(&self.running),
            self.config.tick_interval(),
        ));
        *slot = Some(handle);

        info!(tick_interval_ms = self.config.tick_interval_ms, "Scheduler started");
        Ok(())
    }

    /// Ask the loop to exit after its current batch. Does not wait.
    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    /// Stop the loop and wait until it has exited.
    pub async fn shutdown(&self) {
        self.stop().await;
        let handle = self.loop_handle.lock().await.take();
        if let Some(handle) = handle {
            drain_loop(handle).await;
        }
        info!("Scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

/// Wait for a stopped loop to go away without sitting out its interval.
///
/// A batch runs under the state mutex with no await point inside it, so the
/// abort can only land between batches.
async fn drain_loop(handle: JoinHandle<()>) {
    handle.abort();
    match handle.await {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => {}
        Err(e) => error!(error = %e, "Scheduler loop terminated abnormally"),
    }
}

async fn run_loop(engine: Weak<TemporalLockEngine>, running: Arc<RwLock<bool>>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if !*running.read().await {
            break;
        }
        let Some(engine) = engine.upgrade() else {
            break;
        };

        let report = engine.tick().await;
        if report.processed() > 0 {
            debug!(
                dispatched = report.dispatched,
                failed = report.failed,
                skipped = report.skipped,
                remaining_due = report.remaining_due,
                "Scheduler tick"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use temporal_lock_types::EventCondition;

    fn engine() -> (TemporalLockEngine, ManualClock) {
        let clock = ManualClock::starting_now();
        let engine =
            TemporalLockEngine::with_clock(EngineConfig::testing(), Arc::new(clock.clone()))
                .unwrap();
        (engine, clock)
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let config = EngineConfig {
            max_ops_per_batch: 0,
            ..EngineConfig::testing()
        };
        assert!(matches!(
            TemporalLockEngine::new(config),
            Err(LockError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn creation_arms_checks_and_listeners() {
        let (engine, _clock) = engine();
        let lock = engine
            .create_hybrid_lock(HybridLockRequest::new(
                "capsule-1",
                60,
                vec![EventCondition::new("done")],
                120,
            ))
            .await
            .unwrap();

        let pending = engine.pending_operations(&lock.lock_id).await;
        assert_eq!(pending.len(), 2);
        assert!(engine.is_listening(&lock.lock_id).await);

        let stats = engine.statistics().await;
        assert_eq!(stats.pending_scheduled, 2);
        assert_eq!(stats.registered_listeners, 1);
    }

    #[tokio::test]
    async fn expiration_check_skips_canceled_lock() {
        let (engine, clock) = engine();
        let lock = engine
            .create_time_bound_lock(TimeBoundLockRequest::new("capsule-1", 5))
            .await
            .unwrap();
        let handle = engine
            .schedule_lock_operation(
                &lock.lock_id,
                LockOperation::Lock,
                clock.now(),
                Parameters::new(),
            )
            .await
            .unwrap();
        engine.cancel(&lock.lock_id).await.unwrap();

        clock.advance_secs(10);
        let report = engine.tick().await;
        // expiration check was withdrawn on cancel; the scheduled Lock is stale
        assert_eq!(report.skipped, 1);
        assert_eq!(report.dispatched, 0);
        assert_eq!(
            engine.get_lock(&lock.lock_id).await.unwrap().status,
            LockStatus::Canceled
        );
        assert!(engine
            .cancel_scheduled_operation(&handle.operation_id)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn explicit_unlock_runs_expiration_follow_up() {
        let (engine, _clock) = engine();
        let lock = engine
            .create_time_bound_lock(
                TimeBoundLockRequest::new("capsule-1", 60)
                    .with_expiration_action(LockAction::notify(Parameters::new())),
            )
            .await
            .unwrap();
        let mut rx = engine.subscribe();

        engine
            .execute_lock_operation(&lock.lock_id, LockOperation::Unlock, Parameters::new())
            .await
            .unwrap();

        let lock = engine.get_lock(&lock.lock_id).await.unwrap();
        assert_eq!(lock.status, LockStatus::Expired);
        assert!(lock.expiration_action_executed);
        assert_eq!(engine.pending_scheduled_count().await, 0);
        assert_eq!(rx.try_recv().unwrap().kind, NotificationKind::Expired);
        assert_eq!(rx.try_recv().unwrap().kind, NotificationKind::Notify);
    }

    #[tokio::test]
    async fn start_twice_is_rejected_and_shutdown_stops() {
        let engine = Arc::new(engine().0);
        engine.start().await.unwrap();
        assert!(engine.is_running().await);
        assert_eq!(engine.start().await.unwrap_err(), LockError::AlreadyRunning);

        engine.shutdown().await;
        assert!(!engine.is_running().await);
        engine.start().await.unwrap();
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn restart_right_after_stop_is_accepted() {
        let config = EngineConfig {
            tick_interval_ms: 5_000,
            ..EngineConfig::testing()
        };
        let engine = Arc::new(
            TemporalLockEngine::with_clock(config, Arc::new(ManualClock::starting_now())).unwrap(),
        );

        engine.start().await.unwrap();
        // let the loop take its immediate first tick and park on the interval
        tokio::task::yield_now().await;
        engine.stop().await;
        assert!(!engine.is_running().await);

        engine.start().await.unwrap();
        assert!(engine.is_running().await);
        assert_eq!(engine.start().await.unwrap_err(), LockError::AlreadyRunning);

        tokio::time::timeout(Duration::from_secs(1), engine.shutdown())
            .await
            .expect("shutdown does not wait out the interval");
        assert!(!engine.is_running().await);
    }
}
