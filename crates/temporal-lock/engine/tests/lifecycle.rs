//! Lock creation, lifecycle transitions and policy bounds.

mod common;

use chrono::Duration;
use temporal_lock_types::{
    EventBoundLockRequest, EventCondition, HistoryOperation, HybridLockRequest, LockError,
    LockFilter, LockKind, LockOperation, LockStatus, Parameters, TimeBoundLockRequest,
};

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn time_bound_lock_starts_pending_with_deadline() {
    let (engine, _clock) = common::engine();

    let lock = engine
        .create_time_bound_lock(TimeBoundLockRequest::new("capsule-1", 600))
        .await
        .unwrap();

    assert_eq!(lock.status, LockStatus::Pending);
    assert_eq!(lock.kind(), LockKind::TimeBound);
    assert_eq!(
        lock.expiration_at(),
        Some(lock.created_at + Duration::seconds(600))
    );

    let history = engine.get_history(&lock.lock_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].operation, HistoryOperation::Created);
}

#[tokio::test]
async fn duration_over_maximum_is_rejected() {
    let (engine, _clock) = common::engine();
    let max = engine.config().max_duration_seconds;

    let err = engine
        .create_time_bound_lock(TimeBoundLockRequest::new("capsule-1", max + 1))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        LockError::BoundsExceeded {
            field: "duration_seconds",
            value: max + 1,
            max,
        }
    );
    assert!(engine.get_locks_for_capsule("capsule-1").await.is_empty());
}

#[tokio::test]
async fn too_many_conditions_are_rejected() {
    let (engine, _clock) = common::engine();
    let max = engine.config().max_events_per_lock;
    let conditions = (0..=max)
        .map(|i| EventCondition::new(format!("event-{i}")))
        .collect();

    let err = engine
        .create_event_bound_lock(EventBoundLockRequest::new("capsule-1", conditions, 60))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LockError::BoundsExceeded {
            field: "event_conditions",
            ..
        }
    ));
}

#[tokio::test]
async fn timeout_over_maximum_is_rejected() {
    let (engine, _clock) = common::engine();
    let max = engine.config().max_timeout_seconds;

    let err = engine
        .create_hybrid_lock(HybridLockRequest::new(
            "capsule-1",
            60,
            vec![EventCondition::new("done")],
            max + 1,
        ))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LockError::BoundsExceeded {
            field: "timeout_seconds",
            ..
        }
    ));
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn activate_deactivate_cancel() {
    let (engine, _clock) = common::engine();
    let lock = engine
        .create_time_bound_lock(TimeBoundLockRequest::new("capsule-1", 600))
        .await
        .unwrap();
    let id = lock.lock_id;

    let active = engine.activate(&id).await.unwrap();
    assert_eq!(active.status, LockStatus::Active);
    assert!(active.timestamps.activated_at.is_some());

    let pending = engine.deactivate(&id).await.unwrap();
    assert_eq!(pending.status, LockStatus::Pending);

    let canceled = engine.cancel(&id).await.unwrap();
    assert_eq!(canceled.status, LockStatus::Canceled);
    assert_eq!(engine.pending_scheduled_count().await, 0);

    let err = engine.activate(&id).await.unwrap_err();
    assert_eq!(
        err,
        LockError::InvalidTransition {
            lock_id: id,
            from: LockStatus::Canceled,
            action: "activate",
        }
    );

    let ops: Vec<_> = engine
        .get_history(&id)
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.operation)
        .collect();
    assert_eq!(
        ops,
        vec![
            HistoryOperation::Created,
            HistoryOperation::Activated,
            HistoryOperation::Deactivated,
            HistoryOperation::Canceled,
        ]
    );
}

#[tokio::test]
async fn deactivate_requires_active() {
    let (engine, _clock) = common::engine();
    let lock = engine
        .create_time_bound_lock(TimeBoundLockRequest::new("capsule-1", 600))
        .await
        .unwrap();

    let err = engine.deactivate(&lock.lock_id).await.unwrap_err();
    assert!(matches!(err, LockError::InvalidTransition { .. }));
    assert_eq!(
        engine.get_lock(&lock.lock_id).await.unwrap().status,
        LockStatus::Pending
    );
}

#[tokio::test]
async fn cancel_unregisters_listeners() {
    let (engine, _clock) = common::engine();
    let lock = engine
        .create_event_bound_lock(EventBoundLockRequest::new(
            "capsule-1",
            vec![EventCondition::new("done")],
            600,
        ))
        .await
        .unwrap();
    assert!(engine.is_listening(&lock.lock_id).await);

    engine.cancel(&lock.lock_id).await.unwrap();
    assert!(!engine.is_listening(&lock.lock_id).await);
}

#[tokio::test]
async fn extend_moves_the_expiration_check() {
    let (engine, clock) = common::engine();
    let lock = engine
        .create_time_bound_lock(TimeBoundLockRequest::new("capsule-1", 60))
        .await
        .unwrap();
    engine.activate(&lock.lock_id).await.unwrap();

    let extended = engine.extend_lock(&lock.lock_id, 60).await.unwrap();
    assert_eq!(
        extended.expiration_at(),
        Some(lock.created_at + Duration::seconds(120))
    );

    clock.advance_secs(61);
    engine.tick().await;
    assert_eq!(
        engine.get_lock(&lock.lock_id).await.unwrap().status,
        LockStatus::Active
    );

    clock.advance_secs(60);
    engine.tick().await;
    assert_eq!(
        engine.get_lock(&lock.lock_id).await.unwrap().status,
        LockStatus::Expired
    );
}

#[tokio::test]
async fn extend_rejects_event_bound_lock() {
    let (engine, _clock) = common::engine();
    let lock = engine
        .create_event_bound_lock(EventBoundLockRequest::new(
            "capsule-1",
            vec![EventCondition::new("done")],
            600,
        ))
        .await
        .unwrap();

    let err = engine.extend_lock(&lock.lock_id, 10).await.unwrap_err();
    assert!(matches!(err, LockError::InvalidTransition { action: "extend", .. }));
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn escalate_then_deescalate_only_touches_known_privileges() {
    let (engine, _clock) = common::engine();
    let lock = engine
        .create_time_bound_lock(TimeBoundLockRequest::new("capsule-1", 600))
        .await
        .unwrap();

    let escalate: Parameters = serde_json::from_value(serde_json::json!({
        "privileges": { "admin_access": "high" }
    }))
    .unwrap();
    engine
        .execute_lock_operation(&lock.lock_id, LockOperation::Escalate, escalate)
        .await
        .unwrap();

    let deescalate: Parameters = serde_json::from_value(serde_json::json!({
        "privileges": { "admin_access": "low", "unknown_priv": "low" }
    }))
    .unwrap();
    engine
        .execute_lock_operation(&lock.lock_id, LockOperation::Deescalate, deescalate)
        .await
        .unwrap();

    let lock = engine.get_lock(&lock.lock_id).await.unwrap();
    assert_eq!(lock.privileges.get("admin_access").map(String::as_str), Some("low"));
    assert!(!lock.privileges.contains_key("unknown_priv"));
}

#[tokio::test]
async fn malformed_privileges_are_invalid_parameters() {
    let (engine, _clock) = common::engine();
    let lock = engine
        .create_time_bound_lock(TimeBoundLockRequest::new("capsule-1", 600))
        .await
        .unwrap();

    let params: Parameters =
        serde_json::from_value(serde_json::json!({ "privileges": ["admin"] })).unwrap();
    let err = engine
        .execute_lock_operation(&lock.lock_id, LockOperation::Escalate, params)
        .await
        .unwrap_err();

    assert!(matches!(err, LockError::InvalidParameters(_)));
    // only the creation record
    assert_eq!(engine.get_history(&lock.lock_id).await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_ids_and_capsules() {
    let (engine, _clock) = common::engine();
    let stranger = temporal_lock_types::LockId::generate();

    assert_eq!(
        engine.get_lock(&stranger).await.unwrap_err(),
        LockError::LockNotFound(stranger)
    );
    assert!(engine.get_locks_for_capsule("nobody").await.is_empty());
    assert!(matches!(
        engine.verify_temporal_compliance("nobody").await,
        Err(LockError::CapsuleNotFound(_))
    ));
}

#[tokio::test]
async fn capsule_index_and_filters() {
    let (engine, _clock) = common::engine();
    let first = engine
        .create_time_bound_lock(TimeBoundLockRequest::new("capsule-a", 600))
        .await
        .unwrap();
    let second = engine
        .create_event_bound_lock(EventBoundLockRequest::new(
            "capsule-a",
            vec![EventCondition::new("done")],
            600,
        ))
        .await
        .unwrap();
    engine
        .create_time_bound_lock(TimeBoundLockRequest::new("capsule-b", 600))
        .await
        .unwrap();
    engine.activate(&second.lock_id).await.unwrap();

    let ids: Vec<_> = engine
        .get_locks_for_capsule("capsule-a")
        .await
        .into_iter()
        .map(|lock| lock.lock_id)
        .collect();
    assert_eq!(ids, vec![first.lock_id, second.lock_id]);

    let active = engine
        .list_locks(LockFilter {
            status: Some(LockStatus::Active),
            ..LockFilter::default()
        })
        .await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].lock_id, second.lock_id);

    let stats = engine.statistics().await;
    assert_eq!(stats.total_locks, 3);
    assert_eq!(stats.by_status.get("pending"), Some(&2));
    assert_eq!(stats.by_status.get("active"), Some(&1));
    assert_eq!(stats.by_kind.get("time_bound"), Some(&2));
    assert_eq!(stats.registered_listeners, 1);
}
