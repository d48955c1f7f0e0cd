//! Hybrid lock from creation through expiry and compliance.

mod common;

use temporal_lock_types::{
    ComplianceStatus, EventCondition, HistoryOperation, HybridLockRequest, LockAction, LockStatus,
    NotificationKind,
};

#[tokio::test]
async fn hybrid_lock_expires_unlocks_and_stays_compliant() {
    let (engine, clock) = common::engine();
    let mut rx = engine.subscribe();

    let lock = engine
        .create_hybrid_lock(
            HybridLockRequest::new(
                "capsule-e2e",
                3600,
                vec![EventCondition::new("capsule_state_change").with_literal("state", "completed")],
                86400,
            )
            .with_expiration_action(LockAction::unlock()),
        )
        .await
        .unwrap();
    engine.activate(&lock.lock_id).await.unwrap();

    let report = engine
        .verify_temporal_compliance("capsule-e2e")
        .await
        .unwrap();
    assert!(report.is_compliant());

    clock.advance_secs(3601);
    let tick = engine.tick().await;
    assert_eq!(tick.dispatched, 1);

    let lock = engine.get_lock(&lock.lock_id).await.unwrap();
    assert_eq!(lock.status, LockStatus::Expired);
    assert!(lock.expiration_action_executed);
    assert!(lock.timestamps.unlocked_at.is_some());

    let history = engine.get_history(&lock.lock_id).await.unwrap();
    assert!(history
        .iter()
        .any(|record| record.operation == HistoryOperation::Unlock));
    let ops: Vec<_> = history.iter().map(|record| record.operation).collect();
    assert_eq!(
        ops,
        vec![
            HistoryOperation::Created,
            HistoryOperation::Activated,
            HistoryOperation::Expired,
            HistoryOperation::Unlock,
        ]
    );

    let report = engine
        .verify_temporal_compliance("capsule-e2e")
        .await
        .unwrap();
    assert_eq!(report.overall_status, ComplianceStatus::Compliant);
    assert_eq!(
        report.entry(&lock.lock_id).map(|entry| entry.compliance),
        Some(ComplianceStatus::Compliant)
    );

    // timeout check was dropped with the expiry
    assert_eq!(engine.pending_scheduled_count().await, 0);
    clock.advance_secs(86400);
    assert_eq!(engine.tick().await.processed(), 0);

    assert_eq!(rx.try_recv().unwrap().kind, NotificationKind::Expired);
}

#[tokio::test]
async fn active_lock_past_deadline_is_non_compliant_until_tick() {
    let (engine, clock) = common::engine();
    let lock = engine
        .create_time_bound_lock(
            temporal_lock_types::TimeBoundLockRequest::new("capsule-late", 60)
                .with_expiration_action(LockAction::unlock()),
        )
        .await
        .unwrap();
    engine.activate(&lock.lock_id).await.unwrap();

    clock.advance_secs(61);
    let report = engine
        .verify_temporal_compliance("capsule-late")
        .await
        .unwrap();
    assert_eq!(report.overall_status, ComplianceStatus::NonCompliant);

    engine.tick().await;
    let report = engine
        .verify_temporal_compliance("capsule-late")
        .await
        .unwrap();
    assert_eq!(report.overall_status, ComplianceStatus::Compliant);
}
