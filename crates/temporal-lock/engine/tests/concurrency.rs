//! Concurrent event producers racing the scheduler over due hybrid locks.

mod common;

use std::collections::HashSet;
use temporal_lock_types::{
    EventCondition, HistoryOperation, HybridLockRequest, LockAction, LockEvent, LockId, LockStatus,
};

const LOCKS: usize = 24;
const PRODUCERS: usize = 4;

fn sealed(slot: usize) -> LockEvent {
    LockEvent::new("capsule_sealed").with_field("slot", slot)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn producers_and_scheduler_settle_each_lock_once() {
    let (engine, clock) = common::engine();

    let mut ids: Vec<LockId> = Vec::with_capacity(LOCKS);
    for slot in 0..LOCKS {
        let lock = engine
            .create_hybrid_lock(
                HybridLockRequest::new(
                    format!("capsule-{slot}"),
                    60,
                    vec![EventCondition::new("capsule_sealed").with_literal("slot", slot)],
                    600,
                )
                .with_expiration_action(LockAction::unlock())
                .with_trigger_action(LockAction::notify(Default::default())),
            )
            .await
            .unwrap();
        if slot % 2 == 0 {
            engine.activate(&lock.lock_id).await.unwrap();
        }
        ids.push(lock.lock_id);
    }

    // every duration deadline is due when the race starts
    clock.advance_secs(61);
    engine.start().await.unwrap();

    let mut producers = Vec::with_capacity(PRODUCERS);
    for producer in 0..PRODUCERS {
        let engine = engine.clone();
        producers.push(tokio::spawn(async move {
            let mut triggered = Vec::new();
            for step in 0..LOCKS {
                let slot = (step * 7 + producer * 5) % LOCKS;
                triggered.extend(engine.process_event(sealed(slot)).await);
                tokio::task::yield_now().await;
            }
            triggered
        }));
    }

    let ticker = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for _ in 0..LOCKS {
                engine.tick().await;
                tokio::task::yield_now().await;
            }
        })
    };

    let mut triggered = Vec::new();
    for producer in producers {
        triggered.extend(producer.await.unwrap());
    }
    ticker.await.unwrap();
    engine.shutdown().await;
    engine.tick().await;

    let unique: HashSet<_> = triggered.iter().copied().collect();
    assert_eq!(unique.len(), triggered.len(), "a lock was triggered twice");

    for id in &ids {
        let lock = engine.get_lock(id).await.unwrap();
        assert!(
            matches!(lock.status, LockStatus::Triggered | LockStatus::Expired),
            "{id} ended {}",
            lock.status
        );
        assert_eq!(lock.status == LockStatus::Triggered, unique.contains(id));

        let settled = engine
            .get_history(id)
            .await
            .unwrap()
            .iter()
            .filter(|record| {
                matches!(
                    record.operation,
                    HistoryOperation::Triggered | HistoryOperation::Expired
                )
            })
            .count();
        assert_eq!(settled, 1, "{id} settled {settled} times");

        match lock.status {
            LockStatus::Triggered => assert!(lock.trigger_action_executed),
            _ => assert!(lock.expiration_action_executed),
        }
        assert!(!engine.is_listening(id).await);
        assert!(engine.pending_operations(id).await.is_empty());
    }

    assert_eq!(engine.statistics().await.registered_listeners, 0);
}
