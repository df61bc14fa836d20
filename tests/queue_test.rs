//! TaskQueue integration tests: claim ordering, claim races, conflicts,
//! and crash recovery.

mod helpers;

use std::sync::Arc;

use taskmill::adapters::sqlite::SqliteTaskStore;
use taskmill::application::{CancelOutcome, TaskQueue};
use taskmill::domain::errors::DomainError;
use taskmill::domain::models::{Task, TaskKind, TaskPayload, TaskSpec, TaskStatus};
use taskmill::domain::ports::TaskStore;

use helpers::database::{setup_file_db, setup_test_db, teardown_test_db};

fn spec(priority: i32) -> TaskSpec {
    TaskSpec {
        kind: TaskKind::FivePhaseTdd,
        priority,
        payload: TaskPayload {
            feature: "login".to_string(),
            target_url: "http://localhost:3000".to_string(),
            staging_url: None,
        },
    }
}

#[tokio::test]
async fn enqueue_rejects_missing_required_fields() {
    let pool = setup_test_db().await;
    let queue = TaskQueue::new(Arc::new(SqliteTaskStore::new(pool.clone())));

    let bad = TaskSpec {
        kind: TaskKind::FivePhaseTdd,
        priority: 5,
        payload: TaskPayload {
            feature: String::new(),
            target_url: "http://x".to_string(),
            staging_url: None,
        },
    };
    let err = queue.enqueue(bad).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidTask(_)));

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn claim_order_is_priority_then_fifo() {
    let pool = setup_test_db().await;
    let store = Arc::new(SqliteTaskStore::new(pool.clone()));
    let queue = TaskQueue::new(store.clone());

    // T1(prio=5, t=1), T2(prio=9, t=2), T3(prio=5, t=0): expect T2, T3, T1.
    let base = chrono::Utc::now();
    let mut t1 = Task::new(spec(5));
    t1.created_at = base + chrono::Duration::seconds(1);
    let mut t2 = Task::new(spec(9));
    t2.created_at = base + chrono::Duration::seconds(2);
    let mut t3 = Task::new(spec(5));
    t3.created_at = base;

    for t in [&t1, &t2, &t3] {
        store.put(t).await.unwrap();
    }

    let first = queue.claim("w").await.unwrap().unwrap();
    let second = queue.claim("w").await.unwrap().unwrap();
    let third = queue.claim("w").await.unwrap().unwrap();
    assert_eq!(first.id, t2.id);
    assert_eq!(second.id, t3.id);
    assert_eq!(third.id, t1.id);
    assert!(queue.claim("w").await.unwrap().is_none());

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn at_most_one_claimer_wins_a_single_task() {
    let (pool, _dir) = setup_file_db().await;
    let store = Arc::new(SqliteTaskStore::new(pool.clone()));
    let queue = TaskQueue::new(store);

    let task = queue.enqueue(spec(5)).await.unwrap();

    let mut claimers = Vec::new();
    for i in 0..10 {
        let queue = queue.clone();
        claimers.push(tokio::spawn(async move {
            queue.claim(&format!("worker-{i}")).await.unwrap()
        }));
    }

    let mut winners = 0;
    for handle in claimers {
        if let Some(claimed) = handle.await.unwrap() {
            assert_eq!(claimed.id, task.id);
            winners += 1;
        }
    }
    assert_eq!(winners, 1, "exactly one of 10 concurrent claimers must win");

    let loaded = queue.get(task.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, TaskStatus::Running);
    assert_eq!(loaded.attempts, 1);

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn completing_twice_is_a_conflict_and_preserves_state() {
    let pool = setup_test_db().await;
    let queue = TaskQueue::new(Arc::new(SqliteTaskStore::new(pool.clone())));

    let task = queue.enqueue(spec(5)).await.unwrap();
    queue.claim("w").await.unwrap().unwrap();

    queue.complete(task.id, serde_json::json!({"ok": true})).await.unwrap();

    let err = queue.complete(task.id, serde_json::json!({"ok": false})).await.unwrap_err();
    assert!(matches!(err, DomainError::TransitionConflict { .. }));

    let loaded = queue.get(task.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, TaskStatus::Completed);
    assert_eq!(loaded.result, Some(serde_json::json!({"ok": true})));

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn release_all_running_recovers_orphans() {
    let (pool, _dir) = setup_file_db().await;
    let store = Arc::new(SqliteTaskStore::new(pool.clone()));
    let queue = TaskQueue::new(store);

    let task = queue.enqueue(spec(5)).await.unwrap();
    queue.claim("dead-worker").await.unwrap().unwrap();

    // Simulate a restart: a fresh queue over the same store finds the
    // RUNNING row and releases it.
    let recovered = queue.release_all_running().await.unwrap();
    assert_eq!(recovered, 1);

    let loaded = queue.get(task.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, TaskStatus::Queued);
    assert!(loaded.worker_id.is_none());
    assert_eq!(loaded.attempts, 1, "attempts survive the release");

    // And it is claimable again.
    let reclaimed = queue.claim("live-worker").await.unwrap().unwrap();
    assert_eq!(reclaimed.id, task.id);
    assert_eq!(reclaimed.attempts, 2);

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn cancel_queued_goes_straight_to_cancelled() {
    let pool = setup_test_db().await;
    let queue = TaskQueue::new(Arc::new(SqliteTaskStore::new(pool.clone())));

    let task = queue.enqueue(spec(5)).await.unwrap();
    assert_eq!(queue.cancel(task.id).await.unwrap(), CancelOutcome::Cancelled);

    let loaded = queue.get(task.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, TaskStatus::Cancelled);

    // Cancelled tasks are never claimable.
    assert!(queue.claim("w").await.unwrap().is_none());
    // Cancelling again is idempotent.
    assert_eq!(queue.cancel(task.id).await.unwrap(), CancelOutcome::Cancelled);

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn cancel_running_sets_the_flag() {
    let pool = setup_test_db().await;
    let queue = TaskQueue::new(Arc::new(SqliteTaskStore::new(pool.clone())));

    let task = queue.enqueue(spec(5)).await.unwrap();
    queue.claim("w").await.unwrap().unwrap();

    assert_eq!(queue.cancel(task.id).await.unwrap(), CancelOutcome::Cancelling);
    let loaded = queue.get(task.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, TaskStatus::Running);
    assert!(loaded.cancel_requested);

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn cancel_terminal_is_a_conflict() {
    let pool = setup_test_db().await;
    let queue = TaskQueue::new(Arc::new(SqliteTaskStore::new(pool.clone())));

    let task = queue.enqueue(spec(5)).await.unwrap();
    queue.claim("w").await.unwrap().unwrap();
    queue.fail(task.id, "broken").await.unwrap();

    let err = queue.cancel(task.id).await.unwrap_err();
    assert!(matches!(err, DomainError::TransitionConflict { .. }));

    teardown_test_db(pool).await;
}
