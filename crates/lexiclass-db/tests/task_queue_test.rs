//! Integration tests for the task queue acting as the broker.
//!
//! All tests require a running PostgreSQL instance (see test_fixtures) and
//! are ignored by default.

use serde_json::json;
use uuid::Uuid;

use lexiclass_db::test_fixtures::TestDatabase;
use lexiclass_db::{
    BrokerState, QueuePolicy, SubmitTask, TaskBroker, TaskStatus, WorkCategory,
};

fn submission(project_id: i64, category: WorkCategory) -> SubmitTask {
    SubmitTask {
        task_name: format!("lexiclass.{}", category.as_str()),
        project_id,
        payload: json!({ "project_id": project_id }),
        policy: QueuePolicy::for_category(category).clone(),
    }
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_submit_and_get() {
    let test_db = TestDatabase::new().await;
    let project = test_db.db.projects.create("p", None).await.unwrap();

    let task_id = test_db
        .db
        .tasks
        .submit(submission(project.id, WorkCategory::Indexing))
        .await
        .unwrap();

    let task = test_db.db.tasks.get(task_id).await.unwrap().unwrap();
    assert_eq!(task.state, BrokerState::Pending);
    assert_eq!(task.queue, "lexiclass.indexing");
    assert_eq!(task.routing_key, "task.indexing");
    assert_eq!(task.priority, 5);
    assert_eq!(task.retry_count, 0);
    assert_eq!(task.max_retries, 3);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_claim_respects_priority_then_age() {
    let test_db = TestDatabase::new().await;
    let project = test_db.db.projects.create("p", None).await.unwrap();

    // Training (prio 3) submitted first, prediction (prio 7) second.
    let training = test_db
        .db
        .tasks
        .submit(submission(project.id, WorkCategory::Training))
        .await
        .unwrap();
    let prediction = test_db
        .db
        .tasks
        .submit(submission(project.id, WorkCategory::Prediction))
        .await
        .unwrap();

    let first = test_db.db.tasks.claim_next(&[]).await.unwrap().unwrap();
    assert_eq!(first.id, prediction);

    let second = test_db.db.tasks.claim_next(&[]).await.unwrap().unwrap();
    assert_eq!(second.id, training);

    assert!(test_db.db.tasks.claim_next(&[]).await.unwrap().is_none());
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_claim_filters_by_queue() {
    let test_db = TestDatabase::new().await;
    let project = test_db.db.projects.create("p", None).await.unwrap();

    test_db
        .db
        .tasks
        .submit(submission(project.id, WorkCategory::Training))
        .await
        .unwrap();

    let none = test_db
        .db
        .tasks
        .claim_next(&["lexiclass.indexing"])
        .await
        .unwrap();
    assert!(none.is_none());

    let claimed = test_db
        .db
        .tasks
        .claim_next(&["lexiclass.training"])
        .await
        .unwrap();
    assert!(claimed.is_some());
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_fail_requeues_until_retry_ceiling() {
    let test_db = TestDatabase::new().await;
    let project = test_db.db.projects.create("p", None).await.unwrap();

    // Training policy allows 2 retries.
    let task_id = test_db
        .db
        .tasks
        .submit(submission(project.id, WorkCategory::Training))
        .await
        .unwrap();

    for expected_retry in 1..=2 {
        let claimed = test_db.db.tasks.claim_next(&[]).await.unwrap().unwrap();
        assert_eq!(claimed.id, task_id);
        test_db
            .db
            .tasks
            .fail(task_id, json!("worker exploded"))
            .await
            .unwrap();

        let task = test_db.db.tasks.get(task_id).await.unwrap().unwrap();
        assert_eq!(task.state, BrokerState::Pending);
        assert_eq!(task.retry_count, expected_retry);
        // Re-queued after a failed attempt reports RETRY.
        assert_eq!(
            TaskStatus::from_broker(task.state, task.retry_count),
            TaskStatus::Retry
        );
    }

    // Third failure exhausts the policy.
    test_db.db.tasks.claim_next(&[]).await.unwrap().unwrap();
    test_db
        .db
        .tasks
        .fail(task_id, json!("worker exploded"))
        .await
        .unwrap();

    let task = test_db.db.tasks.get(task_id).await.unwrap().unwrap();
    assert_eq!(task.state, BrokerState::Failed);
    assert!(task.completed_at.is_some());
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_complete_stores_result() {
    let test_db = TestDatabase::new().await;
    let project = test_db.db.projects.create("p", None).await.unwrap();

    let task_id = test_db
        .db
        .tasks
        .submit(submission(project.id, WorkCategory::Indexing))
        .await
        .unwrap();
    test_db.db.tasks.claim_next(&[]).await.unwrap().unwrap();
    test_db
        .db
        .tasks
        .complete(task_id, Some(json!({ "indexed": 10 })))
        .await
        .unwrap();

    let task = test_db.db.tasks.get(task_id).await.unwrap().unwrap();
    assert_eq!(task.state, BrokerState::Completed);
    assert_eq!(task.progress_percent, 100);
    assert_eq!(task.result, Some(json!({ "indexed": 10 })));
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_revoke_leaves_terminal_tasks_alone() {
    let test_db = TestDatabase::new().await;
    let project = test_db.db.projects.create("p", None).await.unwrap();

    let task_id = test_db
        .db
        .tasks
        .submit(submission(project.id, WorkCategory::Indexing))
        .await
        .unwrap();
    test_db.db.tasks.claim_next(&[]).await.unwrap().unwrap();
    test_db.db.tasks.complete(task_id, None).await.unwrap();

    test_db.db.tasks.revoke(task_id).await.unwrap();

    let task = test_db.db.tasks.get(task_id).await.unwrap().unwrap();
    assert_eq!(task.state, BrokerState::Completed);
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_revoke_pending_task() {
    let test_db = TestDatabase::new().await;
    let project = test_db.db.projects.create("p", None).await.unwrap();

    let task_id = test_db
        .db
        .tasks
        .submit(submission(project.id, WorkCategory::Prediction))
        .await
        .unwrap();
    test_db.db.tasks.revoke(task_id).await.unwrap();

    let task = test_db.db.tasks.get(task_id).await.unwrap().unwrap();
    assert_eq!(task.state, BrokerState::Cancelled);
    assert!(task.completed_at.is_some());

    // A cancelled task is never claimable.
    assert!(test_db.db.tasks.claim_next(&[]).await.unwrap().is_none());
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_revoked_running_task_is_not_resurrected() {
    let test_db = TestDatabase::new().await;
    let project = test_db.db.projects.create("p", None).await.unwrap();

    let task_id = test_db
        .db
        .tasks
        .submit(submission(project.id, WorkCategory::Indexing))
        .await
        .unwrap();
    test_db.db.tasks.claim_next(&[]).await.unwrap().unwrap();

    // Revoke while the worker still holds the task.
    test_db.db.tasks.revoke(task_id).await.unwrap();

    // The worker finishes anyway; neither outcome may overwrite the
    // cancellation.
    test_db
        .db
        .tasks
        .complete(task_id, Some(json!({ "indexed": 1 })))
        .await
        .unwrap();
    let task = test_db.db.tasks.get(task_id).await.unwrap().unwrap();
    assert_eq!(task.state, BrokerState::Cancelled);
    assert_eq!(task.result, None);

    test_db
        .db
        .tasks
        .fail(task_id, json!("worker exploded"))
        .await
        .unwrap();
    let task = test_db.db.tasks.get(task_id).await.unwrap().unwrap();
    assert_eq!(task.state, BrokerState::Cancelled);
    assert_eq!(task.retry_count, 0);

    // Still not claimable.
    assert!(test_db.db.tasks.claim_next(&[]).await.unwrap().is_none());
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_active_for_project_only_reports_running() {
    let test_db = TestDatabase::new().await;
    let project = test_db.db.projects.create("p", None).await.unwrap();
    let other = test_db.db.projects.create("q", None).await.unwrap();

    let running_id = test_db
        .db
        .tasks
        .submit(submission(project.id, WorkCategory::Indexing))
        .await
        .unwrap();
    test_db
        .db
        .tasks
        .submit(submission(project.id, WorkCategory::Training))
        .await
        .unwrap();
    test_db
        .db
        .tasks
        .submit(submission(other.id, WorkCategory::Indexing))
        .await
        .unwrap();

    // Claim only the higher-priority indexing task of the first project.
    let claimed = test_db
        .db
        .tasks
        .claim_next(&["lexiclass.indexing"])
        .await
        .unwrap()
        .unwrap();
    // Two indexing tasks exist; claim until we hold the first project's one.
    let mut held = vec![claimed];
    while held.last().map(|t| t.project_id) != Some(project.id) {
        held.push(
            test_db
                .db
                .tasks
                .claim_next(&["lexiclass.indexing"])
                .await
                .unwrap()
                .unwrap(),
        );
    }

    let active = test_db
        .db
        .tasks
        .active_for_project(project.id)
        .await
        .unwrap();
    assert!(active.iter().any(|t| t.task_id == running_id));
    assert!(active.iter().all(|t| t.status == TaskStatus::Started));
    assert!(active.iter().all(|t| t.started_at.is_some()));
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_state_for_unknown_task() {
    let test_db = TestDatabase::new().await;
    let state = test_db.db.tasks.state(Uuid::new_v4()).await.unwrap();
    assert!(state.is_none());
    test_db.cleanup().await;
}
