//! Integration tests for model version allocation, promotion, and pruning.
//!
//! All tests require a running PostgreSQL instance and are ignored by
//! default.

use serde_json::json;

use lexiclass_db::test_fixtures::{seed_classification_setup, TestDatabase};
use lexiclass_db::{Error, ModelStatus, NewPrediction};

#[tokio::test]
#[ignore] // Requires database connection
async fn test_versions_increase_monotonically() {
    let test_db = TestDatabase::new().await;
    let (_project_id, field_id, _classes, _docs) =
        seed_classification_setup(&test_db.db, 0).await;

    let m1 = test_db.db.models.create_next_version(field_id).await.unwrap();
    let m2 = test_db.db.models.create_next_version(field_id).await.unwrap();
    let m3 = test_db.db.models.create_next_version(field_id).await.unwrap();

    assert_eq!(m1.version, 1);
    assert_eq!(m2.version, 2);
    assert_eq!(m3.version, 3);
    assert_eq!(m1.status, ModelStatus::Training);
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_failed_training_burns_its_version() {
    let test_db = TestDatabase::new().await;
    let (_project_id, field_id, _classes, _docs) =
        seed_classification_setup(&test_db.db, 0).await;

    let m1 = test_db.db.models.create_next_version(field_id).await.unwrap();
    test_db
        .db
        .models
        .mark_failed(m1.id, "not enough training data")
        .await
        .unwrap();

    let m2 = test_db.db.models.create_next_version(field_id).await.unwrap();
    assert_eq!(m2.version, 2);
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_concurrent_allocation_never_duplicates_versions() {
    let test_db = TestDatabase::new().await;
    let (_project_id, field_id, _classes, _docs) =
        seed_classification_setup(&test_db.db, 0).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let models = lexiclass_db::PgModelRepository::new(test_db.pool.clone());
        handles.push(tokio::spawn(async move {
            models.create_next_version(field_id).await
        }));
    }

    let mut versions = Vec::new();
    for handle in handles {
        versions.push(handle.await.unwrap().unwrap().version);
    }
    versions.sort_unstable();
    assert_eq!(versions, (1..=8).collect::<Vec<i32>>());
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_latest_ready_skips_training_and_failed() {
    let test_db = TestDatabase::new().await;
    let (_project_id, field_id, _classes, _docs) =
        seed_classification_setup(&test_db.db, 0).await;

    let m1 = test_db.db.models.create_next_version(field_id).await.unwrap();
    test_db
        .db
        .models
        .mark_ready(m1.id, Some(0.91), Some(json!({ "f1": 0.9 })))
        .await
        .unwrap();

    let m2 = test_db.db.models.create_next_version(field_id).await.unwrap();
    test_db.db.models.mark_failed(m2.id, "diverged").await.unwrap();

    // A third version is still training.
    test_db.db.models.create_next_version(field_id).await.unwrap();

    let latest = test_db
        .db
        .models
        .require_latest_ready(field_id)
        .await
        .unwrap();
    assert_eq!(latest.id, m1.id);
    assert_eq!(latest.version, 1);
    assert_eq!(latest.accuracy, Some(0.91));
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_no_ready_model_is_an_error() {
    let test_db = TestDatabase::new().await;
    let (_project_id, field_id, _classes, _docs) =
        seed_classification_setup(&test_db.db, 0).await;

    let m = test_db.db.models.create_next_version(field_id).await.unwrap();
    test_db.db.models.mark_failed(m.id, "bad data").await.unwrap();

    let err = test_db
        .db
        .models
        .require_latest_ready(field_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoReadyModel(id) if id == field_id));
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_prune_keeps_newest_versions() {
    let test_db = TestDatabase::new().await;
    let (_project_id, field_id, _classes, _docs) =
        seed_classification_setup(&test_db.db, 0).await;

    for _ in 0..4 {
        let m = test_db.db.models.create_next_version(field_id).await.unwrap();
        test_db.db.models.mark_ready(m.id, None, None).await.unwrap();
    }

    let pruned = test_db
        .db
        .models
        .prune_old_versions(field_id, 1)
        .await
        .unwrap();
    assert_eq!(pruned, 3);

    let remaining = test_db.db.models.list_for_field(field_id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].version, 4);
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_prediction_upsert_replaces_and_records_version() {
    let test_db = TestDatabase::new().await;
    let (_project_id, field_id, class_ids, document_ids) =
        seed_classification_setup(&test_db.db, 1).await;

    let m1 = test_db.db.models.create_next_version(field_id).await.unwrap();
    test_db.db.models.mark_ready(m1.id, None, None).await.unwrap();

    let first = test_db
        .db
        .predictions
        .upsert(
            field_id,
            &NewPrediction {
                document_id: document_ids[0],
                class_id: class_ids[0],
                model_id: m1.id,
                model_version: m1.version,
                confidence: Some(0.7),
                metadata: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(first.model_version, 1);

    let m2 = test_db.db.models.create_next_version(field_id).await.unwrap();
    test_db.db.models.mark_ready(m2.id, None, None).await.unwrap();

    let second = test_db
        .db
        .predictions
        .upsert(
            field_id,
            &NewPrediction {
                document_id: document_ids[0],
                class_id: class_ids[1],
                model_id: m2.id,
                model_version: m2.version,
                confidence: Some(0.95),
                metadata: None,
            },
        )
        .await
        .unwrap();

    // Same (document, field) row, replaced in place by the newer run.
    assert_eq!(first.id, second.id);
    assert_eq!(second.class_id, class_ids[1]);
    assert_eq!(second.model_version, 2);

    let all = test_db
        .db
        .predictions
        .list_for_document(document_ids[0])
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_index_status_guard_blocks_stale_transitions() {
    let test_db = TestDatabase::new().await;
    let (project_id, _field_id, _classes, document_ids) =
        seed_classification_setup(&test_db.db, 2).await;

    let marked = test_db
        .db
        .documents
        .mark_indexing_pending(project_id, false)
        .await
        .unwrap();
    assert_eq!(marked, 2);

    // An incremental follow-up skips documents that already finished.
    assert!(test_db
        .db
        .documents
        .complete_indexing(document_ids[0])
        .await
        .unwrap());
    let remarked = test_db
        .db
        .documents
        .mark_indexing_pending(project_id, true)
        .await
        .unwrap();
    assert_eq!(remarked, 1);
    let marked_again = test_db
        .db
        .documents
        .mark_indexing_pending(project_id, false)
        .await
        .unwrap();
    assert_eq!(marked_again, 2);

    assert!(test_db
        .db
        .documents
        .complete_indexing(document_ids[0])
        .await
        .unwrap());

    // Already INDEXED: a stale completion or failure is a no-op.
    assert!(!test_db
        .db
        .documents
        .complete_indexing(document_ids[0])
        .await
        .unwrap());
    assert!(!test_db
        .db
        .documents
        .fail_indexing(document_ids[0])
        .await
        .unwrap());

    assert!(test_db
        .db
        .documents
        .fail_indexing(document_ids[1])
        .await
        .unwrap());
    test_db.cleanup().await;
}
