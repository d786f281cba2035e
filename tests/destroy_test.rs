mod common;

use common::*;
use groundwork::{EngineError, StateBackend};

#[tokio::test]
async fn destroy_walks_reverse_creation_order() {
    let (engine, store) = test_engine().await;
    let log = CallLog::default();
    let bucket = engine.resource(Bucket::new(log.clone()));
    let scope = quiet_scope("app");

    // r2 consumes r1's output, r3 consumes r2's — creation order is the
    // dependency order.
    let r1 = bucket.apply(&scope, "r1", BucketInput::named("base")).await.unwrap();
    let r2 = bucket
        .apply(&scope, "r2", BucketInput::named(&format!("{}-mid", r1.name)))
        .await
        .unwrap();
    bucket
        .apply(&scope, "r3", BucketInput::named(&format!("{}-top", r2.name)))
        .await
        .unwrap();

    let summary = engine.destroy(&scope).await.unwrap();
    assert_eq!(summary.destroyed, 3);
    assert_eq!(summary.failed, 0);

    assert_eq!(log.delete_order(), vec!["app/r3", "app/r2", "app/r1"]);
    for id in ["r1", "r2", "r3"] {
        let identity = scope.identity(id, "bucket").unwrap();
        assert!(store.get(&identity).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn destroying_a_destroyed_scope_is_a_noop() {
    let (engine, _store) = test_engine().await;
    let log = CallLog::default();
    let bucket = engine.resource(Bucket::new(log.clone()));
    let scope = quiet_scope("app");

    bucket.apply(&scope, "r1", BucketInput::named("a")).await.unwrap();
    engine.destroy(&scope).await.unwrap();

    let again = engine.destroy(&scope).await.unwrap();
    assert_eq!(again.destroyed, 0);
    assert_eq!(again.failed, 0);
    // Exactly one delete ever reached the handler.
    assert_eq!(log.delete_order(), vec!["app/r1"]);
}

#[tokio::test]
async fn children_are_destroyed_before_parent_resources() {
    let (engine, _store) = test_engine().await;
    let log = CallLog::default();
    let bucket = engine.resource(Bucket::new(log.clone()));
    let root = quiet_scope("app");
    let child = root.child("svc").unwrap();

    bucket.apply(&root, "p1", BucketInput::named("p1")).await.unwrap();
    bucket.apply(&child, "c1", BucketInput::named("c1")).await.unwrap();

    let summary = engine.destroy(&root).await.unwrap();
    assert_eq!(summary.destroyed, 2);
    assert_eq!(log.delete_order(), vec!["app/svc/c1", "app/p1"]);
}

#[tokio::test]
async fn failed_delete_halts_the_branch_and_keeps_records() {
    let (engine, store) = test_engine().await;
    let log = CallLog::default();
    let bucket = engine.resource(Bucket::new(log.clone()));
    let scope = quiet_scope("app");

    bucket.apply(&scope, "r1", BucketInput::named("r1")).await.unwrap();
    let mut poisoned = BucketInput::named("r2");
    poisoned.fail_delete = true;
    bucket.apply(&scope, "r2", poisoned).await.unwrap();
    bucket.apply(&scope, "r3", BucketInput::named("r3")).await.unwrap();

    let err = engine.destroy(&scope).await.unwrap_err();
    assert!(matches!(err, EngineError::Delete { .. }));

    // r3 went first and is gone; r2 failed and is kept; r1 was never tried.
    assert_eq!(log.delete_order(), vec!["app/r3", "app/r2"]);
    let gone = scope.identity("r3", "bucket").unwrap();
    assert!(store.get(&gone).await.unwrap().is_none());
    for id in ["r1", "r2"] {
        let identity = scope.identity(id, "bucket").unwrap();
        assert!(store.get(&identity).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn sibling_branches_continue_after_a_failure() {
    let (engine, store) = test_engine().await;
    let log = CallLog::default();
    let bucket = engine.resource(Bucket::new(log.clone()));
    let root = quiet_scope("app");
    let healthy = root.child("healthy").unwrap();
    let broken = root.child("broken").unwrap();

    bucket.apply(&root, "p1", BucketInput::named("p1")).await.unwrap();
    bucket.apply(&healthy, "a1", BucketInput::named("a1")).await.unwrap();
    let mut poisoned = BucketInput::named("b1");
    poisoned.fail_delete = true;
    bucket.apply(&broken, "b1", poisoned).await.unwrap();

    let err = engine.destroy(&root).await.unwrap_err();
    assert!(matches!(err, EngineError::Delete { .. }));

    // The broken branch failed, the healthy sibling still tore down, and
    // the parent's own resource was left standing (a failed child may
    // still bind it).
    let a1 = healthy.identity("a1", "bucket").unwrap();
    assert!(store.get(&a1).await.unwrap().is_none());
    let b1 = broken.identity("b1", "bucket").unwrap();
    assert!(store.get(&b1).await.unwrap().is_some());
    let p1 = root.identity("p1", "bucket").unwrap();
    assert!(store.get(&p1).await.unwrap().is_some());
    assert!(!log.delete_order().contains(&"app/p1".to_string()));
}

#[tokio::test]
async fn destroy_stored_tears_down_from_state_alone() {
    let (engine, store) = test_engine().await;
    let log = CallLog::default();
    let bucket = engine.resource(Bucket::new(log.clone()));
    let scope = quiet_scope("app");

    bucket.apply(&scope, "r1", BucketInput::named("r1")).await.unwrap();
    bucket.apply(&scope, "r2", BucketInput::named("r2")).await.unwrap();

    // A later run that never re-declared the resources still tears them
    // down from persisted state, newest first.
    let summary = engine
        .destroy_stored(&["app".to_string()], true)
        .await
        .unwrap();
    assert_eq!(summary.destroyed, 2);
    assert_eq!(log.delete_order(), vec!["app/r2", "app/r1"]);
    assert!(store.list(&["app".to_string()]).await.unwrap().is_empty());
}

#[tokio::test]
async fn destroy_stored_with_unregistered_kind_fails() {
    let (engine, store) = test_engine().await;
    let bucket = engine.resource(Bucket::new(CallLog::default()));
    let scope = quiet_scope("app");
    bucket.apply(&scope, "r1", BucketInput::named("r1")).await.unwrap();

    // A fresh engine over the same store has no handler for "bucket".
    let bare_store: std::sync::Arc<dyn StateBackend> = store.clone();
    let bare = groundwork::Engine::new(bare_store);
    let err = bare
        .destroy_stored(&["app".to_string()], true)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownKind { .. }));
}
