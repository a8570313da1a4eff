mod common;

use chrono::Duration;
use common::{Harness, task};
use tasksyncdb::{SaveOutcome, SyncError, SyncStatus, TaskDraft, TaskPriority, TaskStatus};

#[tokio::test]
async fn test_offline_create_stays_local() {
    let h = Harness::new(false).await;

    let t = tasksyncdb::Task::new("1700000000000", "Fix bug", TaskStatus::Pending, TaskPriority::High);
    let outcome = h.engine.save(t, false, h.notifier.as_ref()).await.unwrap();

    assert_eq!(outcome, SaveOutcome::SavedOffline);
    let stored = h.find("1700000000000").await.expect("task saved locally");
    assert_eq!(stored.title, "Fix bug");
    assert!(!stored.is_synced);
    assert!(h.remote.get("tasks/1700000000000").is_none());
    assert_eq!(h.remote.attempts_for("tasks/1700000000000"), 0);
    assert!(h.engine.retry_queue().is_empty());
    assert_eq!(h.notifier.statuses(), vec![SyncStatus::SavedOffline]);
}

#[tokio::test]
async fn test_online_save_pushes_and_marks_synced() {
    let h = Harness::new(true).await;

    let outcome = h
        .engine
        .save(task("1", "Fix bug"), false, h.notifier.as_ref())
        .await
        .unwrap();

    assert_eq!(outcome, SaveOutcome::Synced);
    let stored = h.find("1").await.unwrap();
    assert!(stored.is_synced);

    let pushed = h.remote.get("tasks/1").expect("task pushed");
    assert_eq!(pushed["_id"], "1");
    assert_eq!(pushed["title"], "Fix bug");
    assert_eq!(pushed["assignedTo"], "sam");
    assert_eq!(pushed["priority"], "High");
    assert!(pushed.get("isSynced").is_none());
    assert_eq!(
        pushed["updatedAt"],
        tasksyncdb::task::to_iso(&stored.updated_at).as_str()
    );
    assert_eq!(h.notifier.last(), Some(SyncStatus::SavedAndSynced));
}

#[tokio::test]
async fn test_failed_push_is_queued_and_kept_locally() {
    let h = Harness::new(true).await;
    h.remote.fail_next_writes(1);

    let outcome = h
        .engine
        .save(task("1", "Fix bug"), false, h.notifier.as_ref())
        .await
        .unwrap();

    assert_eq!(outcome, SaveOutcome::Queued);
    let stored = h.find("1").await.expect("local write survives push failure");
    assert!(!stored.is_synced);
    assert_eq!(h.engine.retry_queue().queued_ids(), vec!["1"]);
    assert_eq!(h.notifier.last(), Some(SyncStatus::QueuedForSync));
}

#[tokio::test]
async fn test_update_keeps_created_at_and_advances_updated_at() {
    let h = Harness::new(false).await;
    h.engine.save(task("1", "Fix bug"), false, &()).await.unwrap();
    let first = h.find("1").await.unwrap();

    let mut edit = task("1", "Fix the bug");
    edit.created_at = first.created_at + Duration::days(3);
    h.engine.save(edit, true, &()).await.unwrap();

    let stored = h.find("1").await.unwrap();
    assert_eq!(stored.title, "Fix the bug");
    assert_eq!(stored.created_at, first.created_at);
    assert!(stored.updated_at >= first.updated_at);
    assert_eq!(h.engine.tasks().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_task_validates_and_generates_ids() {
    let h = Harness::new(true).await;

    let err = h
        .engine
        .create_task(TaskDraft::new("Fix bug", "", "sam"), h.notifier.as_ref())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation { .. }));
    assert!(h.engine.tasks().await.unwrap().is_empty());

    let draft = TaskDraft::new("Fix bug", "Crash on save", "sam").with_priority(TaskPriority::Low);
    let (a, outcome) = h.engine.create_task(draft.clone(), &()).await.unwrap();
    let (b, _) = h.engine.create_task(draft, &()).await.unwrap();

    assert_eq!(outcome, SaveOutcome::Synced);
    assert_ne!(a.id, b.id);
    assert!(a.id.parse::<i64>().is_ok());
    assert!(a.is_synced);
    assert_eq!(h.remote.get(&format!("tasks/{}", a.id)).unwrap()["priority"], "Low");
}

#[tokio::test]
async fn test_update_task_requires_existing_record() {
    let h = Harness::new(false).await;
    let draft = TaskDraft::new("Fix bug", "Crash on save", "sam");

    let err = h.engine.update_task("missing", draft.clone(), &()).await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound(id) if id == "missing"));

    let (created, _) = h.engine.create_task(draft, &()).await.unwrap();
    let edit = TaskDraft::from(&created).with_status(TaskStatus::Done);
    let (updated, outcome) = h.engine.update_task(&created.id, edit, &()).await.unwrap();

    assert_eq!(outcome, SaveOutcome::SavedOffline);
    assert_eq!(updated.status, TaskStatus::Done);
    assert_eq!(updated.created_at, created.created_at);
}

#[tokio::test]
async fn test_load_for_edit_prefers_remote_when_online() {
    let h = Harness::new(false).await;
    h.engine.save(task("1", "Local title"), false, &()).await.unwrap();
    h.remote.apply_external(
        "tasks/1",
        serde_json::json!({"_id": "1", "title": "Remote title", "status": "Done"}),
    );

    let offline = h.engine.load_for_edit("1").await.unwrap().unwrap();
    assert_eq!(offline.title, "Local title");

    h.connectivity.set_connected(true);
    let online = h.engine.load_for_edit("1").await.unwrap().unwrap();
    assert_eq!(online.title, "Remote title");
    assert_eq!(online.status, TaskStatus::Done);

    assert!(h.engine.load_for_edit("nope").await.unwrap().is_none());
}
