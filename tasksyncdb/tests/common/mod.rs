#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tasksyncdb::{
    ManualConnectivity, MemoryRemoteStore, Notifier, RetryPolicy, SyncEngine, SyncEngineBuilder,
    SyncStatus, Task, TaskPriority, TaskStatus,
};

/// Notifier that keeps every status it is given.
#[derive(Default)]
pub struct Recorder {
    seen: Mutex<Vec<SyncStatus>>,
}

impl Recorder {
    pub fn statuses(&self) -> Vec<SyncStatus> {
        self.seen.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<SyncStatus> {
        self.seen.lock().unwrap().last().cloned()
    }

    pub fn count(&self, status: &SyncStatus) -> usize {
        self.seen.lock().unwrap().iter().filter(|s| *s == status).count()
    }
}

impl Notifier for Recorder {
    fn notify(&self, status: SyncStatus) {
        self.seen.lock().unwrap().push(status);
    }
}

pub struct Harness {
    pub engine: Arc<SyncEngine>,
    pub remote: MemoryRemoteStore,
    pub connectivity: Arc<ManualConnectivity>,
    pub notifier: Arc<Recorder>,
}

impl Harness {
    pub async fn new(online: bool) -> Self {
        Self::with_policy(online, RetryPolicy::immediate()).await
    }

    pub async fn with_policy(online: bool, policy: RetryPolicy) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let remote = MemoryRemoteStore::new();
        let connectivity = Arc::new(ManualConnectivity::new(online));
        let engine = SyncEngineBuilder::new("sqlite::memory:")
            .with_remote(Arc::new(remote.clone()))
            .with_connectivity(connectivity.clone())
            .with_retry_policy(policy)
            .with_push_timeout(Duration::from_secs(2))
            .build()
            .await
            .expect("Failed to build engine");

        Self {
            engine: Arc::new(engine),
            remote,
            connectivity,
            notifier: Arc::new(Recorder::default()),
        }
    }

    pub async fn find(&self, id: &str) -> Option<Task> {
        self.engine.local().find(id).await.expect("lookup failed")
    }
}

pub fn task(id: &str, title: &str) -> Task {
    Task::new(id, title, TaskStatus::Pending, TaskPriority::High)
        .with_description("Crash on save")
        .with_assigned_to("sam")
}

/// Poll `check` until it returns true, failing after two seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
