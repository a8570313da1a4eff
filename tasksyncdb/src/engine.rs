//! The sync engine: reconciles the Local Store with the Remote Store.
//!
//! Three operations are exposed to the application:
//!
//! - [`SyncEngine::ingest_from_remote`]: follow remote snapshots into the
//!   Local Store.
//! - [`SyncEngine::save`]: write locally, then push if online.
//! - [`SyncEngine::sync_all`]: push every unsynced record and drain the
//!   retry queue.
//!
//! Network failures never surface as errors from these calls; they become
//! [`SaveOutcome`]/[`SyncOutcome`] values and retry queue entries. Only Local
//! Store failures are returned as [`SyncError`].

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;

use crate::config::{RetryPolicy, SyncConfig};
use crate::conflict;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{RemoteError, SyncError, SyncResult};
use crate::ingest;
use crate::messages::{IngestReport, Notifier, SaveOutcome, SyncOutcome, SyncReport, SyncStatus};
use crate::remote::{RemoteStore, RemoteTask};
use crate::retry::RetryQueue;
use crate::store::LocalStore;
use crate::subscription::Subscription;
use crate::task::{Task, TaskIdGenerator, now_millis};

pub struct SyncEngine {
    local: LocalStore,
    remote: Arc<dyn RemoteStore>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    retry_queue: RetryQueue,
    ids: TaskIdGenerator,
    config: SyncConfig,
}

impl SyncEngine {
    /// Build an engine around stores owned by the caller.
    pub fn new(
        local: LocalStore,
        remote: Arc<dyn RemoteStore>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        config: SyncConfig,
    ) -> Self {
        Self {
            local,
            remote,
            connectivity,
            retry_queue: RetryQueue::new(),
            ids: TaskIdGenerator::new(),
            config,
        }
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    pub fn connectivity(&self) -> &Arc<dyn ConnectivityMonitor> {
        &self.connectivity
    }

    pub fn retry_queue(&self) -> &RetryQueue {
        &self.retry_queue
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub(crate) fn next_task_id(&self) -> String {
        self.ids.next_id()
    }

    /// Point-in-time connectivity. Query errors and timeouts count as offline.
    pub async fn is_connected(&self) -> bool {
        let timeout = self.config.connectivity_timeout();
        match tokio::time::timeout(timeout, self.connectivity.current_status()).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => {
                log::warn!("Connectivity check failed, assuming offline: {}", e);
                false
            }
            Err(_) => {
                log::warn!("Connectivity check timed out after {:?}, assuming offline", timeout);
                false
            }
        }
    }

    /// Follow remote snapshots of the tasks collection into the Local Store.
    ///
    /// Stream errors and failed batches are logged; the subscription keeps
    /// running until the returned handle is dropped.
    pub fn ingest_from_remote(self: &Arc<Self>) -> Subscription {
        let engine = Arc::clone(self);
        let mut snapshots = self.remote.subscribe(&self.config.tasks_path);
        Subscription::new(tokio::spawn(async move {
            while let Some(snapshot) = snapshots.next().await {
                match snapshot {
                    Ok(snapshot) => {
                        if let Err(e) = engine.ingest_snapshot(&snapshot).await {
                            log::error!("Remote to local sync failed: {}", e);
                        }
                    }
                    Err(e) => log::error!("Remote subscription error: {}", e),
                }
            }
            log::info!("Remote subscription on {} ended", engine.config.tasks_path);
        }))
    }

    /// Upsert every record of one remote snapshot, skipping malformed ones.
    pub async fn ingest_snapshot(&self, snapshot: &Value) -> SyncResult<IngestReport> {
        Ok(ingest::ingest_snapshot(&self.local, snapshot).await?)
    }

    /// Read the remote collection once and ingest it.
    pub async fn pull_once(&self) -> SyncResult<IngestReport> {
        let snapshot = self
            .remote
            .read_once(&self.config.tasks_path)
            .await?
            .unwrap_or(Value::Null);
        self.ingest_snapshot(&snapshot).await
    }

    /// Save `task` locally, then push it if the device is online.
    ///
    /// The caller resolves `id` (fresh for a create, existing for an edit).
    /// With `is_update`, the stored `created_at` wins over the one supplied.
    /// The local write always lands before any network attempt and is never
    /// undone by a failed push.
    pub async fn save(
        &self,
        mut task: Task,
        is_update: bool,
        notify: &dyn Notifier,
    ) -> SyncResult<SaveOutcome> {
        let connected = self.is_connected().await;

        let txn = self.local.begin().await?;
        let stored = crate::store::find_in(&txn, &task.id).await?;
        let now = now_millis();
        // Strictly increasing per record, even for edits within one millisecond.
        task.updated_at = match &stored {
            Some(stored) => now.max(stored.updated_at + chrono::Duration::milliseconds(1)),
            None => now,
        };
        if let (true, Some(stored)) = (is_update, &stored) {
            task.created_at = stored.created_at;
        }
        // Only a confirmed push may set the flag.
        task.is_synced = false;
        crate::store::upsert_in(&txn, &task).await?;
        txn.commit().await?;
        self.local
            .notify_change(crate::messages::ChangeKind::LocalWrite, vec![task.id.clone()]);

        if !connected {
            log::info!("Saved task {} offline", task.id);
            notify.notify(SyncStatus::SavedOffline);
            return Ok(SaveOutcome::SavedOffline);
        }

        match self.push(&task).await {
            Ok(()) => {
                self.local.mark_synced(&task.id, task.updated_at).await?;
                log::info!("Saved and synced task {}", task.id);
                notify.notify(SyncStatus::SavedAndSynced);
                Ok(SaveOutcome::Synced)
            }
            Err(e) => {
                log::warn!("Push of task {} failed, queued for retry: {}", task.id, e);
                self.retry_queue.push_back(task);
                notify.notify(SyncStatus::QueuedForSync);
                Ok(SaveOutcome::Queued)
            }
        }
    }

    /// Push every unsynced record and drain the retry queue.
    pub async fn sync_all(&self, notify: &dyn Notifier) -> SyncResult<SyncOutcome> {
        if !self.is_connected().await {
            notify.notify(SyncStatus::Offline);
            return Ok(SyncOutcome::Offline);
        }

        let unparked = self.retry_queue.unpark_all();
        if unparked > 0 {
            log::info!("Re-queued {} parked task(s)", unparked);
        }

        let unsynced = self.local.unsynced().await?;
        if unsynced.is_empty() && self.retry_queue.is_empty() {
            notify.notify(SyncStatus::AlreadySynced);
            return Ok(SyncOutcome::AlreadySynced);
        }

        log::info!(
            "Syncing {} unsynced task(s), {} queued for retry",
            unsynced.len(),
            self.retry_queue.len()
        );
        let mut report = SyncReport::default();
        for task in unsynced {
            if self.retry_queue.count_of(&task.id) > 0 {
                // The drain pushes it, in queue order.
                continue;
            }
            if report.interrupted {
                self.retry_queue.push_back(task);
                continue;
            }
            match self.push(&task).await {
                Ok(()) => {
                    self.local.mark_synced(&task.id, task.updated_at).await?;
                    report.pushed += 1;
                }
                Err(e) => {
                    log::warn!("Push of task {} failed, queued for retry: {}", task.id, e);
                    report.failed_attempts += 1;
                    self.retry_queue.push_back(task);
                    if !self.is_connected().await {
                        log::warn!("Lost connectivity, queueing remaining tasks unpushed");
                        report.interrupted = true;
                    }
                }
            }
        }

        if !report.interrupted {
            self.drain_retry_queue(&mut report).await?;
        }
        report.remaining = self.retry_queue.len();
        report.parked = self.retry_queue.parked_len();

        log::info!(
            "Sync finished: {} pushed, {} failed attempt(s), {} pending",
            report.pushed,
            report.failed_attempts,
            report.pending()
        );
        notify.notify(SyncStatus::Synced {
            pushed: report.pushed,
            pending: report.pending(),
        });
        Ok(SyncOutcome::Completed(report))
    }

    /// Pop, push, and on failure re-append, strictly front to back, until the
    /// queue is empty or connectivity is lost.
    async fn drain_retry_queue(&self, report: &mut SyncReport) -> SyncResult<()> {
        let policy: &RetryPolicy = &self.config.retry;
        while let Some(mut entry) = self.retry_queue.pop_front() {
            let delay = policy.backoff_for(entry.attempts);
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }

            let stored = self.local.find(&entry.task.id).await?;
            if let Some(stored) = &stored {
                if stored.is_synced && stored.updated_at >= entry.task.updated_at {
                    log::debug!("Task {} already confirmed, skipping queued push", stored.id);
                    continue;
                }
            }
            entry.task = conflict::freshest(entry.task, stored);

            match self.push(&entry.task).await {
                Ok(()) => {
                    self.local
                        .mark_synced(&entry.task.id, entry.task.updated_at)
                        .await?;
                    report.pushed += 1;
                }
                Err(e) => {
                    entry.attempts += 1;
                    report.failed_attempts += 1;
                    log::warn!("Retry failed again: {} ({})", entry.task.id, e);
                    if policy.is_exhausted(entry.attempts) {
                        self.retry_queue.park(entry);
                    } else {
                        self.retry_queue.requeue(entry);
                    }
                    if !self.is_connected().await {
                        log::warn!("Lost connectivity, stopping retry drain");
                        report.interrupted = true;
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    async fn push(&self, task: &Task) -> Result<(), RemoteError> {
        let path = self.config.task_path(&task.id);
        let value = RemoteTask::from(task).to_value()?;
        let timeout = self.config.push_timeout();
        match tokio::time::timeout(timeout, self.remote.write(&path, value)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(timeout)),
        }
    }
}

/// Builder for [`SyncEngine`].
///
/// ```ignore
/// let engine = SyncEngineBuilder::new("sqlite:./tasks.db?mode=rwc")
///     .with_remote(Arc::new(RestRemoteStore::new("https://example.test")?))
///     .with_connectivity(Arc::new(ManualConnectivity::new(true)))
///     .build()
///     .await?;
/// ```
pub struct SyncEngineBuilder {
    database_url: String,
    remote: Option<Arc<dyn RemoteStore>>,
    connectivity: Option<Arc<dyn ConnectivityMonitor>>,
    config: SyncConfig,
}

impl SyncEngineBuilder {
    pub fn new(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            remote: None,
            connectivity: None,
            config: SyncConfig::default(),
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn ConnectivityMonitor>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.config.push_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub async fn build(self) -> SyncResult<SyncEngine> {
        let remote = self
            .remote
            .ok_or_else(|| SyncError::config("no remote store configured"))?;
        let connectivity = self
            .connectivity
            .ok_or_else(|| SyncError::config("no connectivity monitor configured"))?;

        let local = LocalStore::connect(&self.database_url).await?;
        log::debug!("Opened local store at {}", self.database_url);

        Ok(SyncEngine::new(local, remote, connectivity, self.config))
    }
}
