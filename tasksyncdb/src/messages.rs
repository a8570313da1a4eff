//! Events and outcomes produced by the store and the sync engine.

use std::fmt;

use crate::error::MalformedRecord;

/// Which kind of commit produced a [`ChangeNotification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A write originating on this device (create or edit).
    LocalWrite,
    /// A batch ingested from the Remote Store.
    RemoteIngest,
    /// Only `is_synced` flags changed.
    Synced,
}

/// Lightweight event broadcast after every committed Local Store write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    pub kind: ChangeKind,
    pub task_ids: Vec<String>,
}

/// User-facing status, delivered through a [`Notifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    SavedAndSynced,
    QueuedForSync,
    SavedOffline,
    Offline,
    AlreadySynced,
    Syncing,
    Synced { pushed: usize, pending: usize },
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::SavedAndSynced => f.write_str("Task saved and synced"),
            SyncStatus::QueuedForSync => f.write_str("Task queued for sync"),
            SyncStatus::SavedOffline => f.write_str("Saved offline"),
            SyncStatus::Offline => f.write_str("You are offline"),
            SyncStatus::AlreadySynced => f.write_str("All tasks are already synced"),
            SyncStatus::Syncing => f.write_str("Syncing changes..."),
            SyncStatus::Synced { pending: 0, .. } => f.write_str("Synced all pending tasks"),
            SyncStatus::Synced { pushed, pending } => {
                write!(f, "Synced {pushed} task(s), {pending} still pending")
            }
        }
    }
}

/// Fire-and-forget sink for [`SyncStatus`] messages.
pub trait Notifier: Send + Sync {
    fn notify(&self, status: SyncStatus);
}

impl<F> Notifier for F
where
    F: Fn(SyncStatus) + Send + Sync,
{
    fn notify(&self, status: SyncStatus) {
        self(status)
    }
}

/// Discards every status.
impl Notifier for () {
    fn notify(&self, _status: SyncStatus) {}
}

/// Result of [`SyncEngine::save`](crate::SyncEngine::save).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Synced,
    Queued,
    SavedOffline,
}

/// Result of [`SyncEngine::sync_all`](crate::SyncEngine::sync_all).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Offline,
    AlreadySynced,
    Completed(SyncReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Successful pushes, from the unsynced pass and the queue drain.
    pub pushed: usize,
    /// Failed push attempts; each one put the record (back) into the queue.
    pub failed_attempts: usize,
    /// Entries parked after exhausting their attempt budget.
    pub parked: usize,
    /// Entries still queued when the drain stopped.
    pub remaining: usize,
    /// The drain stopped early because connectivity was lost.
    pub interrupted: bool,
}

impl SyncReport {
    pub fn pending(&self) -> usize {
        self.parked + self.remaining
    }
}

/// Result of ingesting one remote snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub upserted: usize,
    pub skipped: Vec<MalformedRecord>,
}
