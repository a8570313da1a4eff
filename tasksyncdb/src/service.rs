//! Task operations for the UI layer, built on [`SyncEngine::save`].

use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::ingest;
use crate::messages::{Notifier, SaveOutcome};
use crate::task::{Task, now_millis};
use crate::validation::TaskDraft;

impl SyncEngine {
    /// Validate `draft`, give it a fresh id and save it.
    pub async fn create_task(
        &self,
        draft: TaskDraft,
        notify: &dyn Notifier,
    ) -> SyncResult<(Task, SaveOutcome)> {
        draft.validate()?;
        let task = draft.into_task(self.next_task_id());
        log::debug!("Creating task {}", task.id);
        let outcome = self.save(task.clone(), false, notify).await?;
        let saved = self.local().find(&task.id).await?.unwrap_or(task);
        Ok((saved, outcome))
    }

    /// Validate `draft` and save it over the existing task `id`.
    pub async fn update_task(
        &self,
        id: &str,
        draft: TaskDraft,
        notify: &dyn Notifier,
    ) -> SyncResult<(Task, SaveOutcome)> {
        draft.validate()?;
        let existing = self
            .local()
            .find(id)
            .await?
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;

        let mut task = draft.into_task(id);
        task.created_at = existing.created_at;
        let outcome = self.save(task.clone(), true, notify).await?;
        let saved = self.local().find(id).await?.unwrap_or(task);
        Ok((saved, outcome))
    }

    /// Current copy of `id` for an edit form.
    ///
    /// Online, the Remote Store copy is preferred; on absence or any remote
    /// failure the Local Store copy is used.
    pub async fn load_for_edit(&self, id: &str) -> SyncResult<Option<Task>> {
        let local = self.local().find(id).await?;
        if !self.is_connected().await {
            return Ok(local);
        }

        let path = self.config().task_path(id);
        let read = tokio::time::timeout(self.config().push_timeout(), self.remote().read_once(&path));
        match read.await {
            Ok(Ok(Some(value))) => {
                match ingest::coerce_record(id, &value, local.as_ref(), now_millis()) {
                    Ok(task) => Ok(Some(task)),
                    Err(e) => {
                        log::warn!("Remote copy unusable, using local: {}", e);
                        Ok(local)
                    }
                }
            }
            Ok(Ok(None)) => Ok(local),
            Ok(Err(e)) => {
                log::warn!("Failed to fetch task {}, using local copy: {}", id, e);
                Ok(local)
            }
            Err(_) => {
                log::warn!("Fetching task {} timed out, using local copy", id);
                Ok(local)
            }
        }
    }

    /// All tasks in the Local Store, oldest first.
    pub async fn tasks(&self) -> SyncResult<Vec<Task>> {
        Ok(self.local().tasks().await?)
    }
}
