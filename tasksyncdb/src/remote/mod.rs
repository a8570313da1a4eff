//! Remote Store: the cloud realtime tree that mirrors tasks at `tasks/{id}`.
//!
//! The engine only talks to the [`RemoteStore`] trait. Two implementations
//! ship with the crate:
//!
//! - [`MemoryRemoteStore`]: an in-process tree with failure injection.
//! - [`RestRemoteStore`]: the realtime-database REST dialect
//!   (`{base}/{path}.json`, server-sent events for subscriptions).

mod memory;
mod rest;

pub use memory::MemoryRemoteStore;
pub use rest::RestRemoteStore;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;

use crate::error::RemoteError;
use crate::task::{Task, TaskPriority, TaskStatus, to_iso};

/// A stream of full snapshots of one path. `Value::Null` means empty.
pub type SnapshotStream = BoxStream<'static, Result<Value, RemoteError>>;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Replace the value at `path`.
    async fn write(&self, path: &str, value: Value) -> Result<(), RemoteError>;

    /// Read the value at `path` once. `None` when nothing is stored there.
    async fn read_once(&self, path: &str) -> Result<Option<Value>, RemoteError>;

    /// Full snapshots of `path`: the current value first, then one per change.
    fn subscribe(&self, path: &str) -> SnapshotStream;
}

/// Wire form of a task. Timestamps are ISO-8601 strings, `is_synced` is
/// local-only and not pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTask {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub assigned_to: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Task> for RemoteTask {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            assigned_to: task.assigned_to.clone(),
            status: task.status,
            priority: task.priority,
            created_at: to_iso(&task.created_at),
            updated_at: to_iso(&task.updated_at),
        }
    }
}

impl RemoteTask {
    pub fn to_value(&self) -> Result<Value, RemoteError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Split a slash-separated path into its non-empty segments.
pub(crate) fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;

    #[test]
    fn test_remote_task_wire_form() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let mut task = Task::new("1700000000000", "Fix bug", TaskStatus::InProgress, TaskPriority::High)
            .with_assigned_to("sam");
        task.created_at = ts;
        task.updated_at = ts;
        task.is_synced = true;

        let value = RemoteTask::from(&task).to_value().unwrap();
        assert_eq!(
            value,
            json!({
                "_id": "1700000000000",
                "title": "Fix bug",
                "description": "",
                "assignedTo": "sam",
                "status": "In Progress",
                "priority": "High",
                "createdAt": "2023-11-14T22:13:20.000Z",
                "updatedAt": "2023-11-14T22:13:20.000Z",
            })
        );
    }

    #[test]
    fn test_segments_ignore_empty_parts() {
        let parts: Vec<_> = segments("/tasks//42/").collect();
        assert_eq!(parts, vec!["tasks", "42"]);
    }
}
