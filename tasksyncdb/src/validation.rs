//! User input for creating or editing a task.

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::task::{Task, TaskPriority, TaskStatus, now_millis};

/// Editable fields of a task, as entered in a form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub assigned_to: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
}

impl TaskDraft {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        assigned_to: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            assigned_to: assigned_to.into(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Title, description and assignee are required.
    pub fn validate(&self) -> SyncResult<()> {
        for (field, value) in [
            ("title", &self.title),
            ("description", &self.description),
            ("assignedTo", &self.assigned_to),
        ] {
            if value.trim().is_empty() {
                return Err(SyncError::validation(field, "Please fill all fields"));
            }
        }
        Ok(())
    }

    /// Build the task to save under `id`, trimming surrounding whitespace.
    pub fn into_task(self, id: impl Into<String>) -> Task {
        let now = now_millis();
        Task {
            id: id.into(),
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            assigned_to: self.assigned_to.trim().to_string(),
            status: self.status,
            priority: self.priority,
            created_at: now,
            updated_at: now,
            is_synced: false,
        }
    }
}

impl From<&Task> for TaskDraft {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            assigned_to: task.assigned_to.clone(),
            status: task.status,
            priority: task.priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_fields_are_rejected() {
        let err = TaskDraft::new("Fix bug", "  ", "sam").validate().unwrap_err();
        match err {
            SyncError::Validation { field, .. } => assert_eq!(field, "description"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(TaskDraft::new("", "d", "a").validate().is_err());
        assert!(TaskDraft::new("t", "d", "").validate().is_err());
    }

    #[test]
    fn test_into_task_trims_and_defaults() {
        let draft = TaskDraft::new(" Fix bug ", "Crash on save", "sam");
        assert!(draft.validate().is_ok());
        let task = draft.with_priority(TaskPriority::High).into_task("1");
        assert_eq!(task.title, "Fix bug");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::High);
        assert!(!task.is_synced);
    }
}
