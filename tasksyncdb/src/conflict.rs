//! Last-Write-Wins (LWW) between two snapshots of the same task.
//!
//! Snapshots are ordered by `updated_at` alone; equal timestamps keep the
//! current snapshot. The
//! retry queue drain uses this to avoid pushing a queued snapshot that a
//! later local edit has already superseded.

use crate::task::Task;

/// Returns `true` if `candidate` should replace `current`.
///
/// - No current snapshot: the candidate wins.
/// - Otherwise the candidate wins only with a strictly greater `updated_at`.
pub fn should_replace(candidate: &Task, current: Option<&Task>) -> bool {
    match current {
        None => true,
        Some(current) => candidate.updated_at > current.updated_at,
    }
}

/// The snapshot to push for a queued entry: the stored copy when it is
/// newer, else the queued one.
pub fn freshest(queued: Task, stored: Option<Task>) -> Task {
    match stored {
        Some(stored) if should_replace(&stored, Some(&queued)) => stored,
        _ => queued,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::task::{TaskPriority, TaskStatus};

    fn make_task(title: &str, offset_ms: i64) -> Task {
        let mut task = Task::new("1", title, TaskStatus::Pending, TaskPriority::Medium);
        task.updated_at += Duration::milliseconds(offset_ms);
        task
    }

    #[test]
    fn test_no_current_always_replaces() {
        assert!(should_replace(&make_task("a", 0), None));
    }

    #[test]
    fn test_newer_wins() {
        let current = make_task("old", 0);
        let candidate = make_task("new", 10);
        assert!(should_replace(&candidate, Some(&current)));
        assert!(!should_replace(&current, Some(&candidate)));
    }

    #[test]
    fn test_equal_timestamps_keep_current() {
        let current = make_task("a", 0);
        let mut candidate = current.clone();
        candidate.title = "b".into();
        assert!(!should_replace(&candidate, Some(&current)));
    }

    #[test]
    fn test_freshest_prefers_newer_stored_copy() {
        let queued = make_task("queued", 0);
        let stored = make_task("stored", 5);
        assert_eq!(freshest(queued.clone(), Some(stored)).title, "stored");
        assert_eq!(freshest(queued.clone(), None).title, "queued");

        let older = make_task("older", -5);
        assert_eq!(freshest(queued, Some(older)).title, "queued");
    }
}
