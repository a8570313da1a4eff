//! In-memory FIFO of task snapshots whose push failed.
//!
//! The queue is owned by one [`SyncEngine`](crate::SyncEngine) and shared by
//! every operation on it. Clones are handles to the same queue. The lock is
//! only taken for a single push or pop, never across an `.await`, so drains
//! running in interleaved tasks see a consistent queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::task::Task;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPush {
    pub task: Task,
    /// Failed pushes made from the queue itself.
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedPush {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            attempts: 0,
            enqueued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct Queues {
    active: VecDeque<QueuedPush>,
    parked: Vec<QueuedPush>,
}

#[derive(Debug, Clone, Default)]
pub struct RetryQueue {
    inner: Arc<Mutex<Queues>>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Queues> {
        // A panic while holding the lock cannot leave the deques half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a fresh entry for `task`.
    pub fn push_back(&self, task: Task) {
        log::debug!("Queued task {} for retry", task.id);
        self.lock().active.push_back(QueuedPush::new(task));
    }

    /// Put an entry that just failed back at the tail.
    pub fn requeue(&self, entry: QueuedPush) {
        self.lock().active.push_back(entry);
    }

    pub fn pop_front(&self) -> Option<QueuedPush> {
        self.lock().active.pop_front()
    }

    /// Hold an entry aside until [`unpark_all`](Self::unpark_all).
    pub fn park(&self, entry: QueuedPush) {
        log::warn!(
            "Parking task {} after {} failed attempts",
            entry.task.id,
            entry.attempts
        );
        self.lock().parked.push(entry);
    }

    /// Move every parked entry to the tail with a fresh attempt budget.
    pub fn unpark_all(&self) -> usize {
        let mut queues = self.lock();
        let parked = std::mem::take(&mut queues.parked);
        let count = parked.len();
        queues.active.extend(parked.into_iter().map(|mut entry| {
            entry.attempts = 0;
            entry
        }));
        count
    }

    pub fn len(&self) -> usize {
        self.lock().active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().active.is_empty()
    }

    pub fn parked_len(&self) -> usize {
        self.lock().parked.len()
    }

    /// Ids of the active entries, front first.
    pub fn queued_ids(&self) -> Vec<String> {
        self.lock()
            .active
            .iter()
            .map(|entry| entry.task.id.clone())
            .collect()
    }

    /// Active and parked entries holding `id`.
    pub fn count_of(&self, id: &str) -> usize {
        let queues = self.lock();
        queues
            .active
            .iter()
            .chain(queues.parked.iter())
            .filter(|entry| entry.task.id == id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskPriority, TaskStatus};

    fn task(id: &str) -> Task {
        Task::new(id, "t", TaskStatus::Pending, TaskPriority::Medium)
    }

    #[test]
    fn test_fifo_order() {
        let queue = RetryQueue::new();
        queue.push_back(task("a"));
        queue.push_back(task("b"));

        let first = queue.pop_front().unwrap();
        assert_eq!(first.task.id, "a");
        queue.requeue(first);
        assert_eq!(queue.queued_ids(), vec!["b", "a"]);
    }

    #[test]
    fn test_clones_share_state() {
        let queue = RetryQueue::new();
        let handle = queue.clone();
        handle.push_back(task("a"));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_unpark_resets_attempts() {
        let queue = RetryQueue::new();
        let mut entry = QueuedPush::new(task("a"));
        entry.attempts = 5;
        queue.park(entry);

        assert!(queue.is_empty());
        assert_eq!(queue.count_of("a"), 1);
        assert_eq!(queue.unpark_all(), 1);
        assert_eq!(queue.parked_len(), 0);
        assert_eq!(queue.pop_front().unwrap().attempts, 0);
    }
}
