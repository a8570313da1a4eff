use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use serde_json::{Map, Value};
use tokio::sync::broadcast::{self, error::RecvError};

use super::{RemoteStore, SnapshotStream, segments};
use crate::error::RemoteError;

/// In-process Remote Store.
///
/// Clones share the same tree. Writes can be made to fail on demand to
/// exercise the retry path, and every attempt is recorded.
#[derive(Clone)]
pub struct MemoryRemoteStore {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    changes: broadcast::Sender<()>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Default)]
struct State {
    root: Value,
    unreachable: bool,
    fail_next: usize,
    path_failures: HashMap<String, usize>,
    attempts: HashMap<String, usize>,
    write_log: Vec<String>,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    root: Value::Object(Map::new()),
                    ..Default::default()
                }),
                changes,
            }),
        }
    }

    /// Make every write fail with a network error until reset.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.state().unreachable = unreachable;
    }

    /// Fail the next `count` writes, whatever their path.
    pub fn fail_next_writes(&self, count: usize) {
        self.inner.state().fail_next = count;
    }

    /// Fail the next `count` writes to `path`.
    pub fn fail_writes_to(&self, path: &str, count: usize) {
        self.inner
            .state()
            .path_failures
            .insert(normalize(path), count);
    }

    /// Paths of successful writes, in commit order.
    pub fn write_log(&self) -> Vec<String> {
        self.inner.state().write_log.clone()
    }

    /// Number of write attempts (failed or not) made to `path`.
    pub fn attempts_for(&self, path: &str) -> usize {
        self.inner
            .state()
            .attempts
            .get(&normalize(path))
            .copied()
            .unwrap_or(0)
    }

    /// Current value at `path`.
    pub fn get(&self, path: &str) -> Option<Value> {
        read_at(&self.inner.state().root, path)
    }

    /// Write as another client would: no failure injection, not logged.
    pub fn apply_external(&self, path: &str, value: Value) {
        {
            let mut state = self.inner.state();
            write_at(&mut state.root, path, value);
        }
        let _ = self.inner.changes.send(());
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn write(&self, path: &str, value: Value) -> Result<(), RemoteError> {
        let path = normalize(path);
        {
            let mut state = self.inner.state();
            *state.attempts.entry(path.clone()).or_default() += 1;

            if state.unreachable {
                return Err(RemoteError::Network("remote store unreachable".into()));
            }
            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(RemoteError::Network(format!("injected failure writing {path}")));
            }
            if let Some(remaining) = state.path_failures.get_mut(&path) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(RemoteError::Network(format!("injected failure writing {path}")));
                }
            }

            write_at(&mut state.root, &path, value);
            state.write_log.push(path);
        }
        let _ = self.inner.changes.send(());
        Ok(())
    }

    async fn read_once(&self, path: &str) -> Result<Option<Value>, RemoteError> {
        Ok(self.get(path))
    }

    fn subscribe(&self, path: &str) -> SnapshotStream {
        let inner = Arc::clone(&self.inner);
        let path = normalize(path);
        let rx = inner.changes.subscribe();
        let initial = read_at(&inner.state().root, &path).unwrap_or(Value::Null);

        let changes = stream::unfold((rx, inner, path), |(mut rx, inner, path)| async move {
            match rx.recv().await {
                Ok(()) | Err(RecvError::Lagged(_)) => {
                    let snapshot = read_at(&inner.state().root, &path)
                        .unwrap_or(Value::Null);
                    Some((Ok(snapshot), (rx, inner, path)))
                }
                Err(RecvError::Closed) => None,
            }
        });

        stream::once(async move { Ok(initial) }).chain(changes).boxed()
    }
}

fn normalize(path: &str) -> String {
    segments(path).collect::<Vec<_>>().join("/")
}

fn read_at(root: &Value, path: &str) -> Option<Value> {
    let mut node = root;
    for segment in segments(path) {
        node = node.as_object()?.get(segment)?;
    }
    match node {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        other => Some(other.clone()),
    }
}

fn write_at(root: &mut Value, path: &str, value: Value) {
    let parts: Vec<&str> = segments(path).collect();
    let Some((last, parents)) = parts.split_last() else {
        *root = value;
        return;
    };

    let mut node = root;
    for segment in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        node = map.entry(segment.to_string()).or_insert(Value::Null);
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        if value.is_null() {
            map.remove(*last);
        } else {
            map.insert(last.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_write_and_read_nested_paths() {
        let store = MemoryRemoteStore::new();
        store.write("tasks/1", json!({"title": "a"})).await.unwrap();
        store.write("/tasks/2/", json!({"title": "b"})).await.unwrap();

        assert_eq!(store.get("tasks/1"), Some(json!({"title": "a"})));
        let all = store.read_once("tasks").await.unwrap().unwrap();
        assert_eq!(all.as_object().unwrap().len(), 2);
        assert_eq!(store.write_log(), vec!["tasks/1", "tasks/2"]);
        assert_eq!(store.read_once("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_injected_failures_are_counted() {
        let store = MemoryRemoteStore::new();
        store.fail_writes_to("tasks/x", 2);

        assert!(store.write("tasks/x", json!(1)).await.is_err());
        assert!(store.write("tasks/y", json!(2)).await.is_ok());
        assert!(store.write("tasks/x", json!(1)).await.is_err());
        assert!(store.write("tasks/x", json!(1)).await.is_ok());

        assert_eq!(store.attempts_for("tasks/x"), 3);
        assert_eq!(store.write_log(), vec!["tasks/y", "tasks/x"]);
    }

    #[tokio::test]
    async fn test_subscribe_emits_initial_then_changes() {
        let store = MemoryRemoteStore::new();
        let mut snapshots = store.subscribe("tasks");

        assert_eq!(snapshots.next().await.unwrap().unwrap(), Value::Null);

        store.apply_external("tasks/1", json!({"_id": "1"}));
        let snapshot = snapshots.next().await.unwrap().unwrap();
        assert_eq!(snapshot, json!({"1": {"_id": "1"}}));
    }
}
