//! Local Store: the authoritative offline copy of every task.
//!
//! [`LocalStore`] wraps a SeaORM [`DatabaseConnection`] holding the `tasks`
//! table. Every write goes through a transaction and, once committed, emits a
//! [`ChangeNotification`] on a broadcast channel so observers registered with
//! [`LocalStore::subscribe`] can re-query.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    DatabaseTransaction, DbErr, EntityTrait, QueryFilter, QueryOrder, Schema,
    TransactionTrait,
    sea_query::{Expr, OnConflict, SqliteQueryBuilder},
};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::messages::{ChangeKind, ChangeNotification};
use crate::subscription::Subscription;
use crate::task::{self, Task};

#[derive(Clone)]
pub struct LocalStore {
    inner: DatabaseConnection,
    change_tx: broadcast::Sender<ChangeNotification>,
}

impl LocalStore {
    /// Connect to `url` (e.g. `sqlite:./tasks.db?mode=rwc` or `sqlite::memory:`)
    /// and create the `tasks` table if needed.
    pub async fn connect(url: &str) -> Result<Self, DbErr> {
        let mut opts = ConnectOptions::new(url);
        if url.contains(":memory:") {
            // Each pooled connection would otherwise get its own empty database.
            opts.max_connections(1).min_connections(1);
        }
        opts.sqlx_logging(false);
        let inner = Database::connect(opts).await?;
        Self::from_connection(inner).await
    }

    /// Use an existing connection owned by the caller.
    pub async fn from_connection(inner: DatabaseConnection) -> Result<Self, DbErr> {
        let schema = Schema::new(inner.get_database_backend());
        let create_stmt = schema
            .create_table_from_entity(task::Entity)
            .if_not_exists()
            .to_owned();
        inner
            .execute_unprepared(&create_stmt.to_string(SqliteQueryBuilder))
            .await?;

        let (change_tx, _) = broadcast::channel(256);
        Ok(Self { inner, change_tx })
    }

    /// Get a reference to the underlying SeaORM connection.
    pub fn inner(&self) -> &DatabaseConnection {
        &self.inner
    }

    /// Open a transactional write scope. Dropping it without
    /// [`commit`](DatabaseTransaction::commit) rolls back.
    pub async fn begin(&self) -> Result<DatabaseTransaction, DbErr> {
        self.inner.begin().await
    }

    pub fn change_rx(&self) -> broadcast::Receiver<ChangeNotification> {
        self.change_tx.subscribe()
    }

    /// Broadcast a change after a commit made through [`begin`](Self::begin).
    pub fn notify_change(&self, kind: ChangeKind, task_ids: Vec<String>) {
        if task_ids.is_empty() {
            return;
        }
        let _ = self.change_tx.send(ChangeNotification { kind, task_ids });
    }

    /// Create-or-replace `task` by id in its own transaction.
    pub async fn upsert(&self, task: &Task) -> Result<(), DbErr> {
        let txn = self.begin().await?;
        upsert_in(&txn, task).await?;
        txn.commit().await?;
        self.notify_change(ChangeKind::LocalWrite, vec![task.id.clone()]);
        Ok(())
    }

    pub async fn find(&self, id: &str) -> Result<Option<Task>, DbErr> {
        task::Entity::find_by_id(id.to_string()).one(&self.inner).await
    }

    /// All tasks, oldest first.
    pub async fn tasks(&self) -> Result<Vec<Task>, DbErr> {
        task::Entity::find()
            .order_by_asc(task::Column::CreatedAt)
            .order_by_asc(task::Column::Id)
            .all(&self.inner)
            .await
    }

    /// Tasks whose local copy is not known to match the Remote Store.
    pub async fn unsynced(&self) -> Result<Vec<Task>, DbErr> {
        task::Entity::find()
            .filter(task::Column::IsSynced.eq(false))
            .order_by_asc(task::Column::UpdatedAt)
            .order_by_asc(task::Column::Id)
            .all(&self.inner)
            .await
    }

    /// Flip `is_synced` to true for the copy of `id` written at `updated_at`.
    ///
    /// Returns `false` when the record is gone or has been rewritten since
    /// that snapshot was pushed.
    pub async fn mark_synced(&self, id: &str, updated_at: DateTime<Utc>) -> Result<bool, DbErr> {
        let txn = self.begin().await?;
        let result = task::Entity::update_many()
            .col_expr(task::Column::IsSynced, Expr::value(true))
            .filter(task::Column::Id.eq(id))
            .filter(task::Column::UpdatedAt.eq(updated_at))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        let flipped = result.rows_affected > 0;
        if flipped {
            self.notify_change(ChangeKind::Synced, vec![id.to_string()]);
        }
        Ok(flipped)
    }

    /// Observe the ordered task list.
    ///
    /// `on_change` receives the full list once right away and again after
    /// every committed change. The observer runs until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, mut on_change: F) -> Subscription
    where
        F: FnMut(Vec<Task>) + Send + 'static,
    {
        let store = self.clone();
        let mut rx = self.change_tx.subscribe();
        let handle = tokio::spawn(async move {
            match store.tasks().await {
                Ok(tasks) => on_change(tasks),
                Err(e) => log::error!("Failed initial task load: {}", e),
            }
            loop {
                match rx.recv().await {
                    Ok(_) | Err(RecvError::Lagged(_)) => match store.tasks().await {
                        Ok(tasks) => on_change(tasks),
                        Err(e) => log::error!("Failed to refresh tasks: {}", e),
                    },
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Subscription::new(handle)
    }
}

/// Create-or-replace `task` inside an open transaction.
pub async fn upsert_in(conn: &impl ConnectionTrait, task: &Task) -> Result<(), DbErr> {
    let model = task::ActiveModel {
        id: Set(task.id.clone()),
        title: Set(task.title.clone()),
        description: Set(task.description.clone()),
        assigned_to: Set(task.assigned_to.clone()),
        status: Set(task.status),
        priority: Set(task.priority),
        created_at: Set(task.created_at),
        updated_at: Set(task.updated_at),
        is_synced: Set(task.is_synced),
    };
    task::Entity::insert(model)
        .on_conflict(
            OnConflict::column(task::Column::Id)
                .update_columns([
                    task::Column::Title,
                    task::Column::Description,
                    task::Column::AssignedTo,
                    task::Column::Status,
                    task::Column::Priority,
                    task::Column::CreatedAt,
                    task::Column::UpdatedAt,
                    task::Column::IsSynced,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

/// Look a task up inside an open transaction.
pub async fn find_in(conn: &impl ConnectionTrait, id: &str) -> Result<Option<Task>, DbErr> {
    task::Entity::find_by_id(id.to_string()).one(conn).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskPriority, TaskStatus};

    async fn store() -> LocalStore {
        LocalStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let store = store().await;
        let mut task = Task::new("1", "Fix bug", TaskStatus::Pending, TaskPriority::High);
        store.upsert(&task).await.unwrap();

        task.title = "Fix the bug".into();
        task.is_synced = true;
        store.upsert(&task).await.unwrap();

        let all = store.tasks().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Fix the bug");
        assert!(all[0].is_synced);
    }

    #[tokio::test]
    async fn test_mark_synced_is_guarded_by_updated_at() {
        let store = store().await;
        let task = Task::new("1", "Fix bug", TaskStatus::Pending, TaskPriority::High);
        store.upsert(&task).await.unwrap();

        let stale = task.updated_at - chrono::Duration::seconds(1);
        assert!(!store.mark_synced("1", stale).await.unwrap());
        assert!(store.mark_synced("1", task.updated_at).await.unwrap());
        assert!(store.unsynced().await.unwrap().is_empty());
        assert!(!store.mark_synced("missing", task.updated_at).await.unwrap());
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = store().await;
        {
            let txn = store.begin().await.unwrap();
            let task = Task::new("1", "Fix bug", TaskStatus::Pending, TaskPriority::High);
            upsert_in(&txn, &task).await.unwrap();
        }
        assert!(store.find("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_subscribe_receives_initial_and_changed_lists() {
        let store = store().await;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _sub = store.subscribe(move |tasks| {
            let _ = tx.send(tasks.len());
        });
        assert_eq!(rx.recv().await, Some(0));

        let task = Task::new("1", "Fix bug", TaskStatus::Pending, TaskPriority::High);
        store.upsert(&task).await.unwrap();
        assert_eq!(rx.recv().await, Some(1));
    }
}
