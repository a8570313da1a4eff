//! # TaskSyncDB
//!
//! Offline-first sync of task records between a local SQLite database and a
//! remote realtime tree store.
//!
//! Every write lands in the Local Store first (a SeaORM
//! [`DatabaseConnection`](sea_orm::DatabaseConnection)) and is pushed to the
//! Remote Store when the device is online. Pushes that fail are kept in an
//! in-memory retry queue and the record stays flagged `is_synced = false`
//! until a later [`SyncEngine::sync_all`] confirms it. Remote changes flow
//! back through [`SyncEngine::ingest_from_remote`], remote copy winning.
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tasksyncdb::{ManualConnectivity, RestRemoteStore, SyncEngineBuilder, TaskDraft};
//!
//! let connectivity = Arc::new(ManualConnectivity::new(true));
//! let engine = Arc::new(
//!     SyncEngineBuilder::new("sqlite:./tasks.db?mode=rwc")
//!         .with_remote(Arc::new(RestRemoteStore::new("https://my-db.example")?))
//!         .with_connectivity(connectivity.clone())
//!         .build()
//!         .await?,
//! );
//!
//! let _ingest = engine.ingest_from_remote();
//! let _auto = tasksyncdb::spawn_auto_sync(engine.clone(), Arc::new(|s| println!("{s}")));
//!
//! let draft = TaskDraft::new("Fix bug", "Crash on save", "sam");
//! engine.create_task(draft, &|s| println!("{s}")).await?;
//! ```
//!
//! ## Key types
//!
//! - [`SyncEngine`] — save / sync-all / ingest against injected stores
//! - [`SyncEngineBuilder`] — opens the Local Store and wires the engine
//! - [`LocalStore`] — the `tasks` table plus change notifications
//! - [`RemoteStore`] — remote tree trait ([`MemoryRemoteStore`], [`RestRemoteStore`])
//! - [`ConnectivityMonitor`] — reachability trait ([`ManualConnectivity`], [`HttpProbe`])
//! - [`SyncStatus`] — user-facing messages delivered through a [`Notifier`]

pub mod config;
pub mod conflict;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod messages;
pub mod remote;
pub mod retry;
mod service;
pub mod store;
pub mod subscription;
pub mod task;
pub mod trigger;
pub mod validation;

pub use config::{RetryPolicy, SyncConfig};
pub use connectivity::{ConnectivityMonitor, HttpProbe, ManualConnectivity, on_transition};
pub use engine::{SyncEngine, SyncEngineBuilder};
pub use error::{ConnectivityError, MalformedRecord, RemoteError, SyncError, SyncResult};
pub use messages::{
    ChangeKind, ChangeNotification, IngestReport, Notifier, SaveOutcome, SyncOutcome, SyncReport,
    SyncStatus,
};
pub use remote::{MemoryRemoteStore, RemoteStore, RemoteTask, RestRemoteStore};
pub use retry::{QueuedPush, RetryQueue};
pub use store::LocalStore;
pub use subscription::Subscription;
pub use task::{Task, TaskIdGenerator, TaskPriority, TaskStatus};
pub use trigger::{EdgeDetector, spawn_auto_sync};
pub use validation::TaskDraft;

// Re-export sea-orm for users of the library
pub use sea_orm;
