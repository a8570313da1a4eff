use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tasksyncdb::{TaskPriority, TaskStatus};

/// Offline-first task list synced with a realtime remote store.
#[derive(Parser, Debug)]
#[command(name = "tasksync", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Local SQLite database.
    #[arg(
        long,
        env = "TASKSYNC_DATABASE_URL",
        default_value = "sqlite:./tasks.db?mode=rwc",
        global = true
    )]
    pub database_url: String,

    /// Base URL of the remote store. Without it an in-process remote is used.
    #[arg(long, env = "TASKSYNC_REMOTE_URL", global = true)]
    pub remote_url: Option<String>,

    /// JSON file with engine settings (timeouts, retry policy).
    #[arg(long, env = "TASKSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Behave as if the network were down.
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a task.
    Add(AddArgs),

    /// Edit an existing task. Omitted fields keep their current value.
    Edit(EditArgs),

    /// List local tasks with their sync state.
    List,

    /// Push every unsynced task and drain the retry queue.
    Sync,

    /// Read the remote task collection once into the local database.
    Pull,

    /// Follow remote changes and sync on every reconnect until Ctrl-C.
    Watch(WatchArgs),
}

#[derive(clap::Args, Debug)]
pub struct AddArgs {
    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub description: String,

    #[arg(long)]
    pub assigned_to: String,

    #[arg(long, default_value = "Pending")]
    pub status: TaskStatus,

    #[arg(long, default_value = "Medium")]
    pub priority: TaskPriority,
}

#[derive(clap::Args, Debug)]
pub struct EditArgs {
    /// Task id.
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub assigned_to: Option<String>,

    #[arg(long)]
    pub status: Option<TaskStatus>,

    #[arg(long)]
    pub priority: Option<TaskPriority>,
}

#[derive(clap::Args, Debug)]
pub struct WatchArgs {
    /// Seconds between reachability probes of the remote store.
    #[arg(long, default_value_t = 5)]
    pub probe_interval: u64,
}
