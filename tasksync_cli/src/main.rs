mod cli;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tasksyncdb::{
    ConnectivityMonitor, HttpProbe, ManualConnectivity, MemoryRemoteStore, RemoteStore,
    RestRemoteStore, SyncConfig, SyncEngine, SyncEngineBuilder, SyncError, SyncResult, SyncStatus,
    Task, TaskDraft, spawn_auto_sync,
};

use crate::cli::{AddArgs, Cli, Command, EditArgs, WatchArgs};

fn print_status(status: SyncStatus) {
    println!("{status}");
}

struct Session {
    engine: Arc<SyncEngine>,
    probe: Option<Arc<HttpProbe>>,
}

async fn open(cli: &Cli) -> SyncResult<Session> {
    let config = match &cli.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };

    let remote: Arc<dyn RemoteStore> = match &cli.remote_url {
        Some(url) => Arc::new(RestRemoteStore::new(url.as_str())?),
        None => {
            log::warn!("No remote URL given, syncing against an in-process remote");
            Arc::new(MemoryRemoteStore::new())
        }
    };

    let mut probe = None;
    let connectivity: Arc<dyn ConnectivityMonitor> = match (&cli.remote_url, cli.offline) {
        (_, true) => Arc::new(ManualConnectivity::new(false)),
        (Some(url), false) => {
            let http = Arc::new(
                HttpProbe::new(url.as_str(), config.connectivity_timeout())
                    .map_err(|e| SyncError::config(e.to_string()))?,
            );
            probe = Some(http.clone());
            http
        }
        (None, false) => Arc::new(ManualConnectivity::new(true)),
    };

    let engine = SyncEngineBuilder::new(&cli.database_url)
        .with_remote(remote)
        .with_connectivity(connectivity)
        .with_config(config)
        .build()
        .await?;

    Ok(Session {
        engine: Arc::new(engine),
        probe,
    })
}

fn print_task(task: &Task) {
    let state = if task.is_synced { "synced" } else { "pending" };
    println!(
        "{}  [{}] {} ({}, {}) -> {}",
        task.id, state, task.title, task.status, task.priority, task.assigned_to
    );
}

async fn add(engine: &SyncEngine, args: AddArgs) -> SyncResult<()> {
    let draft = TaskDraft::new(args.title, args.description, args.assigned_to)
        .with_status(args.status)
        .with_priority(args.priority);
    let (task, _) = engine.create_task(draft, &print_status).await?;
    print_task(&task);
    Ok(())
}

async fn edit(engine: &SyncEngine, args: EditArgs) -> SyncResult<()> {
    let current = engine
        .load_for_edit(&args.id)
        .await?
        .ok_or_else(|| SyncError::NotFound(args.id.clone()))?;

    let mut draft = TaskDraft::from(&current);
    if let Some(title) = args.title {
        draft.title = title;
    }
    if let Some(description) = args.description {
        draft.description = description;
    }
    if let Some(assigned_to) = args.assigned_to {
        draft.assigned_to = assigned_to;
    }
    if let Some(status) = args.status {
        draft.status = status;
    }
    if let Some(priority) = args.priority {
        draft.priority = priority;
    }

    let (task, _) = engine.update_task(&args.id, draft, &print_status).await?;
    print_task(&task);
    Ok(())
}

async fn watch(session: Session, args: WatchArgs) -> SyncResult<()> {
    let engine = session.engine;
    let _probe = session
        .probe
        .as_ref()
        .map(|probe| probe.start(Duration::from_secs(args.probe_interval)));
    let _ingest = engine.ingest_from_remote();
    let _auto_sync = spawn_auto_sync(engine.clone(), Arc::new(print_status));
    let _observer = engine.local().subscribe(|tasks| {
        println!("{} task(s) stored locally", tasks.len());
    });

    log::info!("Watching for changes, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    Ok(())
}

async fn run(cli: Cli) -> SyncResult<()> {
    let session = open(&cli).await?;
    let engine = session.engine.clone();

    match cli.command {
        Command::Add(args) => add(&engine, args).await,
        Command::Edit(args) => edit(&engine, args).await,
        Command::List => {
            for task in engine.tasks().await? {
                print_task(&task);
            }
            Ok(())
        }
        Command::Sync => engine.sync_all(&print_status).await.map(|_| ()),
        Command::Pull => {
            let report = engine.pull_once().await?;
            println!(
                "Pulled {} task(s), skipped {}",
                report.upserted,
                report.skipped.len()
            );
            Ok(())
        }
        Command::Watch(args) => watch(session, args).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
