//! Auto-sync on reconnect.

use std::sync::Arc;

use crate::engine::SyncEngine;
use crate::messages::{Notifier, SyncStatus};
use crate::subscription::Subscription;

/// Turns a stream of connectivity values into disconnected→connected edges.
#[derive(Debug, Default)]
pub struct EdgeDetector {
    last: bool,
}

impl EdgeDetector {
    /// Starts disconnected, so a first `true` is an edge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `connected` and report whether it is a rising edge.
    pub fn observe(&mut self, connected: bool) -> bool {
        let rising = connected && !self.last;
        self.last = connected;
        rising
    }
}

/// Run [`SyncEngine::sync_all`] once per rising connectivity edge.
///
/// Syncs run one at a time on the spawned task; transitions that arrive while
/// a sync is in flight are folded into the latest value.
pub fn spawn_auto_sync(engine: Arc<SyncEngine>, notify: Arc<dyn Notifier>) -> Subscription {
    let mut rx = engine.connectivity().watch();
    Subscription::new(tokio::spawn(async move {
        let mut edges = EdgeDetector::new();
        loop {
            let connected = *rx.borrow_and_update();
            if edges.observe(connected) {
                log::info!("Connectivity restored, syncing");
                notify.notify(SyncStatus::Syncing);
                if let Err(e) = engine.sync_all(notify.as_ref()).await {
                    log::error!("Auto-sync failed: {}", e);
                }
            }
            if rx.changed().await.is_err() {
                log::debug!("Connectivity monitor closed, stopping auto-sync");
                break;
            }
        }
    }))
}
