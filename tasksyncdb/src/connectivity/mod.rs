//! Connectivity Monitor: network reachability, as a point check and as a
//! stream of transitions.

mod probe;

pub use probe::HttpProbe;

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::ConnectivityError;
use crate::subscription::Subscription;

#[async_trait]
pub trait ConnectivityMonitor: Send + Sync {
    /// Point-in-time reachability check.
    async fn current_status(&self) -> Result<bool, ConnectivityError>;

    /// Latest known status; changes on every published update.
    fn watch(&self) -> watch::Receiver<bool>;
}

/// Call `callback` with every status published by `monitor`, starting with
/// the current one, until the returned [`Subscription`] is dropped.
pub fn on_transition<F>(monitor: &dyn ConnectivityMonitor, mut callback: F) -> Subscription
where
    F: FnMut(bool) + Send + 'static,
{
    let mut rx = monitor.watch();
    Subscription::new(tokio::spawn(async move {
        loop {
            let connected = *rx.borrow_and_update();
            callback(connected);
            if rx.changed().await.is_err() {
                break;
            }
        }
    }))
}

/// Connectivity driven by the host application.
///
/// The host reports the real network state with
/// [`set_connected`](Self::set_connected). A developer override can force the
/// monitor offline regardless of the real state.
pub struct ManualConnectivity {
    real: AtomicBool,
    forced_offline: AtomicBool,
    tx: watch::Sender<bool>,
}

impl ManualConnectivity {
    pub fn new(connected: bool) -> Self {
        let (tx, _) = watch::channel(connected);
        Self {
            real: AtomicBool::new(connected),
            forced_offline: AtomicBool::new(false),
            tx,
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.real.store(connected, Ordering::SeqCst);
        self.publish();
    }

    /// Flip the forced-offline override and return its new value.
    pub fn toggle_force_offline(&self) -> bool {
        let forced = !self.forced_offline.fetch_xor(true, Ordering::SeqCst);
        log::info!("Forced offline: {}", forced);
        self.publish();
        forced
    }

    pub fn is_connected(&self) -> bool {
        self.real.load(Ordering::SeqCst) && !self.forced_offline.load(Ordering::SeqCst)
    }

    fn publish(&self) {
        self.tx.send_replace(self.is_connected());
    }
}

#[async_trait]
impl ConnectivityMonitor for ManualConnectivity {
    async fn current_status(&self) -> Result<bool, ConnectivityError> {
        Ok(self.is_connected())
    }

    fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
