use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::watch;

use super::ConnectivityMonitor;
use crate::error::ConnectivityError;
use crate::subscription::Subscription;

/// Reachability by probing a URL.
///
/// Any HTTP response, including an error status, counts as connected; only
/// transport failures count as disconnected.
pub struct HttpProbe {
    client: Client,
    url: String,
    tx: watch::Sender<bool>,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ConnectivityError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectivityError::Probe(e.to_string()))?;
        let (tx, _) = watch::channel(false);
        Ok(Self {
            client,
            url: url.into(),
            tx,
        })
    }

    async fn probe(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(_) => true,
            Err(e) => {
                log::debug!("Probe of {} failed: {}", self.url, e);
                false
            }
        }
    }

    /// Probe every `interval` and publish changes to watchers.
    pub fn start(self: &Arc<Self>, interval: Duration) -> Subscription {
        let probe = Arc::clone(self);
        Subscription::new(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(100)));
            loop {
                ticker.tick().await;
                let connected = probe.probe().await;
                let changed = probe.tx.send_if_modified(|current| {
                    let changed = *current != connected;
                    *current = connected;
                    changed
                });
                if changed {
                    log::info!("Connectivity changed: connected = {}", connected);
                }
            }
        }))
    }
}

#[async_trait]
impl ConnectivityMonitor for HttpProbe {
    async fn current_status(&self) -> Result<bool, ConnectivityError> {
        Ok(self.probe().await)
    }

    fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
