use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use reqwest::{Client, header::ACCEPT};
use serde_json::Value;
use tokio::sync::mpsc;

use super::{RemoteStore, SnapshotStream, segments};
use crate::error::RemoteError;

/// Remote Store speaking the realtime-database REST dialect.
///
/// `write` is `PUT {base}/{path}.json`, `read_once` is `GET {base}/{path}.json`
/// and `subscribe` listens on the same URL with `Accept: text/event-stream`.
/// Every `put` or `patch` event triggers a fresh read of the whole path, so
/// subscribers always get full snapshots rather than deltas.
#[derive(Clone)]
pub struct RestRemoteStore {
    client: Client,
    base_url: String,
    reconnect_delay: Duration,
}

impl RestRemoteStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            reconnect_delay: Duration::from_secs(5),
        })
    }

    /// Delay before re-opening a dropped event stream.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        let path = segments(path).collect::<Vec<_>>().join("/");
        format!("{}/{}.json", self.base_url, path)
    }

    async fn stream_events(self, path: String, tx: mpsc::Sender<Result<Value, RemoteError>>) {
        loop {
            match self.listen(&path, &tx).await {
                Ok(()) => log::info!("Event stream for {} ended", path),
                Err(e) => {
                    log::warn!("Event stream for {} failed: {}", path, e);
                    if tx.send(Err(e)).await.is_err() {
                        return;
                    }
                }
            }
            if tx.is_closed() {
                return;
            }
            tokio::time::sleep(self.reconnect_delay).await;
            log::debug!("Reconnecting event stream for {}", path);
        }
    }

    async fn listen(
        &self,
        path: &str,
        tx: &mpsc::Sender<Result<Value, RemoteError>>,
    ) -> Result<(), RemoteError> {
        let response = self
            .client
            .get(self.url(path))
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RemoteError::Rejected {
                path: path.to_string(),
                status: response.status().as_u16(),
            });
        }

        let mut body = response.bytes_stream();
        let mut parser = SseParser::default();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for event in parser.feed(&chunk) {
                match event.name.as_str() {
                    "put" | "patch" => {
                        let snapshot = self.read_once(path).await?.unwrap_or(Value::Null);
                        if tx.send(Ok(snapshot)).await.is_err() {
                            return Ok(());
                        }
                    }
                    "keep-alive" => {}
                    "cancel" | "auth_revoked" => return Err(RemoteError::Closed),
                    other => log::debug!("Ignoring {} event on {}: {}", other, path, event.data),
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn write(&self, path: &str, value: Value) -> Result<(), RemoteError> {
        let response = self.client.put(self.url(path)).json(&value).send().await?;
        if !response.status().is_success() {
            return Err(RemoteError::Rejected {
                path: path.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn read_once(&self, path: &str) -> Result<Option<Value>, RemoteError> {
        let response = self.client.get(self.url(path)).send().await?;
        if !response.status().is_success() {
            return Err(RemoteError::Rejected {
                path: path.to_string(),
                status: response.status().as_u16(),
            });
        }
        match response.json::<Value>().await? {
            Value::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }

    fn subscribe(&self, path: &str) -> SnapshotStream {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(self.clone().stream_events(path.to_string(), tx));
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SseEvent {
    name: String,
    data: String,
}

/// Incremental `text/event-stream` parser.
#[derive(Debug, Default)]
struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }
        events
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let name = self.event.take();
        if name.is_none() && self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            name: name.unwrap_or_else(|| "message".to_string()),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}
