//! Error types for TaskSyncDB.
//!
//! Network-facing failures ([`RemoteError`], [`ConnectivityError`]) are turned
//! into sync outcomes by the engine and never reach the caller of
//! [`SyncEngine::save`](crate::SyncEngine::save). [`SyncError`] is what does
//! reach the caller: local store failures, validation and configuration.

use std::time::Duration;

use thiserror::Error;

/// Result alias used across the crate.
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Local store error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Task {0} not found")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        SyncError::Config(message.into())
    }
}

/// Failure of a single Remote Store call.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote store rejected {path} with status {status}")]
    Rejected { path: String, status: u16 },

    #[error("Remote operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid remote payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Remote subscription closed")]
    Closed,
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return RemoteError::Network(format!("request timed out: {err}"));
        }
        match err.status() {
            Some(status) => RemoteError::Rejected {
                path: err
                    .url()
                    .map(|u| u.path().to_string())
                    .unwrap_or_default(),
                status: status.as_u16(),
            },
            None => RemoteError::Network(err.to_string()),
        }
    }
}

/// Failure of a connectivity query.
#[derive(Error, Debug)]
pub enum ConnectivityError {
    #[error("Connectivity probe failed: {0}")]
    Probe(String),

    #[error("Connectivity monitor shut down")]
    Closed,
}

/// A remote record that could not be turned into a [`Task`](crate::Task).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed remote record {key}: {reason}")]
pub struct MalformedRecord {
    pub key: String,
    pub reason: String,
}

impl MalformedRecord {
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = SyncError::validation("title", "Title is required");
        assert_eq!(err.to_string(), "Validation error in title: Title is required");
    }

    #[test]
    fn test_remote_error_wraps_into_sync_error() {
        let err: SyncError = RemoteError::Timeout(Duration::from_secs(3)).into();
        assert!(matches!(err, SyncError::Remote(RemoteError::Timeout(_))));
    }

    #[test]
    fn test_malformed_record_display() {
        let err = MalformedRecord::new("abc", "record is not an object");
        assert_eq!(
            err.to_string(),
            "Malformed remote record abc: record is not an object"
        );
    }
}
