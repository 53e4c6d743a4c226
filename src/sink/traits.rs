use crate::source::entry::LogEntry;
use async_trait::async_trait;
use thiserror::Error;

/// A delivery backend.
///
/// Each implementation owns its wire protocol; the pipeline only sees
/// whether a single entry was accepted.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one entry. Failures are logged by the sink and reported as `false`.
    async fn send(&self, entry: &LogEntry) -> bool;
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("unknown backend '{backend}' (available: {available})")]
    UnknownBackend { backend: String, available: String },

    #[error("failed to build {backend} sink: {reason}")]
    Build { backend: String, reason: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
