use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("download timed out after {0:?}")]
    Timeout(Duration),
    #[error("server returned an empty artifact")]
    Empty,
}

/// Somewhere a candidate artifact can be fetched from.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Fetch the full artifact body. Partial bodies are never returned.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError>;
}
