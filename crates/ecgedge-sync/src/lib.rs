//! Sync layer: where candidate model artifacts come from.

mod source;
pub use source::{ArtifactSource, DownloadError};

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::HttpArtifactSource;
