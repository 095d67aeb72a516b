use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no current artifact at {0}")]
    NoCurrent(PathBuf),

    #[error("no incoming artifact at {0}")]
    NoIncoming(PathBuf),

    #[error("writing incoming artifact {path}: {source}")]
    Incoming {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Step 1 of promotion failed; the current slot was not touched.
    #[error("backing up current artifact to {path}: {source}")]
    BackupFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The rename in step 2 of promotion failed after a backup was written.
    /// The current slot still holds the previous artifact.
    #[error("promoting incoming artifact (backup kept at {backup:?}): {source}")]
    PromoteFailed {
        backup: Option<PathBuf>,
        source: std::io::Error,
    },

    #[error("update lease {path}: {source}")]
    Lease {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
