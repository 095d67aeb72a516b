use std::path::PathBuf;

use ecgedge_ai::ValidationError;
use ecgedge_core::UpdateOutcome;
use ecgedge_store::StoreError;
use ecgedge_sync::DownloadError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdateError {
    /// Another cycle holds the update guard or the directory lease.
    #[error("an update is already in progress")]
    Busy,

    #[error("no artifact source configured; only rollback is available")]
    NoSource,

    #[error("no backup available to roll back to")]
    NoBackup,

    #[error("download from {source_url} failed: {error}")]
    Download {
        source_url: String,
        #[source]
        error: DownloadError,
    },

    /// The incoming slot could not be cleared, read from a backup or written.
    #[error("could not stage artifact from {source_url}: {error}")]
    Incoming {
        source_url: String,
        #[source]
        error: StoreError,
    },

    #[error("artifact from {source_url} failed validation: {error}")]
    Validation {
        source_url: String,
        #[source]
        error: ValidationError,
    },

    #[error("backing up current artifact before promoting {source_url} failed: {error}")]
    Backup {
        source_url: String,
        #[source]
        error: StoreError,
    },

    /// The backup was written but the rename over current failed. Current
    /// still holds the previous artifact.
    #[error(
        "promoting {source_url} failed after backup {backup:?} was written; current unchanged: {error}"
    )]
    Promote {
        source_url: String,
        backup: Option<PathBuf>,
        #[source]
        error: StoreError,
    },

    /// The cycle succeeded but its log entry could not be written.
    #[error("update log write failed: {0}")]
    AuditLog(#[source] StoreError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl UpdateError {
    /// Log outcome for errors that end a started cycle. `None` for errors
    /// raised before a cycle starts, and for the log write itself.
    pub fn outcome(&self) -> Option<UpdateOutcome> {
        match self {
            Self::Download { .. } | Self::Incoming { .. } => Some(UpdateOutcome::DownloadFailed),
            Self::Validation { .. } => Some(UpdateOutcome::ValidationFailed),
            Self::Backup { .. } => Some(UpdateOutcome::BackupFailed),
            Self::Promote { .. } => Some(UpdateOutcome::PromoteFailed),
            Self::Busy | Self::NoSource | Self::NoBackup | Self::AuditLog(_) | Self::Store(_) => {
                None
            }
        }
    }

    /// Backup written before the failure, if any.
    pub fn backup(&self) -> Option<&PathBuf> {
        match self {
            Self::Promote { backup, .. } => backup.as_ref(),
            _ => None,
        }
    }
}
