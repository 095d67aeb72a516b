//! The update cycle driver.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ecgedge_ai::{ArtifactInfo, ArtifactValidator};
use ecgedge_core::{UpdateAttempt, UpdateOutcome};
use ecgedge_store::{ArtifactStore, AuditLog, UpdateLease};
use ecgedge_sync::ArtifactSource;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::{UpdateError, UpdateState};

/// How often a queued cycle checks whether another process released the lease.
const LEASE_POLL: Duration = Duration::from_millis(100);

/// Result of a successful cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReport {
    pub source: String,
    /// Backup of the previous current artifact; `None` on first install.
    pub backup: Option<PathBuf>,
    pub artifact: ArtifactInfo,
}

/// Where the candidate for a cycle comes from.
enum Candidate {
    Download {
        url: String,
        source: Arc<dyn ArtifactSource>,
    },
    Backup(PathBuf),
}

impl Candidate {
    fn label(&self) -> String {
        match self {
            Self::Download { url, .. } => url.clone(),
            Self::Backup(path) => format!("backup:{}", path.display()),
        }
    }
}

/// Drives update cycles against one artifact store.
///
/// At most one cycle runs per model directory. Within a process the cycle
/// guard serializes callers; across processes the directory's
/// [`UpdateLease`] does. [`run`](Self::run) and [`rollback`](Self::rollback)
/// reject with [`UpdateError::Busy`] while either is held,
/// [`run_queued`](Self::run_queued) waits for both.
pub struct Updater {
    store: ArtifactStore,
    log: Arc<AuditLog>,
    source: Option<Arc<dyn ArtifactSource>>,
    validator: Arc<dyn ArtifactValidator>,
    cycle: Mutex<()>,
    state: watch::Sender<UpdateState>,
}

impl Updater {
    /// An updater that can only roll back. Add a source with
    /// [`with_source`](Self::with_source) to download updates.
    pub fn new(
        store: ArtifactStore,
        log: Arc<AuditLog>,
        validator: Arc<dyn ArtifactValidator>,
    ) -> Self {
        let (state, _) = watch::channel(UpdateState::Idle);
        Self {
            store,
            log,
            source: None,
            validator,
            cycle: Mutex::new(()),
            state,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn ArtifactSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn log(&self) -> &AuditLog {
        &self.log
    }

    pub fn state(&self) -> UpdateState {
        *self.state.borrow()
    }

    /// Watch state transitions as they happen.
    pub fn subscribe(&self) -> watch::Receiver<UpdateState> {
        self.state.subscribe()
    }

    /// Run one update cycle from `url`, or fail with `Busy` if one is running.
    pub async fn run(&self, url: &str) -> Result<UpdateReport, UpdateError> {
        let _guard = self.cycle.try_lock().map_err(|_| UpdateError::Busy)?;
        let candidate = self.download(url)?;
        let _lease = self.store.lease()?.ok_or(UpdateError::Busy)?;
        self.cycle_locked(candidate).await
    }

    /// Run one update cycle from `url`, waiting for any running cycle first.
    pub async fn run_queued(&self, url: &str) -> Result<UpdateReport, UpdateError> {
        let _guard = self.cycle.lock().await;
        let candidate = self.download(url)?;
        let _lease = self.wait_for_lease().await?;
        self.cycle_locked(candidate).await
    }

    /// Re-validate the newest backup and promote it back to current.
    ///
    /// The artifact being replaced is itself backed up first, so a rollback
    /// can be undone the same way.
    pub async fn rollback(&self) -> Result<UpdateReport, UpdateError> {
        let _guard = self.cycle.try_lock().map_err(|_| UpdateError::Busy)?;
        let _lease = self.store.lease()?.ok_or(UpdateError::Busy)?;
        let backup = self.store.backup_path()?.ok_or(UpdateError::NoBackup)?;
        self.cycle_locked(Candidate::Backup(backup)).await
    }

    fn download(&self, url: &str) -> Result<Candidate, UpdateError> {
        let source = self.source.as_ref().ok_or(UpdateError::NoSource)?;
        Ok(Candidate::Download {
            url: url.to_string(),
            source: Arc::clone(source),
        })
    }

    async fn wait_for_lease(&self) -> Result<UpdateLease, UpdateError> {
        loop {
            if let Some(lease) = self.store.lease()? {
                return Ok(lease);
            }
            debug!(dir = %self.store.dir().display(), "waiting for update lease");
            tokio::time::sleep(LEASE_POLL).await;
        }
    }

    /// One full cycle. The caller holds the guard and the lease, so nothing
    /// else writes the incoming slot until this returns.
    async fn cycle_locked(&self, candidate: Candidate) -> Result<UpdateReport, UpdateError> {
        let label = candidate.label();

        let result = match self.store.recover() {
            Ok(_) => self.traverse(candidate, &label).await,
            Err(error) => Err(UpdateError::Incoming {
                source_url: label.clone(),
                error,
            }),
        };
        if result.is_err() {
            self.discard_incoming();
        }

        let logged = self.record(&label, &result);
        self.transition(UpdateState::Logged);
        self.transition(UpdateState::Idle);

        match (result, logged) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(e)) => Err(UpdateError::AuditLog(e)),
            (Err(e), _) => Err(e),
        }
    }

    async fn traverse(
        &self,
        candidate: Candidate,
        label: &str,
    ) -> Result<UpdateReport, UpdateError> {
        let staging = |error| UpdateError::Incoming {
            source_url: label.to_string(),
            error,
        };

        let bytes = match candidate {
            Candidate::Download { url, source } => {
                self.transition(UpdateState::Downloading);
                source
                    .fetch(&url)
                    .await
                    .map_err(|error| UpdateError::Download {
                        source_url: url.clone(),
                        error,
                    })?
            }
            Candidate::Backup(path) => self.store.read_backup(&path).map_err(staging)?,
        };
        let incoming = self.store.write_incoming(&bytes).map_err(staging)?;

        // The bytes validated here are the bytes just written to `incoming`,
        // and only this cycle writes it while the lease is held.
        self.transition(UpdateState::Validating);
        let validator = Arc::clone(&self.validator);
        let artifact = tokio::task::spawn_blocking(move || validator.validate(&bytes))
            .await
            .map_err(|e| UpdateError::Validation {
                source_url: label.to_string(),
                error: ecgedge_ai::ValidationError::Allocation(format!("validator panicked: {e}")),
            })?
            .map_err(|error| UpdateError::Validation {
                source_url: label.to_string(),
                error,
            })?;

        self.transition(UpdateState::BackingUp);
        let backup = self
            .store
            .backup_current()
            .map_err(|error| UpdateError::Backup {
                source_url: label.to_string(),
                error,
            })?;

        self.transition(UpdateState::Promoting);
        self.store
            .install(&incoming, backup.as_deref())
            .map_err(|error| UpdateError::Promote {
                source_url: label.to_string(),
                backup: backup.clone(),
                error,
            })?;

        Ok(UpdateReport {
            source: label.to_string(),
            backup,
            artifact,
        })
    }

    fn record(
        &self,
        label: &str,
        result: &Result<UpdateReport, UpdateError>,
    ) -> Result<(), ecgedge_store::StoreError> {
        let attempt = match result {
            Ok(report) => {
                info!(
                    source = %label,
                    backup = ?report.backup,
                    bytes = report.artifact.size_bytes,
                    "model updated"
                );
                UpdateAttempt::now(label, UpdateOutcome::Ok, report.backup.clone(), "model updated")
            }
            Err(e) => {
                error!(source = %label, error = %e, "model update failed");
                let Some(outcome) = e.outcome() else {
                    return Ok(());
                };
                UpdateAttempt::now(label, outcome, e.backup().cloned(), e.to_string())
            }
        };

        let appended = self.log.append(&attempt);
        if let Err(e) = &appended {
            error!(error = %e, path = %self.log.path().display(), "could not write update log");
        }
        appended
    }

    fn discard_incoming(&self) {
        if let Err(e) = self.store.discard_incoming() {
            warn!(error = %e, "could not remove incoming artifact");
        }
    }

    fn transition(&self, next: UpdateState) {
        let prev = self.state.send_replace(next);
        info!(from = %prev, to = %next, "update state");
    }
}
