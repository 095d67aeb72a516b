//! Cross-process update lease.
//!
//! At most one update cycle may touch a model directory, whichever process
//! runs it. The lease is a lock file in that directory naming its holder. The
//! file is published with its contents in one step, so a reader never sees a
//! half-written lock. A lock whose holder has exited, or that is older than the
//! staleness threshold, is broken by the next acquirer.
//!
//! Lock file contents: JSON with `pid`, `token` and `acquired_secs`.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::StoreError;

pub const LEASE_FILE: &str = ".ecgedge.lock";
const LEASE_SCRATCH_PREFIX: &str = ".ecgedge.lock.";

/// Well beyond a download timeout plus validation of a large artifact.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(600);

static NEXT_LEASE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct LeaseMeta {
    pid: u32,
    /// Distinguishes leases taken by the same process.
    token: String,
    acquired_secs: i64,
}

impl LeaseMeta {
    fn is_stale(&self, stale_after: Duration) -> bool {
        let age = chrono::Utc::now().timestamp().saturating_sub(self.acquired_secs);
        let limit = i64::try_from(stale_after.as_secs()).unwrap_or(i64::MAX);
        age > limit || !pid_alive(self.pid)
    }
}

/// A held update lease. Dropping it removes the lock file, unless another
/// process broke the lease in the meantime.
#[derive(Debug)]
pub struct UpdateLease {
    path: PathBuf,
    token: String,
}

impl UpdateLease {
    /// Take the lease for `dir`, or `Ok(None)` while a live holder has it.
    pub fn try_acquire(dir: &Path, stale_after: Duration) -> Result<Option<Self>, StoreError> {
        let path = dir.join(LEASE_FILE);
        let wrap = |source| StoreError::Lease {
            path: path.clone(),
            source,
        };

        let pid = std::process::id();
        let now = chrono::Utc::now();
        let token = format!(
            "{pid}-{}-{}",
            now.timestamp_nanos_opt().unwrap_or_default(),
            NEXT_LEASE.fetch_add(1, Ordering::Relaxed)
        );
        let meta = LeaseMeta {
            pid,
            token: token.clone(),
            acquired_secs: now.timestamp(),
        };
        let body = serde_json::to_vec(&meta).map_err(|e| wrap(e.into()))?;

        // One retry after breaking a stale lock; losing that race means busy.
        for _ in 0..2 {
            let mut scratch = tempfile::Builder::new()
                .prefix(LEASE_SCRATCH_PREFIX)
                .tempfile_in(dir)
                .map_err(wrap)?;
            scratch.write_all(&body).map_err(wrap)?;
            scratch.as_file().sync_all().map_err(wrap)?;

            match scratch.persist_noclobber(&path) {
                Ok(_) => {
                    debug!(lease = %path.display(), "acquired update lease");
                    return Ok(Some(Self { path, token }));
                }
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(wrap(e.error)),
            }

            match read_meta(&path) {
                Some(held) if !held.is_stale(stale_after) => {
                    debug!(lease = %path.display(), holder = held.pid, "update lease is held");
                    return Ok(None);
                }
                held => {
                    warn!(
                        lease = %path.display(),
                        holder = ?held.map(|m| m.pid),
                        "breaking stale update lease"
                    );
                    match fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(wrap(e)),
                    }
                }
            }
        }
        Ok(None)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn owns_lock(&self) -> bool {
        read_meta(&self.path).is_some_and(|m| m.token == self.token)
    }
}

impl Drop for UpdateLease {
    fn drop(&mut self) {
        if !self.owns_lock() {
            warn!(lease = %self.path.display(), "update lease was taken over before release");
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(lease = %self.path.display(), "released update lease"),
            Err(e) => warn!(lease = %self.path.display(), error = %e, "could not release update lease"),
        }
    }
}

fn read_meta(path: &Path) -> Option<LeaseMeta> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Liveness via procfs. Without procfs every holder counts as alive and only
/// age makes a lease stale.
fn pid_alive(pid: u32) -> bool {
    let proc = Path::new("/proc");
    !proc.join("self").exists() || proc.join(pid.to_string()).exists()
}
