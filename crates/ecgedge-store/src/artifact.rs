//! Model artifact slots on local disk.
//!
//! A model directory holds three kinds of file:
//!
//! - `ecg_model.onnx`, the current artifact used for inference
//! - `ecg_model_backup_<YYYYmmdd_HHMMSS>.onnx`, one per promotion, never pruned
//! - `temp_model.onnx`, the incoming download awaiting validation
//! - `.ecgedge.lock`, the update lease (see [`crate::lease`])
//!
//! Promotion is two ordered steps: a durable copy of current into a new backup
//! file, then a single `rename` of the candidate over current. A crash between
//! or during either step leaves current as the old, loadable artifact.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::StoreError;
use crate::lease::{DEFAULT_STALE_AFTER, UpdateLease};

pub const CURRENT_FILE: &str = "ecg_model.onnx";
pub const INCOMING_FILE: &str = "temp_model.onnx";
const BACKUP_PREFIX: &str = "ecg_model_backup_";
const ARTIFACT_EXT: &str = ".onnx";
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const SCRATCH_PREFIX: &str = ".ecgedge-";

/// Filesystem-backed artifact slots rooted at one directory.
///
/// All paths live in the same directory so that promotion is a same-filesystem
/// rename.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Open (creating if needed) the model directory.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn current_path(&self) -> PathBuf {
        self.dir.join(CURRENT_FILE)
    }

    pub fn incoming_path(&self) -> PathBuf {
        self.dir.join(INCOMING_FILE)
    }

    pub fn has_current(&self) -> bool {
        self.current_path().is_file()
    }

    pub fn read_current(&self) -> Result<Vec<u8>, StoreError> {
        let path = self.current_path();
        if !path.is_file() {
            return Err(StoreError::NoCurrent(path));
        }
        Ok(fs::read(path)?)
    }

    /// Take the update lease for this directory, or `Ok(None)` while another
    /// cycle holds it.
    pub fn lease(&self) -> Result<Option<UpdateLease>, StoreError> {
        UpdateLease::try_acquire(&self.dir, DEFAULT_STALE_AFTER)
    }

    // ── Incoming slot ──

    /// Write candidate bytes into the incoming slot.
    ///
    /// Bytes go to a scratch file first and are renamed into place once
    /// flushed, so the incoming slot never holds a truncated download.
    pub fn write_incoming(&self, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let path = self.incoming_path();
        let wrap = |source| StoreError::Incoming {
            path: path.clone(),
            source,
        };

        let mut scratch = self.scratch_file().map_err(wrap)?;
        scratch.write_all(bytes).map_err(wrap)?;
        scratch.as_file().sync_all().map_err(wrap)?;
        scratch.persist(&path).map_err(|e| wrap(e.error))?;

        info!(path = %path.display(), bytes = bytes.len(), "wrote incoming artifact");
        Ok(path)
    }

    pub fn read_incoming(&self) -> Result<Vec<u8>, StoreError> {
        let path = self.incoming_path();
        if !path.is_file() {
            return Err(StoreError::NoIncoming(path));
        }
        Ok(fs::read(path)?)
    }

    /// Remove the incoming slot. Returns whether a file was removed.
    pub fn discard_incoming(&self) -> Result<bool, StoreError> {
        remove_if_exists(&self.incoming_path())
    }

    /// Bytes of an existing backup, e.g. the candidate for a rollback.
    pub fn read_backup(&self, backup: &Path) -> Result<Vec<u8>, StoreError> {
        Ok(fs::read(backup)?)
    }

    // ── Promotion ──

    /// Promote a validated candidate into the current slot.
    ///
    /// Returns the backup written for the previous current artifact, or `None`
    /// when there was no current artifact yet.
    pub fn promote(&self, candidate: &Path) -> Result<Option<PathBuf>, StoreError> {
        if !candidate.is_file() {
            return Err(StoreError::NoIncoming(candidate.to_path_buf()));
        }
        let backup = self.backup_current()?;
        self.install(candidate, backup.as_deref())?;
        Ok(backup)
    }

    /// Step 1: durably copy current into a new, uniquely named backup file.
    ///
    /// The copy is flushed to a scratch file and linked under its final name
    /// without overwriting anything. If the directory entry cannot be flushed
    /// the backup is withdrawn, so a reported failure never leaves a backup
    /// behind that might not survive a power loss.
    pub fn backup_current(&self) -> Result<Option<PathBuf>, StoreError> {
        self.backup_current_with(sync_dir)
    }

    fn backup_current_with(
        &self,
        sync: impl Fn(&Path) -> io::Result<()>,
    ) -> Result<Option<PathBuf>, StoreError> {
        let current = self.current_path();
        if !current.is_file() {
            return Ok(None);
        }

        let stamp = chrono::Local::now().format(BACKUP_TIMESTAMP_FORMAT).to_string();
        let mut attempt = 0u32;
        loop {
            let path = self.dir.join(backup_file_name(&stamp, attempt));
            if path.exists() {
                attempt += 1;
                continue;
            }
            let wrap = |source| StoreError::BackupFailed {
                path: path.clone(),
                source,
            };

            let mut scratch = self.scratch_file().map_err(wrap)?;
            let mut source = File::open(&current).map_err(wrap)?;
            std::io::copy(&mut source, scratch.as_file_mut()).map_err(wrap)?;
            scratch.as_file().sync_all().map_err(wrap)?;

            match scratch.persist_noclobber(&path) {
                Ok(_) => {
                    if let Err(source) = sync(&self.dir) {
                        if let Err(e) = fs::remove_file(&path) {
                            warn!(backup = %path.display(), error = %e, "could not withdraw unsynced backup");
                        }
                        return Err(wrap(source));
                    }
                    info!(backup = %path.display(), "backed up current artifact");
                    return Ok(Some(path));
                }
                // Lost a race for this name; try the next suffix.
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(wrap(e.error)),
            }
        }
    }

    /// Step 2: atomically rename the candidate over the current slot.
    ///
    /// Only a failed rename is an error. Once the rename succeeded the new
    /// artifact is current, and a failure to flush the directory afterwards is
    /// logged but not reported.
    pub fn install(&self, candidate: &Path, backup: Option<&Path>) -> Result<(), StoreError> {
        self.install_with(candidate, backup, sync_dir)
    }

    fn install_with(
        &self,
        candidate: &Path,
        backup: Option<&Path>,
        sync: impl Fn(&Path) -> io::Result<()>,
    ) -> Result<(), StoreError> {
        let current = self.current_path();
        if let Err(source) = fs::rename(candidate, &current) {
            warn!(
                candidate = %candidate.display(),
                error = %source,
                "promotion rename failed; current artifact unchanged"
            );
            return Err(StoreError::PromoteFailed {
                backup: backup.map(Path::to_path_buf),
                source,
            });
        }
        if let Err(e) = sync(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "promoted artifact may not survive a power loss");
        }
        info!(current = %current.display(), "promoted artifact to current");
        Ok(())
    }

    // ── Backups ──

    /// All backup files, oldest first.
    pub fn backups(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut found: Vec<(String, u32, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some((stamp, suffix)) = parse_backup_name(name) {
                found.push((stamp.to_string(), suffix, path.clone()));
            }
        }
        found.sort();
        Ok(found.into_iter().map(|(_, _, path)| path).collect())
    }

    /// Most recent backup, if any.
    pub fn backup_path(&self) -> Result<Option<PathBuf>, StoreError> {
        Ok(self.backups()?.pop())
    }

    // ── Recovery ──

    /// Clear leftovers of an interrupted cycle: the incoming slot and any
    /// scratch files. Current and backups are never touched.
    ///
    /// Returns the number of files removed.
    pub fn recover(&self) -> Result<usize, StoreError> {
        let mut removed = usize::from(self.discard_incoming()?);
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_scratch = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(SCRATCH_PREFIX));
            if is_scratch && remove_if_exists(&path)? {
                removed += 1;
            }
        }
        if removed > 0 {
            warn!(removed, dir = %self.dir.display(), "removed leftovers of an interrupted update");
        }
        Ok(removed)
    }

    fn scratch_file(&self) -> io::Result<tempfile::NamedTempFile> {
        tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempfile_in(&self.dir)
    }
}

fn backup_file_name(stamp: &str, attempt: u32) -> String {
    if attempt == 0 {
        format!("{BACKUP_PREFIX}{stamp}{ARTIFACT_EXT}")
    } else {
        format!("{BACKUP_PREFIX}{stamp}_{attempt}{ARTIFACT_EXT}")
    }
}

/// Split `ecg_model_backup_<stamp>[_<n>].onnx` into `(stamp, n)`.
fn parse_backup_name(name: &str) -> Option<(&str, u32)> {
    let rest = name
        .strip_prefix(BACKUP_PREFIX)?
        .strip_suffix(ARTIFACT_EXT)?;
    // The stamp itself is `YYYYmmdd_HHMMSS` (15 chars).
    let (stamp, tail) = rest.split_at_checked(15)?;
    if !stamp.bytes().all(|b| b.is_ascii_digit() || b == b'_') {
        return None;
    }
    match tail {
        "" => Some((stamp, 0)),
        t => t.strip_prefix('_')?.parse().ok().map(|n| (stamp, n)),
    }
}

fn remove_if_exists(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Flush directory metadata so renames survive a power loss.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
