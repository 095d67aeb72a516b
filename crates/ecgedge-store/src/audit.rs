//! Append-only model update log.
//!
//! Appends are serialised by an in-process mutex and each entry is written as
//! one complete line through an append-mode handle. Readers open the file on
//! their own and never take the writer lock; a trailing line without a
//! newline belongs to an append still in progress and is skipped.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ecgedge_core::UpdateAttempt;
use tracing::{info, warn};

use crate::StoreError;

/// Update log file with single-writer append discipline.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    writer: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one attempt as a single line.
    pub fn append(&self, attempt: &UpdateAttempt) -> Result<(), StoreError> {
        let mut line = attempt.to_log_line();
        line.push('\n');

        // A poisoned lock only means another append panicked; the file itself
        // is still line-consistent.
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;

        info!(
            outcome = %attempt.outcome,
            source = %attempt.source,
            "appended update log entry"
        );
        Ok(())
    }

    /// All entries in append order. A missing log reads as empty.
    ///
    /// Lines that do not parse (hand edits, older formats) are skipped with a
    /// warning rather than failing the whole read.
    pub fn read_all(&self) -> Result<Vec<UpdateAttempt>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut line = String::new();
        let mut line_no = 0usize;
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            line_no += 1;
            if !line.ends_with('\n') {
                // Partial line from an in-flight append.
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            match UpdateAttempt::from_log_line(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(line = line_no, error = %e, "skipping unreadable log line"),
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecgedge_core::UpdateOutcome;
    use std::sync::Arc;

    fn attempt(source: &str, outcome: UpdateOutcome) -> UpdateAttempt {
        UpdateAttempt::now(source, outcome, None, "")
    }

    #[test]
    fn missing_log_reads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AuditLog::new(&tmp.path().join("model_update.log"));
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn read_all_preserves_append_order() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AuditLog::new(&tmp.path().join("logs").join("model_update.log"));

        let outcomes = [
            UpdateOutcome::DownloadFailed,
            UpdateOutcome::Ok,
            UpdateOutcome::ValidationFailed,
            UpdateOutcome::Ok,
        ];
        for (i, outcome) in outcomes.iter().enumerate() {
            log.append(&attempt(&format!("http://host/m{i}"), *outcome)).unwrap();
        }

        let entries = log.read_all().unwrap();
        let sources: Vec<&str> = entries.iter().map(|e| e.source.as_str()).collect();
        assert_eq!(sources, ["http://host/m0", "http://host/m1", "http://host/m2", "http://host/m3"]);
        let read: Vec<UpdateOutcome> = entries.iter().map(|e| e.outcome).collect();
        assert_eq!(read, outcomes);
    }

    #[test]
    fn partial_trailing_line_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("model_update.log");
        let log = AuditLog::new(&path);
        log.append(&attempt("http://host/a", UpdateOutcome::Ok)).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"[2026-03-01 09:15:00]\t[OK]\thttp://host/b").unwrap();

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, "http://host/a");
    }

    #[test]
    fn unreadable_lines_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("model_update.log");
        std::fs::write(&path, "[2025-01-01 00:00:00] [OK] legacy free-form line\n").unwrap();
        let log = AuditLog::new(&path);
        log.append(&attempt("http://host/a", UpdateOutcome::Ok)).unwrap();

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn concurrent_appends_never_interleave_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let log = Arc::new(AuditLog::new(&tmp.path().join("model_update.log")));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        log.append(&attempt(&format!("http://host/{t}/{i}"), UpdateOutcome::Ok))
                            .unwrap();
                    }
                })
            })
            .collect();
        // Reads run alongside the writers and only ever see whole entries.
        for _ in 0..10 {
            for entry in log.read_all().unwrap() {
                assert!(entry.source.starts_with("http://host/"));
            }
        }
        for h in handles {
            h.join().unwrap();
        }

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 100);
        // Per-writer order is preserved.
        for t in 0..4 {
            let prefix = format!("http://host/{t}/");
            let seq: Vec<usize> = entries
                .iter()
                .filter_map(|e| e.source.strip_prefix(&prefix))
                .map(|i| i.parse().unwrap())
                .collect();
            assert_eq!(seq, (0..25).collect::<Vec<_>>());
        }
    }
}
