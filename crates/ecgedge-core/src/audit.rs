//! Model update attempt records and their one-line log representation.

use std::fmt;
use std::path::PathBuf;

use chrono::{NaiveDateTime, Timelike};
use thiserror::Error;

/// Timestamp format used in the update log.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const NO_BACKUP: &str = "None";

/// Terminal outcome of one update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Ok,
    DownloadFailed,
    ValidationFailed,
    /// Copying the current artifact aside failed; current was not touched.
    BackupFailed,
    /// Backup was written but the rename into the current slot failed.
    PromoteFailed,
}

impl UpdateOutcome {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::DownloadFailed => "DOWNLOAD_FAILED",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::BackupFailed => "BACKUP_FAILED",
            Self::PromoteFailed => "PROMOTE_FAILED",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "OK" => Some(Self::Ok),
            "DOWNLOAD_FAILED" => Some(Self::DownloadFailed),
            "VALIDATION_FAILED" => Some(Self::ValidationFailed),
            "BACKUP_FAILED" => Some(Self::BackupFailed),
            "PROMOTE_FAILED" => Some(Self::PromoteFailed),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LogLineError {
    #[error("expected 5 tab-separated fields, found {0}")]
    FieldCount(usize),
    #[error("bad timestamp `{0}`")]
    Timestamp(String),
    #[error("unknown outcome tag `{0}`")]
    Outcome(String),
}

/// One entry of the append-only update log.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateAttempt {
    /// Local wall-clock time, second precision.
    pub timestamp: NaiveDateTime,
    /// Download URL, or `backup:<path>` for a rollback.
    pub source: String,
    pub outcome: UpdateOutcome,
    pub backup: Option<PathBuf>,
    pub detail: String,
}

impl UpdateAttempt {
    /// Create an attempt stamped with the current local time.
    pub fn now(
        source: impl Into<String>,
        outcome: UpdateOutcome,
        backup: Option<PathBuf>,
        detail: impl Into<String>,
    ) -> Self {
        let now = chrono::Local::now().naive_local();
        // The log keeps second precision.
        let timestamp = now.with_nanosecond(0).unwrap_or(now);
        Self {
            timestamp,
            source: source.into(),
            outcome,
            backup,
            detail: detail.into(),
        }
    }

    /// Serialise as a single log line (no trailing newline).
    ///
    /// Layout: `[timestamp]\t[TAG]\tsource\tbackup|None\tdetail`. Tabs and
    /// line breaks inside fields are replaced with spaces.
    pub fn to_log_line(&self) -> String {
        let backup = self
            .backup
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| NO_BACKUP.to_string());
        format!(
            "[{}]\t[{}]\t{}\t{}\t{}",
            self.timestamp.format(LOG_TIMESTAMP_FORMAT),
            self.outcome.tag(),
            sanitize(&self.source),
            sanitize(&backup),
            sanitize(&self.detail),
        )
    }

    /// Parse a line produced by [`to_log_line`](Self::to_log_line).
    pub fn from_log_line(line: &str) -> Result<Self, LogLineError> {
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
        let [ts, tag, source, backup, detail] = fields[..] else {
            return Err(LogLineError::FieldCount(fields.len()));
        };

        let ts = strip_brackets(ts);
        let timestamp = NaiveDateTime::parse_from_str(ts, LOG_TIMESTAMP_FORMAT)
            .map_err(|_| LogLineError::Timestamp(ts.to_string()))?;
        let tag = strip_brackets(tag);
        let outcome =
            UpdateOutcome::from_tag(tag).ok_or_else(|| LogLineError::Outcome(tag.to_string()))?;
        let backup = (backup != NO_BACKUP).then(|| PathBuf::from(backup));

        Ok(Self {
            timestamp,
            source: source.to_string(),
            outcome,
            backup,
            detail: detail.to_string(),
        })
    }
}

impl fmt::Display for UpdateAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] [{}] {}",
            self.timestamp.format(LOG_TIMESTAMP_FORMAT),
            self.outcome,
            self.source
        )?;
        if let Some(backup) = &self.backup {
            write!(f, " | backup: {}", backup.display())?;
        }
        if !self.detail.is_empty() {
            write!(f, " | {}", self.detail)?;
        }
        Ok(())
    }
}

fn sanitize(field: &str) -> String {
    field.replace(['\t', '\n', '\r'], " ")
}

fn strip_brackets(s: &str) -> &str {
    s.strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ts: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(ts, LOG_TIMESTAMP_FORMAT).unwrap()
    }

    #[test]
    fn log_line_layout() {
        let attempt = UpdateAttempt {
            timestamp: at("2026-03-01 09:15:00"),
            source: "http://edge.local/download-model".into(),
            outcome: UpdateOutcome::Ok,
            backup: Some(PathBuf::from("models/ecg_model_backup_20260301_091500.onnx")),
            detail: "model updated".into(),
        };
        assert_eq!(
            attempt.to_log_line(),
            "[2026-03-01 09:15:00]\t[OK]\thttp://edge.local/download-model\t\
             models/ecg_model_backup_20260301_091500.onnx\tmodel updated"
        );
        assert_eq!(UpdateAttempt::from_log_line(&attempt.to_log_line()).unwrap(), attempt);
    }

    #[test]
    fn missing_backup_renders_none() {
        let attempt = UpdateAttempt {
            timestamp: at("2026-03-01 09:15:00"),
            source: "http://edge.local/m".into(),
            outcome: UpdateOutcome::DownloadFailed,
            backup: None,
            detail: "server returned 500".into(),
        };
        let line = attempt.to_log_line();
        assert!(line.contains("\tNone\t"));
        let parsed = UpdateAttempt::from_log_line(&line).unwrap();
        assert!(parsed.backup.is_none());
        assert_eq!(parsed.outcome, UpdateOutcome::DownloadFailed);
    }

    #[test]
    fn control_characters_in_detail_are_flattened() {
        let attempt = UpdateAttempt {
            timestamp: at("2026-03-01 09:15:00"),
            source: "u".into(),
            outcome: UpdateOutcome::ValidationFailed,
            backup: None,
            detail: "line one\nline\ttwo".into(),
        };
        let line = attempt.to_log_line();
        assert!(!line.contains('\n'));
        let parsed = UpdateAttempt::from_log_line(&line).unwrap();
        assert_eq!(parsed.detail, "line one line two");
    }

    #[test]
    fn rejects_unknown_tag() {
        let err = UpdateAttempt::from_log_line("[2026-03-01 09:15:00]\t[MAYBE]\tu\tNone\t").unwrap_err();
        assert_eq!(err, LogLineError::Outcome("MAYBE".into()));
    }

    #[test]
    fn rejects_short_line() {
        let err = UpdateAttempt::from_log_line("[2026-03-01 09:15:00] [OK] legacy").unwrap_err();
        assert_eq!(err, LogLineError::FieldCount(1));
    }

    #[test]
    fn now_has_second_precision() {
        let attempt = UpdateAttempt::now("u", UpdateOutcome::Ok, None, "");
        assert_eq!(attempt.timestamp.and_utc().timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn outcome_tags_roundtrip() {
        for outcome in [
            UpdateOutcome::Ok,
            UpdateOutcome::DownloadFailed,
            UpdateOutcome::ValidationFailed,
            UpdateOutcome::BackupFailed,
            UpdateOutcome::PromoteFailed,
        ] {
            assert_eq!(UpdateOutcome::from_tag(outcome.tag()), Some(outcome));
        }
    }
}
