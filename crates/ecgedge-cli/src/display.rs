//! Terminal rendering for predictions and the model update log.

use std::fmt::Write as _;

use ecgedge_ai::Prediction;
use ecgedge_core::labels::{rhythm_code, t_wave_code};
use ecgedge_core::{FeatureRecord, UpdateAttempt};

const LABEL_WIDTH: usize = 18;

// ── Public API ──

/// The two-line result the edge `predict` command has always printed.
pub fn render_prediction(prediction: &Prediction) -> String {
    format!(
        "Predicted class: {}\nConfidence: {:.2}%\n",
        prediction.label,
        prediction.confidence * 100.0
    )
}

/// Vertical card with the inputs as the model saw them, for `predict --verbose`.
pub fn render_record_card(record: &FeatureRecord) -> String {
    let mut out = String::new();
    section(
        &mut out,
        "Measurements",
        &[
            ("Heart_Rate", format!("{} bpm", record.heart_rate)),
            ("PR_Interval", format!("{} ms", record.pr_interval)),
            ("QRS_Duration", format!("{} ms", record.qrs_duration)),
            ("ST_Segment", format!("{} mV", record.st_segment)),
            ("QTc_Interval", format!("{} ms", record.qtc_interval)),
            ("Electrical_Axis", format!("{}°", record.electrical_axis)),
        ],
    );
    section(
        &mut out,
        "Categories",
        &[
            (
                "Rhythm",
                format!("{} (code {})", record.rhythm, rhythm_code(&record.rhythm)),
            ),
            (
                "T_Wave",
                format!("{} (code {})", record.t_wave, t_wave_code(&record.t_wave)),
            ),
        ],
    );
    out
}

/// Update log, oldest first, optionally limited to the last `limit` entries.
pub fn render_log(entries: &[UpdateAttempt], limit: Option<usize>) -> String {
    if entries.is_empty() {
        return "No update log found.\n".to_string();
    }

    let skip = limit.map_or(0, |n| entries.len().saturating_sub(n));
    let mut out = String::from("Model Update Log:\n");
    for entry in &entries[skip..] {
        let _ = writeln!(out, "{entry}");
    }

    let ok = entries.iter().filter(|e| e.outcome.is_ok()).count();
    let _ = writeln!(
        out,
        "\n{} attempts, {} succeeded, {} failed",
        entries.len(),
        ok,
        entries.len() - ok
    );
    out
}

// ── Section rendering ──

fn section(out: &mut String, header: &str, rows: &[(&str, String)]) {
    let _ = writeln!(out, "{header}");
    for (name, value) in rows {
        let _ = writeln!(out, "  {name:<LABEL_WIDTH$} {value}");
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecgedge_core::{Diagnosis, UpdateOutcome};
    use std::path::PathBuf;

    fn attempt(outcome: UpdateOutcome, source: &str) -> UpdateAttempt {
        UpdateAttempt::now(source, outcome, None, "detail")
    }

    #[test]
    fn prediction_prints_percentage() {
        let p = Prediction {
            label: Diagnosis::Normal,
            confidence: 0.9731,
        };
        assert_eq!(
            render_prediction(&p),
            "Predicted class: Normal\nConfidence: 97.31%\n"
        );
    }

    #[test]
    fn empty_log_says_so() {
        assert_eq!(render_log(&[], None), "No update log found.\n");
    }

    #[test]
    fn log_limit_keeps_newest_and_totals_everything() {
        let entries = vec![
            attempt(UpdateOutcome::Ok, "http://a"),
            attempt(UpdateOutcome::DownloadFailed, "http://b"),
            attempt(UpdateOutcome::Ok, "http://c"),
        ];
        let out = render_log(&entries, Some(1));
        assert!(!out.contains("http://a"));
        assert!(!out.contains("http://b"));
        assert!(out.contains("http://c"));
        assert!(out.contains("3 attempts, 2 succeeded, 1 failed"));
    }

    #[test]
    fn log_shows_backup_path() {
        let mut entry = attempt(UpdateOutcome::Ok, "http://a");
        entry.backup = Some(PathBuf::from("ecg_model_backup_20250101_120000.onnx"));
        let out = render_log(&[entry], None);
        assert!(out.contains("ecg_model_backup_20250101_120000.onnx"));
    }

    #[test]
    fn record_card_shows_codes() {
        let record = FeatureRecord {
            heart_rate: 75.0,
            pr_interval: 160.0,
            qrs_duration: 90.0,
            st_segment: 0.1,
            qtc_interval: 400.0,
            electrical_axis: 30.0,
            rhythm: "Atrial Fibrillation".into(),
            t_wave: "Peaked".into(),
        };
        let card = render_record_card(&record);
        assert!(card.contains("Atrial Fibrillation (code 3)"));
        assert!(card.contains("Peaked (code 2)"));
        assert!(card.starts_with("Measurements\n"));
    }
}
