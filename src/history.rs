use chrono::{DateTime, Local};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use time_humanize::HumanTime;

use crate::app_dirs::AppDirs;
use crate::definition::{Difficulty, TestDefinition};
use crate::error::Result;
use crate::evaluation::EvaluationResult;
use crate::session::SessionState;
use crate::util::round2;

/// One line of the results log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub recorded_at: DateTime<Local>,
    pub test_id: String,
    pub difficulty: Difficulty,
    pub outcome: SessionState,
    pub duration_seconds: f64,
    pub wpm: f64,
    pub accuracy: f64,
    pub score: f64,
    /// Integrity flags joined with `;`
    pub flags: String,
}

impl HistoryRecord {
    pub fn new(
        definition: &TestDefinition,
        outcome: SessionState,
        evaluation: &EvaluationResult,
    ) -> Self {
        Self {
            recorded_at: Local::now(),
            test_id: definition.id.clone(),
            difficulty: definition.difficulty,
            outcome,
            duration_seconds: round2(evaluation.duration_seconds),
            wpm: round2(evaluation.wpm),
            accuracy: round2(evaluation.accuracy),
            score: evaluation.score,
            flags: evaluation.integrity_flags.iter().join(";"),
        }
    }

    /// "3 minutes ago" style age
    pub fn age(&self) -> String {
        let secs = (Local::now() - self.recorded_at).num_seconds().max(0);
        HumanTime::from_seconds(-secs).to_string()
    }
}

/// Append-only CSV log of finished sessions
#[derive(Debug, Clone)]
pub struct ResultHistory {
    path: PathBuf,
}

impl ResultHistory {
    pub fn new() -> Self {
        Self {
            path: AppDirs::history_path().unwrap_or_else(|| PathBuf::from("keytest_results.csv")),
        }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn append(&self, record: &HistoryRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // If the log doesn't exist yet we need to emit a header
        let needs_header = !self.path.exists();
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;
        Ok(())
    }

    /// All records, oldest first. A missing log is an empty history.
    pub fn read_all(&self) -> Result<Vec<HistoryRecord>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let records = reader
            .deserialize()
            .collect::<std::result::Result<Vec<HistoryRecord>, _>>()?;
        Ok(records)
    }
}

impl Default for ResultHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{evaluate, EngineConfig, EvaluationInput};
    use crate::keystroke::KeystrokeEvent;
    use tempfile::tempdir;

    fn evaluation(typed: &str, events: &[KeystrokeEvent]) -> EvaluationResult {
        evaluate(
            EvaluationInput {
                reference: "hello world",
                typed,
                events,
                dropped_inputs: 0,
                duration_seconds: 30.0,
            },
            &EngineConfig::default(),
        )
        .1
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempdir().unwrap();
        let history = ResultHistory::with_path(dir.path().join("logs").join("results.csv"));
        let def = TestDefinition::new("t-1", "hello world", Difficulty::Easy, 60);

        let clean = evaluation("hello", &[KeystrokeEvent::insert(0, 0, "hello")]);
        let pasted = evaluation(
            "hello world",
            &[KeystrokeEvent::insert(0, 0, "hello world")],
        );
        history
            .append(&HistoryRecord::new(&def, SessionState::Expired, &clean))
            .unwrap();
        history
            .append(&HistoryRecord::new(&def, SessionState::Submitted, &pasted))
            .unwrap();

        let records = history.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].outcome, SessionState::Expired);
        assert_eq!(records[0].flags, "");
        assert_eq!(records[1].accuracy, 100.0);
        assert_eq!(records[1].flags, "PASTE_DETECTED");
        assert_eq!(records[1].difficulty, Difficulty::Easy);
    }

    #[test]
    fn test_missing_log_is_empty() {
        let dir = tempdir().unwrap();
        let history = ResultHistory::with_path(dir.path().join("absent.csv"));
        assert!(history.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_age_is_human_readable() {
        let def = TestDefinition::new("t-1", "hello world", Difficulty::Easy, 60);
        let record = HistoryRecord::new(
            &def,
            SessionState::Submitted,
            &evaluation("hello", &[KeystrokeEvent::insert(0, 0, "hello")]),
        );
        assert!(!record.age().is_empty());
    }
}
