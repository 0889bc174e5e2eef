use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use pot_reason::{CacheEntry, Outcome};
use pot_verify::Verdict;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::dataset::Record;
use crate::error::EvalError;
use crate::metrics::{Metrics, Tally};

pub const REPORT_FILE: &str = "evaluation_report.json";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Decided,
    Undecided,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordResult {
    pub id: String,
    pub question: String,
    pub status: RecordStatus,
    pub predicted: Option<bool>,
    pub actual: bool,
    pub correct: Option<bool>,
    pub answer: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<Value>,
    pub attempts: usize,
    /// Taken from the cache instead of being run.
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecordResult {
    pub fn from_outcome(record: &Record, outcome: Outcome) -> Self {
        match outcome {
            Outcome::Verified(v) => Self::verified(record, v.result.answer, v.program, v.attempts, false),
            Outcome::Failed(f) => Self::failed(record, f.last_error, f.attempts),
        }
    }

    pub fn from_cached(record: &Record, entry: &CacheEntry) -> Self {
        Self::verified(record, entry.result.answer, entry.program.clone(), entry.attempts, true)
    }

    pub fn crashed(record: &Record, message: String) -> Self {
        Self::failed(record, format!("worker panicked: {message}"), 0)
    }

    fn verified(record: &Record, answer: Verdict, program: Value, attempts: usize, skipped: bool) -> Self {
        let predicted = answer.as_bool();
        Self {
            id: record.id.clone(),
            question: record.question.clone(),
            status: if predicted.is_some() {
                RecordStatus::Decided
            } else {
                RecordStatus::Undecided
            },
            predicted,
            actual: record.answer,
            correct: predicted.map(|p| p == record.answer),
            answer: Some(answer),
            program: Some(program),
            attempts,
            skipped,
            error: None,
        }
    }

    fn failed(record: &Record, error: String, attempts: usize) -> Self {
        Self {
            id: record.id.clone(),
            question: record.question.clone(),
            status: RecordStatus::Failed,
            predicted: None,
            actual: record.answer,
            correct: None,
            answer: None,
            program: None,
            attempts,
            skipped: false,
            error: Some(error),
        }
    }

    pub fn tally(&self) -> Tally {
        match (self.status, self.predicted) {
            (RecordStatus::Decided, Some(predicted)) => Tally::Decided {
                predicted,
                actual: self.actual,
            },
            (RecordStatus::Failed, _) => Tally::Failed,
            _ => Tally::Undecided,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub metrics: Metrics,
    pub results: Vec<RecordResult>,
}

impl EvaluationReport {
    pub fn new(results: Vec<RecordResult>) -> Self {
        let metrics = Metrics::from_tallies(results.iter().map(RecordResult::tally));
        Self { metrics, results }
    }

    /// Write the report as pretty JSON into `dir`, replacing any previous one.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, EvalError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| EvalError::Io { path, source }
        };
        fs::create_dir_all(dir).map_err(io_err(dir))?;

        let path = dir.join(REPORT_FILE);
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err(dir))?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.flush().map_err(io_err(&path))?;
        tmp.persist(&path).map_err(|e| EvalError::Io {
            path: path.clone(),
            source: e.error,
        })?;
        Ok(path)
    }
}
