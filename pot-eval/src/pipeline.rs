use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use pot_reason::{Question, Reasoner};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tracing::{Span, debug, info, warn};

use crate::dataset::Record;
use crate::error::EvalError;
use crate::report::{EvaluationReport, RecordResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvalConfig {
    pub workers: usize,
    pub max_samples: Option<usize>,
    /// Take answers already in the cache instead of dispatching the record.
    pub skip_existing: bool,
    /// Where the report is written, if anywhere.
    pub output_dir: Option<PathBuf>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_samples: None,
            skip_existing: false,
            output_dir: None,
        }
    }
}

/// Runs a labelled dataset through a [`Reasoner`] on a bounded worker pool.
pub struct EvaluationPipeline {
    reasoner: Arc<Reasoner>,
    config: EvalConfig,
    span: Span,
}

impl EvaluationPipeline {
    pub fn new(reasoner: Arc<Reasoner>, config: EvalConfig) -> Self {
        Self {
            reasoner,
            config,
            span: Span::none(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn evaluate(&self, records: &[Record]) -> Result<EvaluationReport, EvalError> {
        let take = self
            .config
            .max_samples
            .map_or(records.len(), |cap| cap.min(records.len()));
        let records = &records[..take];
        let workers = self.config.workers.max(1);

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("pot-eval-{i}"))
            .build()
            .map_err(|e| EvalError::Pool { message: e.to_string() })?;

        info!(parent: &self.span, records = records.len(), workers, "evaluation started");
        let results: Vec<RecordResult> =
            pool.install(|| records.par_iter().map(|r| self.evaluate_record(r)).collect());

        let report = EvaluationReport::new(results);
        let m = &report.metrics;
        info!(
            parent: &self.span,
            total = m.total_samples,
            correct = m.correct,
            wrong = m.wrong,
            failed = m.failed,
            accuracy = m.accuracy,
            "evaluation finished"
        );

        if let Some(dir) = &self.config.output_dir {
            let path = report.write_to(dir)?;
            info!(parent: &self.span, path = %path.display(), "report written");
        }
        Ok(report)
    }

    fn evaluate_record(&self, record: &Record) -> RecordResult {
        if self.config.skip_existing {
            if let Some(entry) = self.reasoner.cached(&record.id) {
                debug!(parent: &self.span, id = %record.id, "skipping record with cached answer");
                return RecordResult::from_cached(record, &entry);
            }
        }

        let question = Question::new(record.id.clone(), record.question.clone());
        match panic::catch_unwind(AssertUnwindSafe(|| self.reasoner.reason(&question))) {
            Ok(outcome) => RecordResult::from_outcome(record, outcome),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(parent: &self.span, id = %record.id, panic = %message, "worker panicked");
                RecordResult::crashed(record, message)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
