#![forbid(unsafe_code)]

//! Batch evaluation of a reasoner against a labelled dataset.

mod dataset;
mod error;
mod metrics;
mod pipeline;
mod report;

pub use dataset::{load_dataset, parse_dataset, DatasetConfig, Record};
pub use error::EvalError;
pub use metrics::{ConfusionMatrix, Metrics, Tally};
pub use pipeline::{EvalConfig, EvaluationPipeline};
pub use report::{EvaluationReport, RecordResult, RecordStatus, REPORT_FILE};
