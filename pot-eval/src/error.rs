#![allow(unused_assignments)]

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[diagnostic(code(pot::eval))]
pub enum EvalError {
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dataset is not valid JSON (line {line}): {message}")]
    Parse { line: usize, message: String },
    #[error("record {index} has no usable `{field}` field")]
    MissingField { index: usize, field: String },
    #[error("record {index} has label {value}, expected a boolean or yes/no/true/false")]
    BadLabel { index: usize, value: String },
    #[error("could not start worker pool: {message}")]
    Pool { message: String },
    #[error("report could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}
