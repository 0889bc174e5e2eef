#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// A document that does not fit the program schema.
///
/// `path` points at the offending field in JSON-path style, e.g.
/// `rules[2].implies.antecedent`. The empty path means the document root.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
#[error("schema error at {}: {message}", display_path(.path))]
#[diagnostic(code(pot::schema))]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "<root>" } else { path }
}
