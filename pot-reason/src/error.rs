#![allow(unused_assignments)]

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Failure of a generator call after its own transport retries.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
#[diagnostic(code(pot::generator))]
pub enum GeneratorError {
    /// Could not reach the endpoint (connect, DNS, timeout).
    #[error("generator transport error: {message}")]
    Transport { message: String },
    #[error("generator returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("generator reply could not be decoded: {message}")]
    Decode { message: String },
    #[error("generator gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl GeneratorError {
    /// Whether the caller may try again with a different request shape.
    pub fn is_client_error(&self) -> bool {
        matches!(self, GeneratorError::Http { status, .. } if (400..500).contains(status) && *status != 429)
    }
}

#[derive(Debug, Error, Diagnostic)]
#[diagnostic(code(pot::cache))]
pub enum CacheError {
    #[error("cache I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache entry could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}
