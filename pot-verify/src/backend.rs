#![allow(unused_assignments)]

use std::time::Duration;

use miette::Diagnostic;
use pot_compile::{CompiledObjective, SymbolTable, Term};
use thiserror::Error;

use crate::result::{OptimizationOutcome, VerificationResult, Witness};

#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
#[diagnostic(code(pot::solver))]
pub enum SolverError {
    #[error("solver unavailable: {message}")]
    Unavailable { message: String },
    /// The backend could not encode or run a query.
    #[error("solver failure: {message}")]
    Backend { message: String },
}

impl SolverError {
    pub fn backend(message: impl Into<String>) -> Self {
        SolverError::Backend {
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SatStatus {
    Sat,
    Unsat,
    /// Timeout or incomplete theory; carries the solver's reason when it gives one.
    Unknown(Option<String>),
}

/// One solver session. Created per execution by a [`SolverProvider`].
pub trait Backend {
    /// Declare every sort, function and constant of the program.
    fn declare(&mut self, symbols: &SymbolTable) -> Result<(), SolverError>;

    fn assert(&mut self, term: &Term) -> Result<(), SolverError>;

    fn push(&mut self);

    fn pop(&mut self);

    /// Check the current scope under the session timeout.
    fn check(&mut self) -> Result<SatStatus, SolverError>;

    /// Assignment for the declared constants after a `Sat` check.
    fn witness(&mut self) -> Option<Witness>;

    /// Run an optimizing search over `constraints` in a fresh scope.
    fn optimize(
        &mut self,
        constraints: &[&Term],
        objectives: &[CompiledObjective],
    ) -> Result<OptimizationOutcome, SolverError>;
}

pub type Session<'a> = dyn FnMut(&mut dyn Backend) -> Result<VerificationResult, SolverError> + 'a;

/// Hands out backend sessions. Shared across worker threads, so it must be `Sync`;
/// the session itself lives on the calling thread only.
pub trait SolverProvider: Send + Sync {
    /// Stable description used in cache keys, e.g. `z3`.
    fn describe(&self) -> String;

    fn with_backend(
        &self,
        timeout: Duration,
        session: &mut Session<'_>,
    ) -> Result<VerificationResult, SolverError>;
}

/// Fallback provider when compiled without `--features pot-verify/z3`.
///
/// This keeps the workspace buildable on machines without Z3.
pub struct NoZ3Backend;

impl SolverProvider for NoZ3Backend {
    fn describe(&self) -> String {
        "none".to_string()
    }

    fn with_backend(
        &self,
        _timeout: Duration,
        _session: &mut Session<'_>,
    ) -> Result<VerificationResult, SolverError> {
        Err(SolverError::Unavailable {
            message: "Z3 backend is not enabled. Rebuild with `--features pot-verify/z3`."
                .to_string(),
        })
    }
}
