#![forbid(unsafe_code)]

mod backend;
mod executor;
mod result;

#[cfg(feature = "z3")]
mod z3_backend;

pub use backend::{Backend, NoZ3Backend, SatStatus, Session, SolverError, SolverProvider};
pub use executor::{ExecConfig, Executor};
pub use result::{
    GoalCombination, GoalOutcome, GoalStatus, ObjectiveValue, OptimizationOutcome,
    OptimizationStatus, Verdict, VerificationResult, Witness,
};

#[cfg(feature = "z3")]
pub use z3_backend::{Z3Backend, Z3Provider};

/// The best provider this build supports.
pub fn default_provider() -> Box<dyn SolverProvider> {
    #[cfg(feature = "z3")]
    {
        Box::new(Z3Provider)
    }
    #[cfg(not(feature = "z3"))]
    {
        Box::new(NoZ3Backend)
    }
}
