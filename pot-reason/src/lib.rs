#![forbid(unsafe_code)]

//! Turning questions into verified answers.
//!
//! A [`Reasoner`] asks a [`Generator`] for a program document, runs it through
//! the schema validator and compiler, optionally has a [`ProgramAuditor`]
//! review it, and executes it. Every recoverable failure is fed back to the
//! generator until the attempt ceiling is reached. Verified answers are kept
//! in a write-once [`ProgramCache`].

mod audit;
mod cache;
mod error;
mod extract;
mod generator;
mod http;
mod reasoner;

pub use audit::{AuditConfig, AuditFailure, AuditVerdict, ProgramAuditor};
pub use cache::{CacheEntry, ProgramCache};
pub use error::{CacheError, GeneratorError};
pub use extract::extract_json;
pub use generator::{
    build_prompt, feedback_message, GenerationParams, GenerationResult, Generator, Message,
    ProgramGenerator, Reply, Role, SYSTEM_PROMPT,
};
pub use http::{HttpGenerator, HttpGeneratorConfig};
pub use reasoner::{
    AttemptError, Failed, Outcome, Question, Reasoner, ReasonerConfig, Stage, Verified,
};
