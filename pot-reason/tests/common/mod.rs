#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use pot_compile::{CompiledObjective, SymbolTable, Term};
use pot_reason::{GenerationParams, Generator, GeneratorError, Message, Reply};
use pot_verify::{
    Backend, OptimizationOutcome, OptimizationStatus, SatStatus, Session, SolverError,
    SolverProvider, VerificationResult, Witness,
};

pub const VALID: &str = r#"{
    "variables": [{"name": "x", "sort": "Int"}],
    "knowledge_base": ["x = 4"],
    "verifications": [{"name": "x_big", "constraint": "x > 3"}]
}"#;

/// Unknown top-level key: always rejected by the validator.
pub const INVALID: &str = r#"{"facts": ["x = 4"]}"#;

/// Replays canned replies, repeating the last one once the script runs out.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<Reply, GeneratorError>>>,
    last: Mutex<Option<Result<Reply, GeneratorError>>>,
    pub calls: AtomicUsize,
    pub histories: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Result<Reply, GeneratorError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            histories: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(Reply::Text(t.to_string()))).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, messages: &[Message], _params: &GenerationParams) -> Result<Reply, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.histories.lock().unwrap().push(messages.to_vec());
        let next = self.replies.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = next {
            *last = Some(reply);
        }
        last.clone().expect("scripted generator has no replies")
    }
}

/// A backend that answers every check with the same status.
pub struct FixedBackend {
    status: SatStatus,
}

impl Backend for FixedBackend {
    fn declare(&mut self, _symbols: &SymbolTable) -> Result<(), SolverError> {
        Ok(())
    }

    fn assert(&mut self, _term: &Term) -> Result<(), SolverError> {
        Ok(())
    }

    fn push(&mut self) {}

    fn pop(&mut self) {}

    fn check(&mut self) -> Result<SatStatus, SolverError> {
        Ok(self.status.clone())
    }

    fn witness(&mut self) -> Option<Witness> {
        None
    }

    fn optimize(
        &mut self,
        _constraints: &[&Term],
        _objectives: &[CompiledObjective],
    ) -> Result<OptimizationOutcome, SolverError> {
        Ok(OptimizationOutcome {
            status: OptimizationStatus::Unknown,
            objectives: Vec::new(),
            witness: None,
            reason: None,
        })
    }
}

/// Counts sessions; each session either fails with a scripted error or runs
/// against a [`FixedBackend`] with the next scripted status.
pub struct CountingProvider {
    failures: Mutex<VecDeque<Option<SolverError>>>,
    statuses: Mutex<VecDeque<SatStatus>>,
    default_status: SatStatus,
    pub sessions: AtomicUsize,
}

impl CountingProvider {
    pub fn answering(status: SatStatus) -> Self {
        Self {
            failures: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            default_status: status,
            sessions: AtomicUsize::new(0),
        }
    }

    pub fn failing_first(mut self, failures: Vec<Option<SolverError>>) -> Self {
        self.failures = Mutex::new(failures.into());
        self
    }

    pub fn statuses(mut self, statuses: Vec<SatStatus>) -> Self {
        self.statuses = Mutex::new(statuses.into());
        self
    }

    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

impl SolverProvider for CountingProvider {
    fn describe(&self) -> String {
        "counting".to_string()
    }

    fn with_backend(
        &self,
        _timeout: Duration,
        session: &mut Session<'_>,
    ) -> Result<VerificationResult, SolverError> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        if let Some(Some(err)) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let status = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_status.clone());
        let mut backend = FixedBackend { status };
        session(&mut backend)
    }
}
