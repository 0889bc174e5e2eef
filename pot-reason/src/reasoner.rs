//! The generate / validate / compile / execute loop for one question.

use std::sync::Arc;

use pot_compile::CompiledProgram;
use pot_verify::{ExecConfig, Executor, SolverError, SolverProvider, Verdict, VerificationResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{Span, debug, info, warn};

use crate::audit::ProgramAuditor;
use crate::cache::{CacheEntry, ProgramCache};
use crate::generator::{GenerationResult, ProgramGenerator};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReasonerConfig {
    /// Generator calls allowed per question, feedback retries included.
    pub max_attempts: usize,
    /// Ask again when the solver answers UNKNOWN.
    pub retry_on_undecided: bool,
    /// Spend an attempt on a generator call that failed after its own
    /// transport retries, instead of giving up on the question.
    pub retry_generator_errors: bool,
    pub exec: ExecConfig,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_on_undecided: false,
            retry_generator_errors: false,
            exec: ExecConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
}

impl Question {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Where in the loop an attempt went wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// The generator call failed, or its reply held no JSON object. A failed
    /// call ends the question unless `retry_generator_errors` is set; a reply
    /// without JSON is always fed back.
    Generation,
    Validation,
    Compilation,
    Review,
    Execution,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptError {
    pub attempt: usize,
    pub stage: Stage,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verified {
    pub result: VerificationResult,
    /// The accepted program, normalised to document form.
    pub program: Value,
    pub generation: GenerationResult,
    pub attempts: usize,
    pub from_cache: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failed {
    pub last_error: String,
    pub last_response: Option<String>,
    pub attempts: usize,
    pub errors: Vec<AttemptError>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Verified(Verified),
    Failed(Failed),
}

impl Outcome {
    /// The decided boolean answer, if there is one.
    pub fn answer(&self) -> Option<bool> {
        match self {
            Outcome::Verified(v) => v.result.answer_bool(),
            Outcome::Failed(_) => None,
        }
    }

    pub fn verified(&self) -> Option<&Verified> {
        match self {
            Outcome::Verified(v) => Some(v),
            Outcome::Failed(_) => None,
        }
    }

    pub fn failed(&self) -> Option<&Failed> {
        match self {
            Outcome::Failed(f) => Some(f),
            Outcome::Verified(_) => None,
        }
    }
}

enum State {
    Init,
    Generated(GenerationResult),
    Compiled {
        generation: GenerationResult,
        document: Value,
        program: CompiledProgram,
    },
    Verified(Verified),
    Failed(Failed),
}

/// Bookkeeping carried across the attempts of one question.
struct Progress {
    attempts: usize,
    errors: Vec<AttemptError>,
    /// Error text and raw reply handed to the next generator call.
    feedback: Option<(String, String)>,
    last_response: Option<String>,
    /// An UNKNOWN answer kept while retrying for a decided one.
    undecided: Option<Verified>,
}

impl Progress {
    fn new() -> Self {
        Self {
            attempts: 0,
            errors: Vec::new(),
            feedback: None,
            last_response: None,
            undecided: None,
        }
    }

    fn record(&mut self, stage: Stage, message: String) {
        self.errors.push(AttemptError {
            attempt: self.attempts,
            stage,
            message,
        });
    }

    fn take_failed(&mut self) -> Failed {
        let last_error = self
            .errors
            .last()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "no attempt was made".to_string());
        Failed {
            last_error,
            last_response: self.last_response.take(),
            attempts: self.attempts,
            errors: std::mem::take(&mut self.errors),
        }
    }
}

/// Answers questions by generating, checking and solving programs.
pub struct Reasoner {
    generator: ProgramGenerator,
    solver: Arc<dyn SolverProvider>,
    executor: Executor,
    cache: Option<Arc<ProgramCache>>,
    auditor: Option<ProgramAuditor>,
    config: ReasonerConfig,
    span: Span,
}

impl Reasoner {
    pub fn new(generator: ProgramGenerator, solver: Arc<dyn SolverProvider>, config: ReasonerConfig) -> Self {
        Self {
            generator,
            solver,
            executor: Executor::new(config.exec.clone()),
            cache: None,
            auditor: None,
            config,
            span: Span::none(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<ProgramCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_auditor(mut self, auditor: ProgramAuditor) -> Self {
        self.auditor = Some(auditor);
        self
    }

    /// Events from this reasoner and its executor are recorded under `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.executor = Executor::new(self.config.exec.clone()).with_span(span.clone());
        self.span = span;
        self
    }

    pub fn config(&self) -> &ReasonerConfig {
        &self.config
    }

    /// Everything besides the question that decides what answer gets cached.
    pub fn backend_fingerprint(&self) -> String {
        format!(
            "{}|model={}|timeout={}ms|{}",
            self.solver.describe(),
            self.generator.params().model,
            self.config.exec.timeout.as_millis(),
            self.config.exec.combination.name()
        )
    }

    pub fn cache_key(&self, question_id: &str) -> String {
        ProgramCache::key(question_id, &self.backend_fingerprint())
    }

    pub fn cached(&self, question_id: &str) -> Option<Arc<CacheEntry>> {
        self.cache.as_ref()?.get(&self.cache_key(question_id))
    }

    pub fn reason(&self, question: &Question) -> Outcome {
        let key = self.cache_key(&question.id);
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            info!(parent: &self.span, question = %question.id, answer = %hit.result.answer, "cache hit");
            return Outcome::Verified(Verified {
                result: hit.result.clone(),
                program: hit.program.clone(),
                generation: hit.generation.clone(),
                attempts: hit.attempts,
                from_cache: true,
            });
        }

        let outcome = self.run(question);

        match (&outcome, &self.cache) {
            (Outcome::Verified(v), Some(cache)) => {
                let entry = CacheEntry {
                    key,
                    question_id: question.id.clone(),
                    program: v.program.clone(),
                    generation: v.generation.clone(),
                    result: v.result.clone(),
                    attempts: v.attempts,
                };
                if let Err(e) = cache.put(entry) {
                    warn!(parent: &self.span, question = %question.id, error = %e, "could not cache answer");
                }
            }
            (Outcome::Failed(f), _) => {
                warn!(
                    parent: &self.span,
                    question = %question.id,
                    attempts = f.attempts,
                    error = %f.last_error,
                    "giving up"
                );
            }
            _ => {}
        }
        outcome
    }

    fn run(&self, question: &Question) -> Outcome {
        let ceiling = self.config.max_attempts.max(1);
        let mut progress = Progress::new();
        let mut state = State::Init;

        loop {
            state = match state {
                State::Init if progress.attempts >= ceiling => match progress.undecided.take() {
                    Some(v) => State::Verified(v),
                    None => State::Failed(progress.take_failed()),
                },
                State::Init => self.generate(question, &mut progress),
                State::Generated(generation) => self.accept(generation, &mut progress),
                State::Compiled {
                    generation,
                    document,
                    program,
                } => self.execute(question, generation, document, &program, &mut progress),
                State::Verified(v) => {
                    info!(
                        parent: &self.span,
                        question = %question.id,
                        answer = %v.result.answer,
                        attempts = v.attempts,
                        "verified"
                    );
                    return Outcome::Verified(v);
                }
                State::Failed(f) => return Outcome::Failed(f),
            };
        }
    }

    fn generate(&self, question: &Question, progress: &mut Progress) -> State {
        progress.attempts += 1;
        debug!(parent: &self.span, question = %question.id, attempt = progress.attempts, "generating program");

        let generated = match &progress.feedback {
            None => self.generator.generate(&question.text),
            Some((error, previous)) => self.generator.generate_with_feedback(&question.text, error, previous),
        };

        match generated {
            // Nothing about the program is known, so pending feedback is kept as is.
            Err(e) if self.config.retry_generator_errors => {
                warn!(
                    parent: &self.span,
                    attempt = progress.attempts,
                    error = %e,
                    "generator call failed"
                );
                progress.record(Stage::Generation, e.to_string());
                State::Init
            }
            Err(e) => {
                progress.record(Stage::Generation, e.to_string());
                State::Failed(progress.take_failed())
            }
            Ok(generation) => {
                progress.last_response = Some(generation.raw_response.clone());
                if generation.success {
                    State::Generated(generation)
                } else {
                    let message = generation
                        .error
                        .clone()
                        .unwrap_or_else(|| "Failed to extract valid JSON from response".to_string());
                    self.setback(progress, Stage::Generation, message, generation.raw_response)
                }
            }
        }
    }

    fn accept(&self, generation: GenerationResult, progress: &mut Progress) -> State {
        let Some(doc) = generation.program.as_ref() else {
            return self.setback(
                progress,
                Stage::Generation,
                "Failed to extract valid JSON from response".to_string(),
                generation.raw_response,
            );
        };

        let program = match pot_schema::validate(doc) {
            Ok(p) => p,
            Err(e) => return self.setback(progress, Stage::Validation, e.to_string(), generation.raw_response),
        };
        let compiled = match pot_compile::compile(&program) {
            Ok(c) => c,
            Err(e) => return self.setback(progress, Stage::Compilation, e.to_string(), generation.raw_response),
        };

        let document = serde_json::to_value(&program).unwrap_or_else(|_| doc.clone());
        State::Compiled {
            generation,
            document,
            program: compiled,
        }
    }

    fn execute(
        &self,
        question: &Question,
        generation: GenerationResult,
        document: Value,
        program: &CompiledProgram,
        progress: &mut Progress,
    ) -> State {
        if let Some(auditor) = &self.auditor {
            if let Err(e) = auditor.audit(&question.text, &document) {
                return self.setback(progress, Stage::Review, e.to_string(), generation.raw_response);
            }
        }

        let result = match self.executor.execute(program, self.solver.as_ref()) {
            Ok(r) => r,
            // No program change can bring a missing solver back.
            Err(e @ SolverError::Unavailable { .. }) => {
                progress.record(Stage::Execution, e.to_string());
                return State::Failed(progress.take_failed());
            }
            Err(e) => return self.setback(progress, Stage::Execution, e.to_string(), generation.raw_response),
        };

        let raw = generation.raw_response.clone();
        let verified = Verified {
            result,
            program: document,
            generation,
            attempts: progress.attempts,
            from_cache: false,
        };

        if verified.result.answer == Verdict::Unknown && self.config.retry_on_undecided {
            let reasons: Vec<String> = verified
                .result
                .goals
                .iter()
                .filter_map(|g| g.reason.as_ref().map(|r| format!("{}: {r}", g.name)))
                .collect();
            let mut message =
                "the solver could not decide the verifications (UNKNOWN); make the verifications decidable"
                    .to_string();
            if !reasons.is_empty() {
                message.push_str(&format!(" ({})", reasons.join("; ")));
            }
            progress.undecided = Some(verified);
            return self.setback(progress, Stage::Execution, message, raw);
        }

        State::Verified(verified)
    }

    /// Record a recoverable failure and queue its feedback for the next attempt.
    fn setback(&self, progress: &mut Progress, stage: Stage, message: String, raw: String) -> State {
        warn!(
            parent: &self.span,
            attempt = progress.attempts,
            stage = ?stage,
            error = %message,
            "attempt rejected"
        );
        progress.record(stage, message.clone());
        progress.feedback = Some((message, raw));
        State::Init
    }
}
