#![allow(unused_assignments)]

use std::sync::Arc;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{Span, debug};

use crate::error::GeneratorError;
use crate::extract::extract_json;
use crate::generator::{GenerationParams, Generator, Message, Reply};

const AUDIT_PROMPT: &str = "You review logic programs that were generated to answer a question. \
Judge whether the program faithfully encodes the question without inventing facts, \
dropping conditions, or asserting the answer directly. Reply with a JSON object \
{\"risk_score\": number between 0 and 1, \"is_safe\": bool, \"justification\": string}.";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditVerdict {
    pub risk_score: f64,
    pub is_safe: bool,
    #[serde(default)]
    pub justification: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AuditConfig {
    /// Programs scoring at or above this are rejected.
    pub threshold: f64,
    pub params: GenerationParams,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            params: GenerationParams::default(),
        }
    }
}

#[derive(Debug, Error, Diagnostic, Clone, PartialEq)]
#[diagnostic(code(pot::audit))]
pub enum AuditFailure {
    #[error("the program was rejected by review (risk {:.2}): {}", .0.risk_score, .0.justification)]
    Rejected(AuditVerdict),
    /// The reviewer reply was missing or malformed.
    #[error("program review failed: {0}")]
    Unreadable(String),
    #[error("program review failed: {0}")]
    Generator(GeneratorError),
}

/// Second-model review of a compiled program before it reaches the solver.
pub struct ProgramAuditor {
    generator: Arc<dyn Generator>,
    config: AuditConfig,
    span: Span,
}

impl ProgramAuditor {
    pub fn new(generator: Arc<dyn Generator>, config: AuditConfig) -> Self {
        Self {
            generator,
            config,
            span: Span::none(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn audit(&self, question: &str, program: &Value) -> Result<AuditVerdict, AuditFailure> {
        let messages = [
            Message::system(AUDIT_PROMPT),
            Message::user(format!("Question: {question}\n\nProgram:\n{program:#}")),
        ];
        let reply = self
            .generator
            .generate(&messages, &self.config.params)
            .map_err(AuditFailure::Generator)?;
        let value = match reply {
            Reply::Structured { value, .. } => Some(value),
            Reply::Text(text) => extract_json(&text),
        }
        .ok_or_else(|| AuditFailure::Unreadable("reply contained no JSON".to_string()))?;
        let verdict: AuditVerdict =
            serde_json::from_value(value).map_err(|e| AuditFailure::Unreadable(e.to_string()))?;

        debug!(
            parent: &self.span,
            risk = verdict.risk_score,
            safe = verdict.is_safe,
            "program reviewed"
        );
        if !verdict.is_safe || verdict.risk_score >= self.config.threshold {
            return Err(AuditFailure::Rejected(verdict));
        }
        Ok(verdict)
    }
}
