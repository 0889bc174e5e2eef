use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GeneratorError;
use crate::extract::extract_json;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask for a JSON object reply instead of free text.
    pub structured: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.1,
            max_tokens: 16_384,
            structured: true,
        }
    }
}

/// What a generator hands back for one request.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// The endpoint honoured the structured request; `raw` is the text it sent.
    Structured { value: Value, raw: String },
    Text(String),
}

impl Reply {
    pub fn raw(&self) -> &str {
        match self {
            Reply::Structured { raw, .. } => raw,
            Reply::Text(text) => text,
        }
    }
}

/// A language model endpoint.
///
/// Implementations own their transport retries; an `Err` means the retry
/// budget is already spent.
pub trait Generator: Send + Sync {
    fn generate(&self, messages: &[Message], params: &GenerationParams) -> Result<Reply, GeneratorError>;
}

/// Outcome of asking for one program document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub program: Option<Value>,
    pub raw_response: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerationResult {
    fn from_reply(reply: Reply) -> Self {
        let (value, raw) = match reply {
            Reply::Structured { value, raw } => (Some(value), raw),
            Reply::Text(text) => (extract_json(&text), text),
        };
        match value {
            Some(doc @ Value::Object(_)) => Self {
                program: Some(doc),
                raw_response: raw,
                success: true,
                error: None,
            },
            _ => Self {
                program: None,
                raw_response: raw,
                success: false,
                error: Some("Failed to extract valid JSON from response".to_string()),
            },
        }
    }
}

pub const SYSTEM_PROMPT: &str = "You are an assistant that produces Z3 DSL programs. \
Always respond with JSON that matches the provided schema.";

const PROGRAM_SHAPE: &str = r#"Translate the question into a logic program and reply with a single JSON object with these keys:
- "sorts": [{"name", "type": "DeclareSort" | "EnumSort" | "IntSort" | "RealSort" | "BoolSort", "values"? (EnumSort only)}]
- "functions": [{"name", "domain": [sort names], "range": sort name}]
- "constants": {group name: {"sort", "members": [names] or {reference: solver name}}}
- "variables": [{"name", "sort"}]
- "knowledge_base": [expression string, or {"assertion", "value": bool}]
- "rules": [{"forall"?: [{"name", "sort"}], "implies": {"antecedent", "consequent"} or "constraint"}]
- "verifications": [{"name", "exists"? or "forall"?, "implies" or "constraint"}]
- "optimization"? {"variables", "constraints", "objectives": [{"type": "maximize" | "minimize", "expression"}]}
- "actions": ["verify_conditions"] and/or ["optimize"]
Expressions use infix syntax: + - * /, = != < <= > >=, and or not implies iff,
function application f(x, y), and quantifiers such as forall (p: Person): f(p) > 0.
A verification holds when the knowledge base and rules entail it.
No keys other than the ones listed are allowed."#;

pub fn build_prompt(question: &str) -> String {
    format!("{PROGRAM_SHAPE}\n\nQuestion: {question}")
}

pub fn feedback_message(error: &str) -> String {
    format!("There was an error processing your response:\n{error}\nPlease fix the JSON accordingly.")
}

/// Wraps a [`Generator`] with the program prompt and the feedback protocol.
#[derive(Clone)]
pub struct ProgramGenerator {
    generator: Arc<dyn Generator>,
    params: GenerationParams,
}

impl ProgramGenerator {
    pub fn new(generator: Arc<dyn Generator>, params: GenerationParams) -> Self {
        Self { generator, params }
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    pub fn generate(&self, question: &str) -> Result<GenerationResult, GeneratorError> {
        let messages = [Message::system(SYSTEM_PROMPT), Message::user(build_prompt(question))];
        self.run(&messages)
    }

    /// Re-ask with the previous reply and what was wrong with it in the history.
    pub fn generate_with_feedback(
        &self,
        question: &str,
        error: &str,
        previous: &str,
    ) -> Result<GenerationResult, GeneratorError> {
        let messages = [
            Message::system(SYSTEM_PROMPT),
            Message::user(build_prompt(question)),
            Message::assistant(previous),
            Message::user(feedback_message(error)),
        ];
        self.run(&messages)
    }

    fn run(&self, messages: &[Message]) -> Result<GenerationResult, GeneratorError> {
        let reply = self.generator.generate(messages, &self.params)?;
        Ok(GenerationResult::from_reply(reply))
    }
}
