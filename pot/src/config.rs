#![forbid(unsafe_code)]

//! `pot.toml`: every field optional, command-line flags win.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::Diagnostic;
use pot_eval::{DatasetConfig, EvalConfig};
use pot_reason::{AuditConfig, GenerationParams, HttpGeneratorConfig, ReasonerConfig};
use pot_verify::{ExecConfig, GoalCombination};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "pot.toml";

#[derive(Debug, Error, Diagnostic)]
#[error("config error in {}: {message}", .path.display())]
#[diagnostic(code(pot::config))]
pub struct ConfigError {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PotConfig {
    pub generator: GeneratorSection,
    pub solver: SolverSection,
    pub reasoning: ReasoningSection,
    pub evaluation: EvaluationSection,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorSection {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub structured: bool,
}

impl Default for GeneratorSection {
    fn default() -> Self {
        let http = HttpGeneratorConfig::default();
        let params = GenerationParams::default();
        Self {
            base_url: http.base_url,
            model: params.model,
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            timeout_secs: http.timeout_secs,
            max_retries: http.max_retries,
            structured: params.structured,
        }
    }
}

impl GeneratorSection {
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            structured: self.structured,
        }
    }

    pub fn http(&self, api_key: Option<String>) -> HttpGeneratorConfig {
        HttpGeneratorConfig {
            base_url: self.base_url.clone(),
            api_key,
            timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
            ..HttpGeneratorConfig::default()
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SolverSection {
    pub timeout_ms: u64,
    pub combination: GoalCombination,
}

impl Default for SolverSection {
    fn default() -> Self {
        let exec = ExecConfig::default();
        Self {
            timeout_ms: u64::try_from(exec.timeout.as_millis()).unwrap_or(u64::MAX),
            combination: exec.combination,
        }
    }
}

impl SolverSection {
    pub fn exec(&self) -> ExecConfig {
        ExecConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            combination: self.combination,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ReasoningSection {
    pub max_attempts: usize,
    pub cache_dir: Option<PathBuf>,
    pub retry_on_undecided: bool,
    pub retry_generator_errors: bool,
    /// Have a second model review each program before it is solved.
    pub audit: bool,
    pub audit_threshold: f64,
}

impl Default for ReasoningSection {
    fn default() -> Self {
        let reasoner = ReasonerConfig::default();
        Self {
            max_attempts: reasoner.max_attempts,
            cache_dir: None,
            retry_on_undecided: reasoner.retry_on_undecided,
            retry_generator_errors: reasoner.retry_generator_errors,
            audit: false,
            audit_threshold: AuditConfig::default().threshold,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluationSection {
    pub workers: usize,
    pub question_field: String,
    pub answer_field: String,
    pub id_field: String,
    pub max_samples: Option<usize>,
    pub skip_existing: bool,
    pub output_dir: Option<PathBuf>,
}

impl Default for EvaluationSection {
    fn default() -> Self {
        let dataset = DatasetConfig::default();
        let eval = EvalConfig::default();
        Self {
            workers: eval.workers,
            question_field: dataset.question_field,
            answer_field: dataset.answer_field,
            id_field: dataset.id_field,
            max_samples: eval.max_samples,
            skip_existing: eval.skip_existing,
            output_dir: eval.output_dir,
        }
    }
}

impl EvaluationSection {
    pub fn dataset(&self) -> DatasetConfig {
        DatasetConfig {
            question_field: self.question_field.clone(),
            answer_field: self.answer_field.clone(),
            id_field: self.id_field.clone(),
        }
    }

    pub fn eval(&self) -> EvalConfig {
        EvalConfig {
            workers: self.workers,
            max_samples: self.max_samples,
            skip_existing: self.skip_existing,
            output_dir: self.output_dir.clone(),
        }
    }
}

impl PotConfig {
    pub fn reasoner(&self) -> ReasonerConfig {
        ReasonerConfig {
            max_attempts: self.reasoning.max_attempts,
            retry_on_undecided: self.reasoning.retry_on_undecided,
            retry_generator_errors: self.reasoning.retry_generator_errors,
            exec: self.solver.exec(),
        }
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Read `path`, or `pot.toml` in the working directory when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        if !required && !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path).map_err(|e| ConfigError {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Self::parse(&text, &path)
    }
}
