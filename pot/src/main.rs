#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use pot_eval::{EvaluationPipeline, load_dataset};
use pot_reason::{
    AuditConfig, HttpGenerator, Outcome, ProgramAuditor, ProgramCache, ProgramGenerator, Question,
    Reasoner,
};
use pot_verify::{Executor, GoalCombination, SolverProvider};
use serde_json::Value;
use tracing::{info_span, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod output;

use config::PotConfig;

#[derive(Parser, Debug)]
#[command(name = "pot", version, about = "Answer questions by generating and solving logic programs")]
struct Cli {
    /// Config file. Defaults to `pot.toml` in the working directory, if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Args, Debug, Default)]
struct SolverArgs {
    /// Per-check solver timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// How goal verdicts combine: conjunction, first_deciding or disjunction.
    #[arg(long)]
    combination: Option<GoalCombination>,
}

impl SolverArgs {
    fn apply(&self, cfg: &mut PotConfig) {
        if let Some(t) = self.timeout_ms {
            cfg.solver.timeout_ms = t;
        }
        if let Some(c) = self.combination {
            cfg.solver.combination = c;
        }
    }
}

#[derive(Args, Debug, Default)]
struct ReasonArgs {
    /// Model identifier sent to the generator.
    #[arg(long)]
    model: Option<String>,

    /// Generator base URL (OpenAI-compatible).
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    max_attempts: Option<usize>,

    /// Directory for cached verified answers.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Review each program with a second generator call before solving it.
    #[arg(long)]
    audit: bool,

    /// Retry when the solver cannot decide the answer.
    #[arg(long)]
    retry_undecided: bool,

    #[command(flatten)]
    solver: SolverArgs,
}

impl ReasonArgs {
    fn apply(&self, cfg: &mut PotConfig) {
        if let Some(m) = &self.model {
            cfg.generator.model = m.clone();
        }
        if let Some(url) = &self.base_url {
            cfg.generator.base_url = url.clone();
        }
        if let Some(n) = self.max_attempts {
            cfg.reasoning.max_attempts = n;
        }
        if let Some(dir) = &self.cache_dir {
            cfg.reasoning.cache_dir = Some(dir.clone());
        }
        cfg.reasoning.audit |= self.audit;
        cfg.reasoning.retry_on_undecided |= self.retry_undecided;
        self.solver.apply(cfg);
    }
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Validate, compile and execute a program document
    Verify {
        /// Program document (JSON)
        path: PathBuf,

        #[command(flatten)]
        solver: SolverArgs,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a program for a question and verify it
    Ask {
        question: String,

        /// Question identifier used for caching. Defaults to the question text.
        #[arg(long)]
        id: Option<String>,

        #[command(flatten)]
        reason: ReasonArgs,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a labelled dataset and report metrics
    Eval {
        /// JSON array or JSON-lines dataset
        dataset: PathBuf,

        #[arg(long)]
        workers: Option<usize>,

        #[arg(long)]
        max_samples: Option<usize>,

        /// Reuse cached answers without re-running their records
        #[arg(long)]
        skip_existing: bool,

        /// Directory the evaluation report is written to
        #[arg(long)]
        output_dir: Option<PathBuf>,

        #[arg(long)]
        question_field: Option<String>,

        #[arg(long)]
        answer_field: Option<String>,

        #[arg(long)]
        id_field: Option<String>,

        #[command(flatten)]
        reason: ReasonArgs,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();
}

fn build_reasoner(cfg: &PotConfig) -> miette::Result<Reasoner> {
    let api_key = std::env::var(&cfg.generator.api_key_env).ok();
    if api_key.is_none() {
        warn!(var = %cfg.generator.api_key_env, "API key variable is not set; sending unauthenticated requests");
    }
    let http = Arc::new(HttpGenerator::new(cfg.generator.http(api_key))?);
    let solver: Arc<dyn SolverProvider> = Arc::from(pot_verify::default_provider());

    let mut reasoner = Reasoner::new(
        ProgramGenerator::new(http.clone(), cfg.generator.params()),
        solver,
        cfg.reasoner(),
    )
    .with_span(info_span!("reasoner"));

    if let Some(dir) = &cfg.reasoning.cache_dir {
        let cache = ProgramCache::with_dir(dir)?.with_span(info_span!("cache"));
        reasoner = reasoner.with_cache(Arc::new(cache));
    }
    if cfg.reasoning.audit {
        let audit = AuditConfig {
            threshold: cfg.reasoning.audit_threshold,
            params: cfg.generator.params(),
        };
        reasoner = reasoner.with_auditor(ProgramAuditor::new(http, audit).with_span(info_span!("audit")));
    }
    Ok(reasoner)
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let mut cfg = PotConfig::load(cli.config.as_deref())?;

    match cli.cmd {
        Cmd::Verify { path, solver, json } => {
            solver.apply(&mut cfg);
            let text = fs::read_to_string(&path).into_diagnostic()?;
            let doc: Value = serde_json::from_str(&text).into_diagnostic()?;
            let program = pot_schema::validate(&doc)?;
            let compiled = pot_compile::compile(&program)?;

            let provider = pot_verify::default_provider();
            let result = Executor::new(cfg.solver.exec())
                .with_span(info_span!("verify", path = %path.display()))
                .execute(&compiled, provider.as_ref())?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
            } else {
                output::print_result(&result);
            }
            Ok(())
        }
        Cmd::Ask {
            question,
            id,
            reason,
            json,
        } => {
            reason.apply(&mut cfg);
            let reasoner = build_reasoner(&cfg)?;
            let id = id.unwrap_or_else(|| question.clone());
            let outcome = reasoner.reason(&Question::new(id, question));

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome).into_diagnostic()?);
            } else {
                output::print_outcome(&outcome);
            }
            match outcome {
                Outcome::Verified(_) => Ok(()),
                Outcome::Failed(f) => Err(miette::miette!(
                    code = "pot::reason",
                    "no verified answer after {} attempts: {}",
                    f.attempts,
                    f.last_error
                )),
            }
        }
        Cmd::Eval {
            dataset,
            workers,
            max_samples,
            skip_existing,
            output_dir,
            question_field,
            answer_field,
            id_field,
            reason,
        } => {
            reason.apply(&mut cfg);
            let ev = &mut cfg.evaluation;
            if let Some(w) = workers {
                ev.workers = w;
            }
            if max_samples.is_some() {
                ev.max_samples = max_samples;
            }
            ev.skip_existing |= skip_existing;
            if output_dir.is_some() {
                ev.output_dir = output_dir;
            }
            if let Some(f) = question_field {
                ev.question_field = f;
            }
            if let Some(f) = answer_field {
                ev.answer_field = f;
            }
            if let Some(f) = id_field {
                ev.id_field = f;
            }

            let records = load_dataset(&dataset, &cfg.evaluation.dataset())?;
            let reasoner = Arc::new(build_reasoner(&cfg)?);
            let report = EvaluationPipeline::new(reasoner, cfg.evaluation.eval())
                .with_span(info_span!("eval", dataset = %dataset.display()))
                .evaluate(&records)?;
            output::print_metrics(&report.metrics);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ask_flags_override_config() {
        let cli = Cli::try_parse_from([
            "pot",
            "ask",
            "Is the sky blue?",
            "--model",
            "gpt-4o-mini",
            "--max-attempts",
            "5",
            "--combination",
            "disjunction",
            "--audit",
        ])
        .unwrap();
        let Cmd::Ask { reason, question, id, .. } = cli.cmd else {
            panic!("expected ask");
        };
        assert_eq!(question, "Is the sky blue?");
        assert!(id.is_none());

        let mut cfg = PotConfig::default();
        reason.apply(&mut cfg);
        assert_eq!(cfg.generator.model, "gpt-4o-mini");
        assert_eq!(cfg.reasoning.max_attempts, 5);
        assert_eq!(cfg.solver.combination, GoalCombination::Disjunction);
        assert!(cfg.reasoning.audit);
        assert!(!cfg.reasoning.retry_on_undecided);
    }

    #[test]
    fn absent_flags_keep_config_values() {
        let mut cfg = PotConfig::default();
        cfg.solver.timeout_ms = 1234;
        cfg.reasoning.audit = true;
        ReasonArgs::default().apply(&mut cfg);
        assert_eq!(cfg.solver.timeout_ms, 1234);
        assert!(cfg.reasoning.audit);
    }

    #[test]
    fn bad_combination_is_rejected() {
        let err = Cli::try_parse_from(["pot", "verify", "p.json", "--combination", "majority"]).unwrap_err();
        assert!(err.to_string().contains("unknown goal combination"));
    }

    #[test]
    fn global_flags_parse_after_the_subcommand() {
        let cli = Cli::try_parse_from(["pot", "eval", "data.json", "--workers", "8", "-v", "--config", "x.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.cmd, Cmd::Eval { workers: Some(8), .. }));
    }
}
