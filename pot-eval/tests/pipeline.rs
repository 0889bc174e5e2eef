use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pot_compile::{CompiledObjective, SymbolTable, Term};
use pot_eval::{
    EvalConfig, EvaluationPipeline, EvaluationReport, Record, RecordStatus, REPORT_FILE,
};
use pot_reason::{
    GenerationParams, Generator, GeneratorError, Message, ProgramCache, ProgramGenerator,
    Reasoner, ReasonerConfig, Reply,
};
use pot_verify::{
    Backend, OptimizationOutcome, OptimizationStatus, SatStatus, Session, SolverError,
    SolverProvider, VerificationResult, Witness,
};

/// Emits a program whose only variable is named after the marker in the
/// question: `[yes]`, `[no]` or `[unknown]`. `[fail]` yields an invalid
/// document and `[panic]` panics.
#[derive(Default)]
struct MarkerGenerator {
    calls: AtomicUsize,
}

impl Generator for MarkerGenerator {
    fn generate(&self, messages: &[Message], _params: &GenerationParams) -> Result<Reply, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = &messages[1].content;
        let question = prompt.rsplit("Question: ").next().unwrap_or_default();
        if question.contains("[panic]") {
            panic!("generator exploded");
        }
        if question.contains("[fail]") {
            return Ok(Reply::Text("{\"facts\": []}".to_string()));
        }
        let marker = ["yes", "no", "unknown"]
            .into_iter()
            .find(|m| question.contains(&format!("[{m}]")))
            .unwrap();
        Ok(Reply::Text(format!(
            r#"{{"variables": [{{"name": "{marker}", "sort": "Bool"}}], "verifications": [{{"constraint": "{marker}"}}]}}"#
        )))
    }
}

impl MarkerGenerator {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct MarkerBackend {
    status: SatStatus,
}

impl Backend for MarkerBackend {
    fn declare(&mut self, symbols: &SymbolTable) -> Result<(), SolverError> {
        let has = |name: &str| symbols.constants().iter().any(|c| c.name == name);
        self.status = if has("yes") {
            SatStatus::Unsat
        } else if has("no") {
            SatStatus::Sat
        } else {
            SatStatus::Unknown(Some("timeout".to_string()))
        };
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

    fn optimize(&mut self, _c: &[&Term], _o: &[CompiledObjective]) -> Result<OptimizationOutcome, SolverError> {
        Ok(OptimizationOutcome {
            status: OptimizationStatus::Unknown,
            objectives: Vec::new(),
            witness: None,
            reason: None,
        })
    }
}

#[derive(Default)]
struct MarkerProvider {
    sessions: AtomicUsize,
}

impl SolverProvider for MarkerProvider {
    fn describe(&self) -> String {
        "marker".to_string()
    }

    fn with_backend(
        &self,
        _timeout: Duration,
        session: &mut Session<'_>,
    ) -> Result<VerificationResult, SolverError> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        session(&mut MarkerBackend {
            status: SatStatus::Unknown(None),
        })
    }
}

fn record(id: &str, marker: &str, answer: bool) -> Record {
    Record {
        id: id.to_string(),
        question: format!("question {id} {marker}"),
        answer,
    }
}

fn dataset() -> Vec<Record> {
    vec![
        record("r1", "[yes]", true),
        record("r2", "[yes]", true),
        record("r3", "[yes]", true),
        record("r4", "[yes]", false),
        record("r5", "[no]", true),
        record("r6", "[fail]", true),
        record("r7", "[panic]", false),
    ]
}

fn reasoner(generator: Arc<MarkerGenerator>, cache: Option<Arc<ProgramCache>>) -> Arc<Reasoner> {
    let r = Reasoner::new(
        ProgramGenerator::new(generator, GenerationParams::default()),
        Arc::new(MarkerProvider::default()),
        ReasonerConfig::default(),
    );
    Arc::new(match cache {
        Some(c) => r.with_cache(c),
        None => r,
    })
}

fn run(records: &[Record], config: EvalConfig) -> EvaluationReport {
    let generator = Arc::new(MarkerGenerator::default());
    EvaluationPipeline::new(reasoner(generator, None), config)
        .evaluate(records)
        .unwrap()
}

#[test]
fn confusion_matrix_and_failures() {
    let report = run(
        &dataset(),
        EvalConfig {
            workers: 3,
            ..EvalConfig::default()
        },
    );
    let m = &report.metrics;

    assert_eq!((m.matrix.tp, m.matrix.fp, m.matrix.fn_, m.matrix.tn), (3, 1, 1, 0));
    assert_eq!(m.total_samples, 7);
    assert_eq!(m.failed, 2);
    assert!((m.accuracy - 0.6).abs() < 1e-12);
    assert!((m.precision - 0.75).abs() < 1e-12);
    assert!((m.recall - 0.75).abs() < 1e-12);
    assert!((m.f1_score - 0.75).abs() < 1e-12);

    let ids: Vec<&str> = report.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["r1", "r2", "r3", "r4", "r5", "r6", "r7"]);
    assert_eq!(report.results[5].status, RecordStatus::Failed);
    assert_eq!(report.results[5].attempts, 3);
    assert!(report.results[6].error.as_deref().unwrap().contains("generator exploded"));
    assert_eq!(report.results[3].correct, Some(false));
    assert!(report.results[0].program.is_some());
}

#[test]
fn worker_count_does_not_change_metrics() {
    let serial = run(&dataset(), EvalConfig { workers: 1, ..EvalConfig::default() });
    let parallel = run(&dataset(), EvalConfig { workers: 8, ..EvalConfig::default() });
    assert_eq!(serial.metrics, parallel.metrics);
}

#[test]
fn undecided_records_stay_out_of_the_matrix() {
    let report = run(&[record("u", "[unknown]", true)], EvalConfig::default());
    assert_eq!(report.metrics.undecided, 1);
    assert_eq!(report.metrics.matrix.decided(), 0);
    assert_eq!(report.results[0].status, RecordStatus::Undecided);
}

#[test]
fn sample_cap_limits_dispatch() {
    let generator = Arc::new(MarkerGenerator::default());
    let pipeline = EvaluationPipeline::new(
        reasoner(generator.clone(), None),
        EvalConfig {
            max_samples: Some(2),
            ..EvalConfig::default()
        },
    );
    let report = pipeline.evaluate(&dataset()).unwrap();
    assert_eq!(report.results.len(), 2);
    assert_eq!(generator.calls(), 2);
}

#[test]
fn skip_existing_uses_cached_answers() {
    let cache = Arc::new(ProgramCache::in_memory());
    let generator = Arc::new(MarkerGenerator::default());
    let records = vec![record("r1", "[yes]", true), record("r5", "[no]", true)];

    let first = EvaluationPipeline::new(reasoner(generator.clone(), Some(cache.clone())), EvalConfig::default())
        .evaluate(&records)
        .unwrap();
    assert_eq!(generator.calls(), 2);
    assert!(first.results.iter().all(|r| !r.skipped));

    let second = EvaluationPipeline::new(
        reasoner(generator.clone(), Some(cache)),
        EvalConfig {
            skip_existing: true,
            ..EvalConfig::default()
        },
    )
    .evaluate(&records)
    .unwrap();
    assert_eq!(generator.calls(), 2);
    assert!(second.results.iter().all(|r| r.skipped));
    assert_eq!(first.metrics, second.metrics);
}

#[test]
fn report_lands_in_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let report = run(
        &dataset()[..2],
        EvalConfig {
            output_dir: Some(dir.path().to_path_buf()),
            ..EvalConfig::default()
        },
    );
    let text = std::fs::read_to_string(dir.path().join(REPORT_FILE)).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(doc["metrics"]["tp"], 2);
    assert_eq!(doc["results"].as_array().unwrap().len(), report.results.len());
}
