use std::time::Duration;

use pot_ast::Action;
use pot_compile::{CompiledProgram, Term};
use tracing::{debug, warn, Span};

use crate::backend::{Backend, SatStatus, SolverError, SolverProvider};
use crate::result::{
    GoalCombination, GoalOutcome, GoalStatus, OptimizationOutcome, OptimizationStatus,
    VerificationResult, Verdict,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecConfig {
    /// Per-check solver timeout.
    pub timeout: Duration,
    pub combination: GoalCombination,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
            combination: GoalCombination::default(),
        }
    }
}

/// Runs a compiled program's actions against a solver backend.
pub struct Executor {
    config: ExecConfig,
    span: Span,
}

impl Executor {
    pub fn new(config: ExecConfig) -> Self {
        Self {
            config,
            span: Span::none(),
        }
    }

    /// Events from this executor are recorded under `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    pub fn execute(
        &self,
        program: &CompiledProgram,
        provider: &dyn SolverProvider,
    ) -> Result<VerificationResult, SolverError> {
        provider.with_backend(self.config.timeout, &mut |backend: &mut dyn Backend| {
            self.execute_with(program, backend)
        })
    }

    pub fn execute_with(
        &self,
        program: &CompiledProgram,
        backend: &mut dyn Backend,
    ) -> Result<VerificationResult, SolverError> {
        backend.declare(&program.symbols)?;

        let mut goals = Vec::new();
        if program.wants(Action::VerifyConditions) {
            backend.push();
            let checked = self.verify_goals(program, backend, &mut goals);
            backend.pop();
            checked?;
        }

        let verdicts: Vec<Verdict> = goals.iter().map(|g| g.verdict).collect();
        let answer = self.config.combination.combine(&verdicts);

        let optimization = if program.wants(Action::Optimize) {
            Some(self.optimize(program, backend)?)
        } else {
            None
        };

        debug!(
            parent: &self.span,
            answer = %answer,
            goals = goals.len(),
            combination = self.config.combination.name(),
            "program executed"
        );

        Ok(VerificationResult {
            answer,
            goals,
            optimization,
        })
    }

    fn verify_goals(
        &self,
        program: &CompiledProgram,
        backend: &mut dyn Backend,
        out: &mut Vec<GoalOutcome>,
    ) -> Result<(), SolverError> {
        for a in &program.assertions {
            backend.assert(&a.term)?;
        }

        for goal in &program.goals {
            backend.push();
            let outcome = self.check_goal(backend, &goal.name, &goal.term);
            backend.pop();

            debug!(
                parent: &self.span,
                goal = %goal.name,
                verdict = %outcome.verdict,
                "goal checked"
            );
            out.push(outcome);
        }
        Ok(())
    }

    /// The assertions entail `goal` exactly when `not goal` is unsatisfiable under them.
    fn check_goal(&self, backend: &mut dyn Backend, name: &str, goal: &Term) -> GoalOutcome {
        let checked = backend
            .assert(&goal.clone().not())
            .and_then(|_| backend.check());

        let (verdict, status, witness, reason) = match checked {
            Ok(SatStatus::Unsat) => (Verdict::True, GoalStatus::Unsat, None, None),
            Ok(SatStatus::Sat) => (Verdict::False, GoalStatus::Sat, backend.witness(), None),
            Ok(SatStatus::Unknown(reason)) => (Verdict::Unknown, GoalStatus::Unknown, None, reason),
            Err(e) => {
                warn!(parent: &self.span, goal = %name, error = %e, "goal check failed");
                (Verdict::Unknown, GoalStatus::Error, None, Some(e.to_string()))
            }
        };

        GoalOutcome {
            name: name.to_string(),
            verdict,
            status,
            witness,
            reason,
        }
    }

    fn optimize(
        &self,
        program: &CompiledProgram,
        backend: &mut dyn Backend,
    ) -> Result<OptimizationOutcome, SolverError> {
        let Some(model) = &program.optimization else {
            return Ok(OptimizationOutcome {
                status: OptimizationStatus::Unknown,
                objectives: Vec::new(),
                witness: None,
                reason: Some("program requests optimize but has no optimization section".to_string()),
            });
        };

        let constraints: Vec<&Term> = program
            .assertions
            .iter()
            .chain(&model.constraints)
            .map(|a| &a.term)
            .collect();

        let outcome = backend.optimize(&constraints, &model.objectives)?;
        debug!(
            parent: &self.span,
            status = ?outcome.status,
            objectives = outcome.objectives.len(),
            "optimization finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{ObjectiveValue, Witness};
    use pot_compile::{compile, CompiledObjective, SymbolTable};
    use serde_json::json;
    use std::collections::VecDeque;

    /// Replays canned check results and records what the executor asked for.
    #[derive(Default)]
    struct ScriptedBackend {
        checks: VecDeque<Result<SatStatus, SolverError>>,
        log: Vec<String>,
        depth: usize,
        asserted: usize,
        optimized: Option<(usize, usize)>,
    }

    impl ScriptedBackend {
        fn new(checks: Vec<Result<SatStatus, SolverError>>) -> Self {
            Self {
                checks: checks.into(),
                ..Self::default()
            }
        }
    }

    impl Backend for ScriptedBackend {
        fn declare(&mut self, symbols: &SymbolTable) -> Result<(), SolverError> {
            self.log.push(format!("declare {}", symbols.constants().len()));
            Ok(())
        }

        fn assert(&mut self, _term: &Term) -> Result<(), SolverError> {
            self.asserted += 1;
            self.log.push(format!("assert@{}", self.depth));
            Ok(())
        }

        fn push(&mut self) {
            self.depth += 1;
            self.log.push("push".to_string());
        }

        fn pop(&mut self) {
            self.depth -= 1;
            self.log.push("pop".to_string());
        }

        fn check(&mut self) -> Result<SatStatus, SolverError> {
            self.log.push("check".to_string());
            self.checks
                .pop_front()
                .unwrap_or(Ok(SatStatus::Unknown(Some("script exhausted".to_string()))))
        }

        fn witness(&mut self) -> Option<Witness> {
            Some(Witness {
                bindings: vec![("x".to_string(), "5".to_string())],
                model: None,
            })
        }

        fn optimize(
            &mut self,
            constraints: &[&Term],
            objectives: &[CompiledObjective],
        ) -> Result<OptimizationOutcome, SolverError> {
            self.optimized = Some((constraints.len(), objectives.len()));
            Ok(OptimizationOutcome {
                status: OptimizationStatus::Optimal,
                objectives: objectives
                    .iter()
                    .map(|o| ObjectiveValue {
                        expression: o.text.clone(),
                        direction: o.direction,
                        value: Some("10".to_string()),
                    })
                    .collect(),
                witness: None,
                reason: None,
            })
        }
    }

    fn program(goals: usize) -> CompiledProgram {
        let verifications: Vec<_> = (0..goals)
            .map(|i| json!({"name": format!("g{i}"), "constraint": format!("x > {i}")}))
            .collect();
        let doc = json!({
            "variables": [{"name": "x", "sort": "IntSort"}],
            "knowledge_base": ["x = 4", "x >= 0"],
            "verifications": verifications
        });
        compile(&pot_schema::validate(&doc).unwrap()).unwrap()
    }

    fn run(
        goals: usize,
        combination: GoalCombination,
        checks: Vec<Result<SatStatus, SolverError>>,
    ) -> (VerificationResult, ScriptedBackend) {
        let exec = Executor::new(ExecConfig {
            combination,
            ..ExecConfig::default()
        });
        let mut backend = ScriptedBackend::new(checks);
        let result = exec.execute_with(&program(goals), &mut backend).unwrap();
        (result, backend)
    }

    #[test]
    fn unsat_negation_means_goal_holds() {
        let (r, b) = run(1, GoalCombination::Conjunction, vec![Ok(SatStatus::Unsat)]);
        assert_eq!(r.answer, Verdict::True);
        assert_eq!(r.goals[0].status, GoalStatus::Unsat);
        assert!(r.goals[0].witness.is_none());
        assert_eq!(
            b.log,
            vec![
                "declare 1", "push", "assert@1", "assert@1", "push", "assert@2", "check", "pop",
                "pop"
            ]
        );
    }

    #[test]
    fn sat_negation_reports_countermodel() {
        let (r, _) = run(1, GoalCombination::Conjunction, vec![Ok(SatStatus::Sat)]);
        assert_eq!(r.answer, Verdict::False);
        assert_eq!(r.goals[0].witness.as_ref().and_then(|w| w.get("x")), Some("5"));
    }

    #[test]
    fn every_goal_gets_its_own_scope() {
        let (r, b) = run(
            3,
            GoalCombination::Conjunction,
            vec![Ok(SatStatus::Unsat), Ok(SatStatus::Unsat), Ok(SatStatus::Unsat)],
        );
        assert_eq!(r.answer, Verdict::True);
        assert_eq!(r.goals.len(), 3);
        assert_eq!(b.depth, 0);
        assert_eq!(b.log.iter().filter(|l| *l == "check").count(), 3);
        // Base assertions go in once, below the per-goal scopes.
        assert_eq!(b.log.iter().filter(|l| *l == "assert@1").count(), 2);
    }

    #[test]
    fn conjunction_short_circuits_on_false_despite_unknown() {
        let checks = vec![Ok(SatStatus::Unknown(Some("timeout".to_string()))), Ok(SatStatus::Sat)];
        let (r, _) = run(2, GoalCombination::Conjunction, checks);
        assert_eq!(r.answer, Verdict::False);
        assert_eq!(r.goals[0].reason.as_deref(), Some("timeout"));
    }

    #[test]
    fn conjunction_with_unknown_and_true_is_unknown() {
        let checks = vec![Ok(SatStatus::Unsat), Ok(SatStatus::Unknown(None))];
        let (r, _) = run(2, GoalCombination::Conjunction, checks);
        assert_eq!(r.answer, Verdict::Unknown);
    }

    #[test]
    fn first_deciding_skips_leading_unknowns() {
        let checks = vec![Ok(SatStatus::Unknown(None)), Ok(SatStatus::Unsat), Ok(SatStatus::Sat)];
        let (r, _) = run(3, GoalCombination::FirstDeciding, checks);
        assert_eq!(r.answer, Verdict::True);
    }

    #[test]
    fn disjunction_needs_one_true_goal() {
        let (r, _) = run(2, GoalCombination::Disjunction, vec![Ok(SatStatus::Sat), Ok(SatStatus::Unsat)]);
        assert_eq!(r.answer, Verdict::True);
        let (r, _) = run(2, GoalCombination::Disjunction, vec![Ok(SatStatus::Sat), Ok(SatStatus::Sat)]);
        assert_eq!(r.answer, Verdict::False);
    }

    #[test]
    fn solver_error_degrades_single_goal_to_unknown() {
        let checks = vec![Err(SolverError::backend("boom")), Ok(SatStatus::Unsat)];
        let (r, b) = run(2, GoalCombination::Conjunction, checks);
        assert_eq!(r.goals[0].status, GoalStatus::Error);
        assert_eq!(r.goals[0].verdict, Verdict::Unknown);
        assert!(r.goals[0].reason.as_deref().unwrap_or_default().contains("boom"));
        assert_eq!(r.goals[1].verdict, Verdict::True);
        assert_eq!(r.answer, Verdict::Unknown);
        assert_eq!(b.depth, 0);
    }

    #[test]
    fn no_goals_is_unknown() {
        let (r, b) = run(0, GoalCombination::Conjunction, vec![]);
        assert_eq!(r.answer, Verdict::Unknown);
        assert!(r.goals.is_empty());
        assert!(!b.log.contains(&"check".to_string()));
    }

    #[test]
    fn optimize_sends_program_and_section_constraints() {
        let doc = json!({
            "knowledge_base": ["true"],
            "optimization": {
                "variables": [{"name": "x", "sort": "IntSort"}],
                "constraints": ["x <= 10", "x >= 0"],
                "objectives": [{"type": "maximize", "expression": "x"}]
            },
            "actions": ["optimize"]
        });
        let compiled = compile(&pot_schema::validate(&doc).unwrap()).unwrap();
        let mut backend = ScriptedBackend::default();
        let r = Executor::new(ExecConfig::default())
            .execute_with(&compiled, &mut backend)
            .unwrap();
        assert_eq!(backend.optimized, Some((3, 1)));
        assert!(r.goals.is_empty());
        let opt = r.optimization.unwrap();
        assert_eq!(opt.status, OptimizationStatus::Optimal);
        assert_eq!(opt.objectives[0].value.as_deref(), Some("10"));
    }

    #[test]
    fn optimize_without_section_is_unknown() {
        let doc = json!({"actions": ["optimize"]});
        let compiled = compile(&pot_schema::validate(&doc).unwrap()).unwrap();
        let r = Executor::new(ExecConfig::default())
            .execute_with(&compiled, &mut ScriptedBackend::default())
            .unwrap();
        assert_eq!(r.optimization.unwrap().status, OptimizationStatus::Unknown);
    }

    #[test]
    fn unavailable_provider_is_an_error() {
        let err = Executor::new(ExecConfig::default())
            .execute(&program(1), &crate::NoZ3Backend)
            .unwrap_err();
        assert!(matches!(err, SolverError::Unavailable { .. }));
    }

    #[test]
    fn combination_policy_table() {
        use Verdict::*;
        let c = GoalCombination::Conjunction;
        assert_eq!(c.combine(&[True, True]), True);
        assert_eq!(c.combine(&[True, False]), False);
        assert_eq!(c.combine(&[Unknown, True]), Unknown);
        let f = GoalCombination::FirstDeciding;
        assert_eq!(f.combine(&[Unknown, False, True]), False);
        assert_eq!(f.combine(&[Unknown]), Unknown);
        let d = GoalCombination::Disjunction;
        assert_eq!(d.combine(&[Unknown, True]), True);
        assert_eq!(d.combine(&[Unknown, False]), Unknown);
        assert_eq!(d.combine(&[]), Unknown);
        assert_eq!("first".parse::<GoalCombination>(), Ok(GoalCombination::FirstDeciding));
        assert!("most".parse::<GoalCombination>().is_err());
    }
}
