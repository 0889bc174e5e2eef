use std::fmt;
use std::str::FromStr;

use pot_ast::Direction;
use serde::{Deserialize, Serialize};

/// Three-valued answer for one goal or for the whole program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    True,
    False,
    Unknown,
}

impl Verdict {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Verdict::True => Some(true),
            Verdict::False => Some(false),
            Verdict::Unknown => None,
        }
    }
}

impl From<bool> for Verdict {
    fn from(b: bool) -> Self {
        if b { Verdict::True } else { Verdict::False }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::True => "TRUE",
            Verdict::False => "FALSE",
            Verdict::Unknown => "UNKNOWN",
        })
    }
}

/// How per-goal verdicts combine into the program's answer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalCombination {
    /// All goals must hold. A FALSE goal decides even when others are UNKNOWN.
    #[default]
    Conjunction,
    /// The first goal in document order with a definite verdict decides.
    FirstDeciding,
    /// Any goal holding is enough. A TRUE goal decides even when others are UNKNOWN.
    Disjunction,
}

impl GoalCombination {
    pub fn name(self) -> &'static str {
        match self {
            GoalCombination::Conjunction => "conjunction",
            GoalCombination::FirstDeciding => "first_deciding",
            GoalCombination::Disjunction => "disjunction",
        }
    }

    /// No goals at all is UNKNOWN under every policy.
    pub fn combine(self, verdicts: &[Verdict]) -> Verdict {
        if verdicts.is_empty() {
            return Verdict::Unknown;
        }
        let any = |v| verdicts.contains(&v);
        match self {
            GoalCombination::Conjunction if any(Verdict::False) => Verdict::False,
            GoalCombination::Conjunction if any(Verdict::Unknown) => Verdict::Unknown,
            GoalCombination::Conjunction => Verdict::True,
            GoalCombination::Disjunction if any(Verdict::True) => Verdict::True,
            GoalCombination::Disjunction if any(Verdict::Unknown) => Verdict::Unknown,
            GoalCombination::Disjunction => Verdict::False,
            GoalCombination::FirstDeciding => verdicts
                .iter()
                .copied()
                .find(|v| *v != Verdict::Unknown)
                .unwrap_or(Verdict::Unknown),
        }
    }
}

impl FromStr for GoalCombination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conjunction" | "all" => Ok(GoalCombination::Conjunction),
            "first_deciding" | "first" => Ok(GoalCombination::FirstDeciding),
            "disjunction" | "any" => Ok(GoalCombination::Disjunction),
            other => Err(format!(
                "unknown goal combination '{other}' (expected conjunction, first_deciding or disjunction)"
            )),
        }
    }
}

/// Satisfying assignment reported by the solver.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    /// `(constant, value)` for declared constants, in declaration order.
    pub bindings: Vec<(String, String)>,
    /// Full model text, including function interpretations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Witness {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Raw solver status for one goal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    /// Negated goal was unsatisfiable.
    Unsat,
    /// Negated goal was satisfiable; a countermodel exists.
    Sat,
    Unknown,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalOutcome {
    pub name: String,
    pub verdict: Verdict,
    pub status: GoalStatus,
    /// Countermodel when the goal does not hold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness: Option<Witness>,
    /// Why the goal is UNKNOWN, when the solver said.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStatus {
    Optimal,
    Unsat,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveValue {
    pub expression: String,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub status: OptimizationStatus,
    pub objectives: Vec<ObjectiveValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness: Option<Witness>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub answer: Verdict,
    pub goals: Vec<GoalOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization: Option<OptimizationOutcome>,
}

impl VerificationResult {
    pub fn answer_bool(&self) -> Option<bool> {
        self.answer.as_bool()
    }
}
