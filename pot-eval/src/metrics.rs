use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn record(&mut self, predicted: bool, actual: bool) {
        match (predicted, actual) {
            (true, true) => self.tp += 1,
            (true, false) => self.fp += 1,
            (false, false) => self.tn += 1,
            (false, true) => self.fn_ += 1,
        }
    }

    pub fn decided(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }
}

/// One record's contribution to the aggregate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tally {
    Decided { predicted: bool, actual: bool },
    /// Verified, but the solver could not decide the answer.
    Undecided,
    Failed,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_samples: usize,
    pub correct: usize,
    pub wrong: usize,
    pub failed: usize,
    pub undecided: usize,
    #[serde(flatten)]
    pub matrix: ConfusionMatrix,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub specificity: f64,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

impl Metrics {
    /// Counts only, so the result does not depend on the order of `tallies`.
    pub fn from_tallies(tallies: impl IntoIterator<Item = Tally>) -> Self {
        let mut matrix = ConfusionMatrix::default();
        let mut failed = 0;
        let mut undecided = 0;
        let mut total = 0;
        for t in tallies {
            total += 1;
            match t {
                Tally::Decided { predicted, actual } => matrix.record(predicted, actual),
                Tally::Undecided => undecided += 1,
                Tally::Failed => failed += 1,
            }
        }
        Self::from_counts(total, matrix, failed, undecided)
    }

    fn from_counts(total_samples: usize, matrix: ConfusionMatrix, failed: usize, undecided: usize) -> Self {
        let ConfusionMatrix { tp, fp, tn, fn_ } = matrix;
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1_score = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Metrics {
            total_samples,
            correct: tp + tn,
            wrong: fp + fn_,
            failed,
            undecided,
            matrix,
            accuracy: ratio(tp + tn, matrix.decided()),
            precision,
            recall,
            f1_score,
            specificity: ratio(tn, tn + fp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decided(predicted: bool, actual: bool) -> Tally {
        Tally::Decided { predicted, actual }
    }

    #[test]
    fn metrics_from_a_small_matrix() {
        let tallies = vec![
            decided(true, true),
            decided(true, true),
            decided(true, true),
            decided(true, false),
            decided(false, true),
            Tally::Failed,
        ];
        let m = Metrics::from_tallies(tallies);
        assert_eq!(m.matrix, ConfusionMatrix { tp: 3, fp: 1, tn: 0, fn_: 1 });
        assert_eq!(m.total_samples, 6);
        assert_eq!(m.failed, 1);
        assert_eq!(m.correct, 3);
        assert_eq!(m.wrong, 2);
        assert!((m.accuracy - 0.6).abs() < 1e-12);
        assert!((m.precision - 0.75).abs() < 1e-12);
        assert!((m.recall - 0.75).abs() < 1e-12);
        assert!((m.f1_score - 0.75).abs() < 1e-12);
        assert_eq!(m.specificity, 0.0);
    }

    #[test]
    fn zero_denominators_yield_zero() {
        let m = Metrics::from_tallies(vec![Tally::Failed, Tally::Undecided]);
        assert_eq!(m.total_samples, 2);
        assert_eq!(m.undecided, 1);
        assert_eq!(m.accuracy, 0.0);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1_score, 0.0);
        assert_eq!(m.specificity, 0.0);
    }

    #[test]
    fn serialised_matrix_uses_short_names() {
        let m = Metrics::from_tallies(vec![decided(false, true)]);
        let doc = serde_json::to_value(&m).unwrap();
        assert_eq!(doc["fn"], 1);
        assert_eq!(doc["tp"], 0);
    }

    fn tally() -> impl Strategy<Value = Tally> {
        prop_oneof![
            (any::<bool>(), any::<bool>()).prop_map(|(p, a)| decided(p, a)),
            Just(Tally::Undecided),
            Just(Tally::Failed),
        ]
    }

    proptest! {
        #[test]
        fn metrics_ignore_completion_order(
            (original, shuffled) in prop::collection::vec(tally(), 0..64)
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
        ) {
            prop_assert_eq!(Metrics::from_tallies(original), Metrics::from_tallies(shuffled));
        }
    }
}
