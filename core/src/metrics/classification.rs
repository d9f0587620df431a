//! Confusion matrix and label-based classification metrics

use ndarray::{Array1, Array2};
use serde::Serialize;

use crate::dataset::LabelUniverse;
use crate::error::{EvalError, Result};

/// Square count matrix over the label universe (rows = true class,
/// columns = predicted class).
///
/// Predictions naming a label outside the universe land in `unmatched` for
/// their true class, so each row total equals the support of that class.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    labels: Vec<String>,
    counts: Array2<u64>,
    unmatched: Array1<u64>,
}

impl ConfusionMatrix {
    pub fn build(universe: &LabelUniverse, y_true: &[String], y_pred: &[String]) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(EvalError::Prediction(format!(
                "{} predictions for {} test rows",
                y_pred.len(),
                y_true.len()
            )));
        }

        let n = universe.len();
        let mut counts = Array2::<u64>::zeros((n, n));
        let mut unmatched = Array1::<u64>::zeros(n);
        for (truth, pred) in y_true.iter().zip(y_pred) {
            let row = universe.index_of(truth).ok_or_else(|| {
                EvalError::Prediction(format!("true label '{truth}' outside the label universe"))
            })?;
            match universe.index_of(pred) {
                Some(col) => counts[[row, col]] += 1,
                None => unmatched[row] += 1,
            }
        }

        Ok(Self {
            labels: universe.labels().to_vec(),
            counts,
            unmatched,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn counts(&self) -> &Array2<u64> {
        &self.counts
    }

    pub fn unmatched(&self) -> &Array1<u64> {
        &self.unmatched
    }

    pub fn has_unmatched(&self) -> bool {
        self.unmatched.iter().any(|&c| c > 0)
    }

    /// Number of test rows whose true label is class `row`.
    pub fn row_total(&self, row: usize) -> u64 {
        self.counts.row(row).sum() + self.unmatched[row]
    }

    /// Number of rows predicted as class `col`.
    pub fn column_total(&self, col: usize) -> u64 {
        self.counts.column(col).sum()
    }

    pub fn total(&self) -> u64 {
        self.counts.sum() + self.unmatched.sum()
    }

    pub fn correct(&self) -> u64 {
        self.counts.diag().sum()
    }
}

/// Precision, recall and F1 of one class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassReport {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u64,
}

/// Accuracy and macro-averaged precision/recall/F1.
///
/// Zero-division policy: a class never predicted has precision 0, a class
/// with precision + recall = 0 has F1 0, and those zeros count toward the
/// macro averages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision_macro: f64,
    pub recall_macro: f64,
    pub f1_macro: f64,
    pub per_class: Vec<ClassReport>,
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl ClassificationMetrics {
    pub fn from_confusion(matrix: &ConfusionMatrix) -> Self {
        let per_class: Vec<ClassReport> = matrix
            .labels()
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let tp = matrix.counts()[[i, i]];
                let precision = ratio(tp, matrix.column_total(i));
                let recall = ratio(tp, matrix.row_total(i));
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassReport {
                    label: label.clone(),
                    precision,
                    recall,
                    f1,
                    support: matrix.row_total(i),
                }
            })
            .collect();

        let n = per_class.len().max(1) as f64;
        Self {
            accuracy: ratio(matrix.correct(), matrix.total()),
            precision_macro: per_class.iter().map(|c| c.precision).sum::<f64>() / n,
            recall_macro: per_class.iter().map(|c| c.recall).sum::<f64>() / n,
            f1_macro: per_class.iter().map(|c| c.f1).sum::<f64>() / n,
            per_class,
        }
    }

    pub fn compute(
        universe: &LabelUniverse,
        y_true: &[String],
        y_pred: &[String],
    ) -> Result<(ConfusionMatrix, Self)> {
        let matrix = ConfusionMatrix::build(universe, y_true, y_pred)?;
        let metrics = Self::from_confusion(&matrix);
        Ok((matrix, metrics))
    }
}
