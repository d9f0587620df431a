//! Metrics Engine
//!
//! Turns the labels and scores of one evaluation into a [`MetricsRecord`]:
//! label-based metrics for every model, plus one-vs-rest ROC-AUC and average
//! precision per class when the model produces probabilities.

pub mod classification;
pub mod ranking;

pub use classification::{ClassReport, ClassificationMetrics, ConfusionMatrix};
pub use ranking::{average_precision, precision_recall_curve, roc_auc, roc_curve, CurvePoint};

use serde::Serialize;

use crate::dataset::LabelUniverse;
use crate::error::{EvalError, Result};
use crate::model::ClassProbabilities;

/// Ranking scores of one class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassScore {
    pub label: String,
    pub roc_auc: f64,
    pub average_precision: f64,
}

/// ROC and precision-recall curves of one class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassCurves {
    pub label: String,
    pub roc: Vec<CurvePoint>,
    pub pr: Vec<CurvePoint>,
}

/// Everything measured for one model.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsRecord {
    pub model: String,
    pub classification: ClassificationMetrics,
    pub latency_ms: f64,
    /// `None` when process memory could not be read.
    pub mem_overhead_mib: Option<f64>,
    /// `None` when no CPU reading landed inside the profiling window.
    pub cpu_avg_pct: Option<f64>,
    /// `Some` exactly when the model is probabilistic, with one entry per
    /// class of the label universe.
    pub per_class: Option<Vec<ClassScore>>,
}

impl MetricsRecord {
    /// Metric keys and values in report order.
    pub fn entries(&self) -> Vec<(String, Option<f64>)> {
        let c = &self.classification;
        let mut entries = vec![
            ("accuracy".to_string(), Some(c.accuracy)),
            ("precision_macro".to_string(), Some(c.precision_macro)),
            ("recall_macro".to_string(), Some(c.recall_macro)),
            ("f1_macro".to_string(), Some(c.f1_macro)),
            ("latency_ms".to_string(), Some(self.latency_ms)),
            ("mem_overhead_MiB".to_string(), self.mem_overhead_mib),
            ("cpu_avg_pct".to_string(), self.cpu_avg_pct),
        ];
        for score in self.per_class.iter().flatten() {
            entries.push((format!("roc_auc_{}", score.label), Some(score.roc_auc)));
            entries.push((format!("ap_{}", score.label), Some(score.average_precision)));
        }
        entries
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries()
            .into_iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v)
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.entries().iter().any(|(k, _)| k == key)
    }
}

fn binarize(universe_label: &str, y_true: &[String]) -> Vec<bool> {
    y_true.iter().map(|t| t == universe_label).collect()
}

fn check_rows(y_true: &[String], probabilities: &ClassProbabilities) -> Result<()> {
    if probabilities.values.nrows() != y_true.len() {
        return Err(EvalError::Prediction(format!(
            "{} probability rows for {} test rows",
            probabilities.values.nrows(),
            y_true.len()
        )));
    }
    Ok(())
}

/// One-vs-rest ROC-AUC and average precision for every universe class.
pub fn per_class_scores(
    universe: &LabelUniverse,
    y_true: &[String],
    probabilities: &ClassProbabilities,
) -> Result<Vec<ClassScore>> {
    check_rows(y_true, probabilities)?;
    Ok(universe
        .labels()
        .iter()
        .map(|label| {
            let truth = binarize(label, y_true);
            let scores = probabilities.column_for(label).to_vec();
            ClassScore {
                label: label.clone(),
                roc_auc: roc_auc(&truth, &scores),
                average_precision: average_precision(&truth, &scores),
            }
        })
        .collect())
}

/// ROC and precision-recall curves for every universe class.
pub fn class_curves(
    universe: &LabelUniverse,
    y_true: &[String],
    probabilities: &ClassProbabilities,
) -> Result<Vec<ClassCurves>> {
    check_rows(y_true, probabilities)?;
    Ok(universe
        .labels()
        .iter()
        .map(|label| {
            let truth = binarize(label, y_true);
            let scores = probabilities.column_for(label).to_vec();
            ClassCurves {
                label: label.clone(),
                roc: roc_curve(&truth, &scores),
                pr: precision_recall_curve(&truth, &scores),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn record(per_class: Option<Vec<ClassScore>>, cpu: Option<f64>) -> MetricsRecord {
        let y = labels(&["a", "b"]);
        let universe = LabelUniverse::from_labels(y.iter().cloned());
        let (_, classification) = ClassificationMetrics::compute(&universe, &y, &y).unwrap();
        MetricsRecord {
            model: "svm".to_string(),
            classification,
            latency_ms: 0.02,
            mem_overhead_mib: Some(1.5),
            cpu_avg_pct: cpu,
            per_class,
        }
    }

    #[test]
    fn test_deterministic_record_has_no_class_keys() {
        let record = record(None, Some(12.0));
        let keys: Vec<String> = record.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                "accuracy",
                "precision_macro",
                "recall_macro",
                "f1_macro",
                "latency_ms",
                "mem_overhead_MiB",
                "cpu_avg_pct"
            ]
        );
        assert!(!keys.iter().any(|k| k.starts_with("roc_auc_") || k.starts_with("ap_")));
        assert_eq!(record.get("cpu_avg_pct"), Some(12.0));
    }

    #[test]
    fn test_unavailable_cpu_keeps_key() {
        let record = record(None, None);
        assert!(record.has_key("cpu_avg_pct"));
        assert_eq!(record.get("cpu_avg_pct"), None);
    }

    #[test]
    fn test_one_key_pair_per_universe_class() {
        let y_true = labels(&["incast", "normal", "normal", "incast", "memory_contention"]);
        let universe = LabelUniverse::from_labels(y_true.iter().cloned());
        // The model never learned memory_contention.
        let probabilities = ClassProbabilities {
            class_labels: labels(&["incast", "normal"]),
            values: array![[0.9, 0.1], [0.2, 0.8], [0.3, 0.7], [0.6, 0.4], [0.5, 0.5]],
        };

        let scores = per_class_scores(&universe, &y_true, &probabilities).unwrap();
        assert_eq!(scores.len(), universe.len());

        let record = record(Some(scores), None);
        for class in universe.labels() {
            let roc_key = format!("roc_auc_{class}");
            let ap_key = format!("ap_{class}");
            assert_eq!(record.entries().iter().filter(|(k, _)| *k == roc_key).count(), 1);
            assert_eq!(record.entries().iter().filter(|(k, _)| *k == ap_key).count(), 1);
        }
        assert_eq!(record.get("roc_auc_incast"), Some(1.0));
        // All-zero scores rank every row equally.
        assert_eq!(record.get("roc_auc_memory_contention"), Some(0.5));
    }

    #[test]
    fn test_class_without_negatives_is_nan() {
        let y_true = labels(&["normal", "normal"]);
        let universe = LabelUniverse::from_labels(y_true.iter().cloned());
        let probabilities = ClassProbabilities {
            class_labels: labels(&["normal"]),
            values: array![[1.0], [1.0]],
        };
        let scores = per_class_scores(&universe, &y_true, &probabilities).unwrap();
        assert!(scores[0].roc_auc.is_nan());
        assert_eq!(scores[0].average_precision, 1.0);
    }

    #[test]
    fn test_row_mismatch_is_prediction_error() {
        let y_true = labels(&["a", "b"]);
        let universe = LabelUniverse::from_labels(y_true.iter().cloned());
        let probabilities = ClassProbabilities {
            class_labels: labels(&["a", "b"]),
            values: array![[1.0, 0.0]],
        };
        assert!(matches!(
            class_curves(&universe, &y_true, &probabilities),
            Err(EvalError::Prediction(_))
        ));
    }
}
