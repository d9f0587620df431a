//! Batch Orchestrator
//!
//! Evaluates every model artifact found in the models directory against one
//! shared test set. Models run strictly one after another:
//! load, latency, resource profile, metrics, per-model reports. A failure
//! scoped to one model is recorded and the batch moves on; data and output
//! failures end the batch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EvaluationConfig;
use crate::dataset::{load_test_dataset, FeatureTable, LabelUniverse, TestDataset};
use crate::error::{EvalError, Result};
use crate::metrics::{
    class_curves, per_class_scores, ClassCurves, ClassificationMetrics, ConfusionMatrix,
    MetricsRecord,
};
use crate::model::{model_name_from_path, ModelArtifact};
use crate::profiling::{profile_latency, profile_prediction, LatencyProfile, ResourceProfile};
use crate::report::ReportWriter;

/// List artifact files matching `pattern` inside `models_dir`, sorted.
pub fn discover_artifacts(models_dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full_pattern = models_dir.join(pattern);
    let entries = glob::glob(&full_pattern.to_string_lossy())
        .map_err(|e| EvalError::Config(format!("Invalid artifact glob '{pattern}': {e}")))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) if path.is_file() => Some(path),
            _ => None,
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Test data shared by every model of a batch.
#[derive(Debug, Clone)]
pub struct EvaluationInput {
    pub features: Arc<FeatureTable>,
    pub labels: Vec<String>,
    pub universe: LabelUniverse,
}

impl From<TestDataset> for EvaluationInput {
    fn from(dataset: TestDataset) -> Self {
        Self {
            features: Arc::new(dataset.features),
            labels: dataset.labels,
            universe: dataset.universe,
        }
    }
}

/// Everything produced for one model.
#[derive(Debug, Clone)]
pub struct ModelEvaluation {
    pub record: MetricsRecord,
    pub matrix: ConfusionMatrix,
    pub latency: LatencyProfile,
    pub resources: ResourceProfile,
    /// Present for probabilistic models when curve output is enabled.
    pub curves: Option<Vec<ClassCurves>>,
}

/// A model the batch skipped.
#[derive(Debug, Clone, Serialize)]
pub struct ModelFailure {
    pub model: String,
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub succeeded: Vec<MetricsRecord>,
    pub failed: Vec<ModelFailure>,
    pub tradeoff_path: PathBuf,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Drives evaluations with one configuration and one report directory.
pub struct BatchOrchestrator {
    config: EvaluationConfig,
    writer: ReportWriter,
}

impl BatchOrchestrator {
    /// Validate `config` and prepare the output directory.
    pub fn new(config: EvaluationConfig) -> Result<Self> {
        config.validate()?;
        let writer = ReportWriter::new(&config.output_dir)?;
        Ok(Self { config, writer })
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    pub fn writer(&self) -> &ReportWriter {
        &self.writer
    }

    /// Load the configured test set; failure here is fatal for the run.
    pub async fn load_input(&self) -> Result<EvaluationInput> {
        let path = self.config.test_csv.clone();
        let label_column = self.config.label_column.clone();
        let dataset =
            tokio::task::spawn_blocking(move || load_test_dataset(&path, &label_column))
                .await
                .map_err(|e| EvalError::DataLoad(e.to_string()))??;
        info!(
            "Test set: {} rows, {} features, classes {:?}",
            dataset.n_rows(),
            dataset.features.columns().len(),
            dataset.universe.labels()
        );
        Ok(dataset.into())
    }

    /// Evaluate every discovered artifact and write the trade-off table.
    pub async fn run(&self) -> Result<BatchSummary> {
        let run_id = Uuid::new_v4();
        info!("Starting evaluation batch {}", run_id);

        let input = self.load_input().await?;
        let artifacts = discover_artifacts(&self.config.models_dir, &self.config.artifact_glob)?;
        if artifacts.is_empty() {
            warn!(
                "No artifacts matching '{}' in {:?}",
                self.config.artifact_glob, self.config.models_dir
            );
        }

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        // Model name → artifact that claimed it first. Names key the report
        // files, so a second artifact with the same name is skipped.
        let mut claimed: HashMap<String, PathBuf> = HashMap::new();
        for (i, path) in artifacts.iter().enumerate() {
            info!("[{}/{}] Evaluating {:?}", i + 1, artifacts.len(), path);
            let model = match ModelArtifact::load(path) {
                Ok(model) => Arc::new(model),
                Err(e) => {
                    skip_model(&mut failed, model_name_from_path(path), path, e)?;
                    continue;
                }
            };
            let name = model.name().to_string();
            if let Some(first) = claimed.get(&name) {
                let e = EvalError::model_load(
                    path,
                    format!("model name '{name}' is already used by {}", first.display()),
                );
                skip_model(&mut failed, name, path, e)?;
                continue;
            }
            claimed.insert(name.clone(), path.clone());

            match self.evaluate_loaded(model, &input).await {
                Ok(evaluation) => {
                    self.write_model_reports(&evaluation)?;
                    info!(
                        "{}: accuracy {:.4}, f1_macro {:.4}, {:.4} ms/sample",
                        evaluation.record.model,
                        evaluation.record.classification.accuracy,
                        evaluation.record.classification.f1_macro,
                        evaluation.record.latency_ms
                    );
                    succeeded.push(evaluation.record);
                }
                Err(e) => skip_model(&mut failed, name, path, e)?,
            }
        }

        let tradeoff_path = self.writer.write_tradeoff_table(&succeeded)?;
        info!(
            "Batch {} finished: {} succeeded, {} failed",
            run_id,
            succeeded.len(),
            failed.len()
        );
        Ok(BatchSummary {
            run_id,
            succeeded,
            failed,
            tradeoff_path,
        })
    }

    /// Evaluate one artifact and write its reports; every error propagates.
    pub async fn evaluate_single(&self, path: &Path) -> Result<MetricsRecord> {
        let input = self.load_input().await?;
        let evaluation = self.evaluate_model(path, &input).await?;
        self.write_model_reports(&evaluation)?;
        Ok(evaluation.record)
    }

    /// Run the full measurement pipeline for one artifact.
    pub async fn evaluate_model(&self, path: &Path, input: &EvaluationInput) -> Result<ModelEvaluation> {
        let model = Arc::new(ModelArtifact::load(path)?);
        self.evaluate_loaded(model, input).await
    }

    /// Measurement pipeline for an already loaded model.
    pub async fn evaluate_loaded(
        &self,
        model: Arc<ModelArtifact>,
        input: &EvaluationInput,
    ) -> Result<ModelEvaluation> {
        let name = model.name().to_string();

        let timed = profile_latency(model.clone(), input.features.clone(), self.config.warmup_rows).await?;
        info!("{}: latency {:.4} ms/sample", name, timed.latency.per_sample_ms());

        let resources = profile_prediction(
            model.clone(),
            input.features.clone(),
            self.config.sample_interval(),
        )
        .await?;
        debug!(
            "{}: memory overhead {:?} MiB, {} CPU samples",
            name,
            resources.mem_overhead_mib(),
            resources.cpu_samples.len()
        );

        let (matrix, classification) =
            ClassificationMetrics::compute(&input.universe, &input.labels, &timed.labels)?;

        let probabilities = {
            let model = model.clone();
            let features = input.features.clone();
            tokio::task::spawn_blocking(move || model.predict_proba(&features)).await??
        };
        let per_class = probabilities
            .as_ref()
            .map(|p| per_class_scores(&input.universe, &input.labels, p))
            .transpose()?;
        let curves = match (&probabilities, self.config.write_curves) {
            (Some(p), true) => Some(class_curves(&input.universe, &input.labels, p)?),
            _ => None,
        };

        let record = MetricsRecord {
            model: name,
            classification,
            latency_ms: timed.latency.per_sample_ms(),
            mem_overhead_mib: resources.mem_overhead_mib(),
            cpu_avg_pct: resources.cpu.map(|stats| stats.avg),
            per_class,
        };
        Ok(ModelEvaluation {
            record,
            matrix,
            latency: timed.latency,
            resources,
            curves,
        })
    }

    /// Write the per-model report files.
    pub fn write_model_reports(&self, evaluation: &ModelEvaluation) -> Result<()> {
        let model = &evaluation.record.model;
        self.writer.write_confusion_matrix(model, &evaluation.matrix)?;
        self.writer.write_metrics_summary(&evaluation.record)?;
        self.writer
            .write_latency_resources(model, &evaluation.latency, &evaluation.resources)?;
        if let Some(curves) = &evaluation.curves {
            self.writer.write_curves(model, curves)?;
        }
        debug!("Reports for {} written to {:?}", model, self.writer.output_dir());
        Ok(())
    }
}

/// Record a model-scoped failure and move on; anything else ends the batch.
fn skip_model(failed: &mut Vec<ModelFailure>, model: String, path: &Path, e: EvalError) -> Result<()> {
    if !e.is_model_scoped() {
        return Err(e);
    }
    warn!("Skipping model {}: {}", model, e);
    failed.push(ModelFailure {
        model,
        path: path.to_path_buf(),
        error: e.to_string(),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_artifacts_sorted_and_filtered() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        for name in ["svm.model.json", "rf.model.bin", "notes.txt", "mlp.model.json"] {
            fs::write(temp_dir.path().join(name), b"{}").unwrap();
        }
        fs::create_dir(temp_dir.path().join("dir.model.json")).unwrap();

        let found = discover_artifacts(temp_dir.path(), "*.model.*").unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["mlp.model.json", "rf.model.bin", "svm.model.json"]);
    }

    #[test]
    fn test_invalid_glob_is_config_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let err = discover_artifacts(temp_dir.path(), "[").unwrap_err();
        assert!(matches!(err, EvalError::Config(_)));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = EvaluationConfig {
            output_dir: temp_dir.path().join("out"),
            sample_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            BatchOrchestrator::new(config),
            Err(EvalError::Config(_))
        ));
    }

    #[test]
    fn test_skip_model_keeps_only_model_scoped_errors() {
        let mut failed = Vec::new();
        let path = Path::new("models/rf.model.json");

        skip_model(&mut failed, "rf".into(), path, EvalError::Prediction("schema".into())).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].model, "rf");

        let err = skip_model(&mut failed, "rf".into(), path, EvalError::Report("disk full".into()))
            .unwrap_err();
        assert!(matches!(err, EvalError::Report(_)));
        assert_eq!(failed.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_test_set_is_fatal() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = EvaluationConfig {
            test_csv: temp_dir.path().join("missing.csv"),
            models_dir: temp_dir.path().to_path_buf(),
            output_dir: temp_dir.path().join("out"),
            ..Default::default()
        };
        let orchestrator = BatchOrchestrator::new(config).unwrap();
        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, EvalError::DataLoad(_)));
        assert!(!err.is_model_scoped());
    }
}
