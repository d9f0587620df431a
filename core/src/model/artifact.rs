//! Persisted model artifacts
//!
//! An artifact file holds an [`ArtifactEnvelope`]: the estimator weights plus
//! the contract needed to use them (feature schema, class label order,
//! probability capability, optional input scaling). Files are named
//! `<model>.model.json` (serde_json) or `<model>.model.bin` (bincode).

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::estimators::{Classifier, Estimator, ProbabilisticClassifier};
use crate::dataset::FeatureTable;
use crate::error::{EvalError, Result};

/// Envelope version understood by this loader.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// On-disk encoding, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Json,
    Binary,
}

impl ArtifactFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(ArtifactFormat::Json),
            "bin" => Some(ArtifactFormat::Binary),
            _ => None,
        }
    }
}

/// Model identity derived from an artifact file name:
/// `rf_v3.model.json` → `rf_v3`.
pub fn model_name_from_path(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => file_name.as_str(),
    };
    stem.strip_suffix(".model").unwrap_or(stem).to_string()
}

/// A model name becomes a report file prefix, so it must be one plain file
/// name component.
fn check_model_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("model name is empty".to_string());
    }
    if name.contains(['/', '\\']) {
        return Err(format!("model name '{name}' contains a path separator"));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(format!("model name '{name}' is not a plain file name")),
    }
}

/// Standardization applied before the estimator: `(x - mean) / scale`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    pub scale: Array1<f64>,
}

impl StandardScaler {
    fn transform(&self, mut x: Array2<f64>) -> Array2<f64> {
        x -= &self.mean;
        x /= &self.scale;
        x
    }
}

/// Serialization contract stored alongside the model weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEnvelope {
    pub format_version: u32,
    #[serde(default)]
    pub name: Option<String>,
    pub feature_names: Vec<String>,
    pub class_labels: Vec<String>,
    pub supports_probability: bool,
    #[serde(default)]
    pub scaler: Option<StandardScaler>,
    pub estimator: Estimator,
}

impl ArtifactEnvelope {
    pub fn new(feature_names: Vec<String>, class_labels: Vec<String>, estimator: Estimator) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            name: None,
            supports_probability: estimator.can_estimate_probability(),
            feature_names,
            class_labels,
            scaler: None,
            estimator,
        }
    }

    pub fn with_scaler(mut self, scaler: StandardScaler) -> Self {
        self.scaler = Some(scaler);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Write the envelope in the format implied by `path`'s extension.
    pub fn save(&self, path: &Path) -> Result<()> {
        let format = ArtifactFormat::from_path(path).ok_or_else(|| {
            EvalError::Report(format!("unknown artifact extension: {}", path.display()))
        })?;
        let bytes = match format {
            ArtifactFormat::Json => serde_json::to_vec_pretty(self)
                .map_err(|e| EvalError::Report(format!("encode {}: {e}", path.display())))?,
            ArtifactFormat::Binary => bincode::serialize(self)
                .map_err(|e| EvalError::Report(format!("encode {}: {e}", path.display())))?,
        };
        std::fs::write(path, bytes)?;
        debug!("Saved artifact to {:?}", path);
        Ok(())
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(format!(
                "unsupported format version {} (expected {ARTIFACT_FORMAT_VERSION})",
                self.format_version
            ));
        }
        if self.feature_names.is_empty() {
            return Err("feature schema is empty".to_string());
        }
        if self.class_labels.is_empty() {
            return Err("class label list is empty".to_string());
        }
        let mut labels = self.class_labels.clone();
        labels.sort();
        labels.dedup();
        if labels.len() != self.class_labels.len() {
            return Err("class labels are not unique".to_string());
        }
        if let Some(scaler) = &self.scaler {
            let n = self.feature_names.len();
            if scaler.mean.len() != n || scaler.scale.len() != n {
                return Err(format!("scaler does not cover {n} features"));
            }
            if scaler.scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
                return Err("scaler has zero or non-finite scale".to_string());
            }
        }
        self.estimator
            .validate(self.feature_names.len(), self.class_labels.len())?;
        if self.supports_probability && !self.estimator.can_estimate_probability() {
            return Err(format!(
                "artifact claims probability estimates but the {} weights cannot provide them",
                self.estimator.kind()
            ));
        }
        Ok(())
    }
}

/// What a loaded model can do, fixed at load time.
#[derive(Clone)]
pub enum Capability {
    Deterministic(Arc<dyn Classifier>),
    Probabilistic(Arc<dyn ProbabilisticClassifier>),
}

impl Capability {
    fn from_estimator(estimator: Estimator, probabilistic: bool) -> Self {
        match (estimator, probabilistic) {
            (Estimator::RandomForest(m), true) => Capability::Probabilistic(Arc::new(m)),
            (Estimator::RandomForest(m), false) => Capability::Deterministic(Arc::new(m)),
            // Rejected by validation when flagged probabilistic.
            (Estimator::DecisionTree(m), _) => Capability::Deterministic(Arc::new(m)),
            (Estimator::LinearSvm(m), true) => Capability::Probabilistic(Arc::new(m)),
            (Estimator::LinearSvm(m), false) => Capability::Deterministic(Arc::new(m)),
            (Estimator::Mlp(m), true) => Capability::Probabilistic(Arc::new(m)),
            (Estimator::Mlp(m), false) => Capability::Deterministic(Arc::new(m)),
        }
    }

    pub fn is_probabilistic(&self) -> bool {
        matches!(self, Capability::Probabilistic(_))
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Deterministic(_) => f.write_str("Deterministic"),
            Capability::Probabilistic(_) => f.write_str("Probabilistic"),
        }
    }
}

/// Probability matrix whose columns follow the artifact's class labels.
#[derive(Debug, Clone)]
pub struct ClassProbabilities {
    pub class_labels: Vec<String>,
    pub values: Array2<f64>,
}

impl ClassProbabilities {
    /// Scores of one class for every row; a class the model never learned
    /// scores zero.
    pub fn column_for(&self, label: &str) -> Array1<f64> {
        match self.class_labels.iter().position(|l| l == label) {
            Some(idx) => self.values.column(idx).to_owned(),
            None => Array1::zeros(self.values.nrows()),
        }
    }
}

/// A loaded, ready-to-predict model.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    name: String,
    path: PathBuf,
    kind: &'static str,
    feature_names: Vec<String>,
    class_labels: Vec<String>,
    scaler: Option<StandardScaler>,
    capability: Capability,
}

impl ModelArtifact {
    /// Read, decode and validate the artifact at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading model artifact from {:?}", path);

        let format = ArtifactFormat::from_path(path)
            .ok_or_else(|| EvalError::model_load(path, "unrecognised artifact extension"))?;
        let bytes = std::fs::read(path).map_err(|e| EvalError::model_load(path, e))?;
        let envelope: ArtifactEnvelope = match format {
            ArtifactFormat::Json => {
                serde_json::from_slice(&bytes).map_err(|e| EvalError::model_load(path, e))?
            }
            ArtifactFormat::Binary => {
                bincode::deserialize(&bytes).map_err(|e| EvalError::model_load(path, e))?
            }
        };

        let name = envelope
            .name
            .clone()
            .unwrap_or_else(|| model_name_from_path(path));
        let artifact = Self::from_envelope(name, path, envelope)?;
        debug!(
            "Loaded {} '{}' ({:?}, {} features, {} classes)",
            artifact.kind,
            artifact.name,
            artifact.capability,
            artifact.feature_names.len(),
            artifact.class_labels.len()
        );
        Ok(artifact)
    }

    /// Build an artifact from an in-memory envelope.
    pub fn from_envelope(name: String, path: &Path, envelope: ArtifactEnvelope) -> Result<Self> {
        check_model_name(&name).map_err(|reason| EvalError::model_load(path, reason))?;
        envelope
            .validate()
            .map_err(|reason| EvalError::model_load(path, reason))?;

        let kind = envelope.estimator.kind();
        let capability =
            Capability::from_estimator(envelope.estimator, envelope.supports_probability);
        Ok(Self {
            name,
            path: path.to_path_buf(),
            kind,
            feature_names: envelope.feature_names,
            class_labels: envelope.class_labels,
            scaler: envelope.scaler,
            capability,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn class_labels(&self) -> &[String] {
        &self.class_labels
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    fn prepare(&self, table: &FeatureTable) -> Result<Array2<f64>> {
        let x = table.project(&self.feature_names)?;
        Ok(match &self.scaler {
            Some(scaler) => scaler.transform(x),
            None => x,
        })
    }

    /// Predicted label for every row of `table`.
    pub fn predict(&self, table: &FeatureTable) -> Result<Vec<String>> {
        let x = self.prepare(table)?;
        let indices = match &self.capability {
            Capability::Deterministic(model) => model.predict(x.view()),
            Capability::Probabilistic(model) => model.predict(x.view()),
        };
        indices
            .iter()
            .map(|&idx| {
                self.class_labels.get(idx).cloned().ok_or_else(|| {
                    EvalError::Prediction(format!("class index {idx} outside label list"))
                })
            })
            .collect()
    }

    /// Class probabilities, or `None` for deterministic models.
    pub fn predict_proba(&self, table: &FeatureTable) -> Result<Option<ClassProbabilities>> {
        let model = match &self.capability {
            Capability::Deterministic(_) => return Ok(None),
            Capability::Probabilistic(model) => model,
        };
        let x = self.prepare(table)?;
        let values = model.predict_proba(x.view());
        Ok(Some(ClassProbabilities {
            class_labels: self.class_labels.clone(),
            values,
        }))
    }
}
