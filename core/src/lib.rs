//! NISMon Core
//!
//! Evaluation harness for trained fault-detection classifiers. It loads a
//! labeled telemetry test set and a directory of model artifacts, measures
//! inference latency, samples CPU and memory while a prediction runs, and
//! writes per-model reports plus a cross-model trade-off table.

pub mod batch;
pub mod config;
pub mod dataset;
pub mod error;
pub mod metrics;
pub mod model;
pub mod profiling;
pub mod report;

pub use batch::{
    discover_artifacts, BatchOrchestrator, BatchSummary, EvaluationInput, ModelEvaluation,
    ModelFailure,
};
pub use config::{ConfigFormat, EvaluationConfig};
pub use dataset::{load_test_dataset, FeatureTable, LabelUniverse, TestDataset};
pub use error::{EvalError, Result};
pub use metrics::{ClassScore, ClassificationMetrics, ConfusionMatrix, MetricsRecord};
pub use model::{ArtifactEnvelope, Capability, ModelArtifact};
pub use report::ReportWriter;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
