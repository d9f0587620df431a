//! Evaluation harness errors

use std::io;
use std::path::PathBuf;

/// Errors raised while evaluating model artifacts.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("Failed to load test data: {0}")]
    DataLoad(String),

    #[error("Failed to load model artifact '{}': {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("Prediction failed: {0}")]
    Prediction(String),

    #[error("CPU sampler produced no readings within the profiling window")]
    EmptySample,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to write report: {0}")]
    Report(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl EvalError {
    pub(crate) fn model_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        EvalError::ModelLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors that only invalidate the current model; a batch skips the
    /// model and keeps going.
    pub fn is_model_scoped(&self) -> bool {
        matches!(
            self,
            EvalError::ModelLoad { .. } | EvalError::Prediction(_) | EvalError::Task(_)
        )
    }
}

impl From<polars::prelude::PolarsError> for EvalError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        EvalError::Report(err.to_string())
    }
}

impl From<tokio::task::JoinError> for EvalError {
    fn from(err: tokio::task::JoinError) -> Self {
        EvalError::Task(err.to_string())
    }
}

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, EvalError>;
