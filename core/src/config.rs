//! Evaluation configuration
//!
//! Defaults can be overridden by an optional TOML or JSON file and then by
//! command-line flags.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{EvalError, Result};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Pick the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(ConfigFormat::Json),
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(ConfigFormat::Toml),
            _ => Err(EvalError::Config(format!(
                "Unsupported config format: {}",
                path.display()
            ))),
        }
    }
}

/// Settings recognised by the harness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Labeled test CSV
    pub test_csv: PathBuf,
    /// Directory scanned for model artifacts
    pub models_dir: PathBuf,
    /// Directory receiving all reports
    pub output_dir: PathBuf,
    /// CPU sampling interval in milliseconds
    pub sample_interval_ms: u64,
    /// Rows used by the warm-up prediction
    pub warmup_rows: usize,
    /// Name of the ground-truth column
    pub label_column: String,
    /// Glob matched against file names inside `models_dir`
    pub artifact_glob: String,
    /// Emit ROC / precision-recall curve tables for probabilistic models
    pub write_curves: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            test_csv: PathBuf::from("merged_labeled_Testdata.csv"),
            models_dir: PathBuf::from("."),
            output_dir: PathBuf::from("models_comparison"),
            sample_interval_ms: 10,
            warmup_rows: 10,
            label_column: "label".to_string(),
            artifact_glob: "*.model.*".to_string(),
            write_curves: true,
        }
    }
}

impl EvaluationConfig {
    /// Load a configuration file; fields it omits keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            EvalError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;

        let config: EvaluationConfig = match format {
            ConfigFormat::Json => serde_json::from_str(&content)
                .map_err(|e| EvalError::Config(format!("Failed to parse {}: {e}", path.display())))?,
            ConfigFormat::Toml => toml::from_str(&content)
                .map_err(|e| EvalError::Config(format!("Failed to parse {}: {e}", path.display())))?,
        };

        info!("Loaded evaluation configuration from {:?}", path);
        debug!("Configuration: {:?}", config);
        Ok(config)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.sample_interval_ms == 0 {
            return Err(EvalError::Config(
                "sample_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.warmup_rows == 0 {
            return Err(EvalError::Config(
                "warmup_rows must be greater than 0".to_string(),
            ));
        }
        if self.label_column.trim().is_empty() {
            return Err(EvalError::Config("label_column cannot be empty".to_string()));
        }
        if self.artifact_glob.trim().is_empty() {
            return Err(EvalError::Config("artifact_glob cannot be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = EvaluationConfig::default();
        assert_eq!(config.sample_interval_ms, 10);
        assert_eq!(config.warmup_rows, 10);
        assert_eq!(config.label_column, "label");
        assert_eq!(config.sample_interval(), Duration::from_millis(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EvaluationConfig::default();
        config.sample_interval_ms = 0;
        assert!(matches!(config.validate(), Err(EvalError::Config(_))));

        let mut config = EvaluationConfig::default();
        config.warmup_rows = 0;
        assert!(config.validate().is_err());

        let mut config = EvaluationConfig::default();
        config.label_column = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("eval.toml");
        std::fs::write(
            &path,
            "models_dir = \"artifacts\"\nsample_interval_ms = 25\n",
        )
        .expect("Failed to write config");

        let config = EvaluationConfig::from_file(&path).expect("config should parse");
        assert_eq!(config.models_dir, PathBuf::from("artifacts"));
        assert_eq!(config.sample_interval_ms, 25);
        assert_eq!(config.warmup_rows, 10);
        assert_eq!(config.output_dir, PathBuf::from("models_comparison"));
    }

    #[test]
    fn test_json_config() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("eval.json");
        std::fs::write(&path, r#"{"warmup_rows": 3, "write_curves": false}"#)
            .expect("Failed to write config");

        let config = EvaluationConfig::from_file(&path).expect("config should parse");
        assert_eq!(config.warmup_rows, 3);
        assert!(!config.write_curves);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let err = EvaluationConfig::from_file(Path::new("eval.yaml")).unwrap_err();
        assert!(matches!(err, EvalError::Config(_)));
    }
}
