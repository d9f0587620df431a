//! CLI argument parsing
//!
//! ```text
//! nismon [--log-level LEVEL] [--json-logs] batch    [options]
//! nismon [--log-level LEVEL] [--json-logs] evaluate --model FILE [options]
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use nismon_core::EvaluationConfig;

use crate::cli::{Error, Result};

#[derive(Debug, Parser)]
#[command(
    name = "nismon",
    version,
    about = "Evaluate fault-detection models with latency and resource profiling"
)]
pub struct Cli {
    /// Default log filter; RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info", env = "NISMON_LOG_LEVEL")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Evaluate every artifact in the models directory
    Batch(EvalArgs),
    /// Evaluate a single artifact
    Evaluate {
        /// Path to the model artifact
        #[arg(long)]
        model: PathBuf,
        #[command(flatten)]
        options: EvalArgs,
    },
}

impl Command {
    pub fn options(&self) -> &EvalArgs {
        match self {
            Command::Batch(options) => options,
            Command::Evaluate { options, .. } => options,
        }
    }
}

/// Options shared by both subcommands; each overrides the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct EvalArgs {
    /// Configuration file (.toml or .json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Labeled test CSV
    #[arg(long)]
    pub test_csv: Option<PathBuf>,

    /// Directory scanned for model artifacts
    #[arg(long)]
    pub models_dir: Option<PathBuf>,

    /// Directory receiving the reports
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// CPU sampling interval in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Rows used by the warm-up prediction
    #[arg(long)]
    pub warmup_rows: Option<usize>,

    /// Skip ROC / precision-recall curve tables
    #[arg(long)]
    pub no_curves: bool,
}

impl EvalArgs {
    /// Defaults, then the config file, then command-line flags.
    pub fn resolve_config(&self) -> Result<EvaluationConfig> {
        let mut config = match &self.config {
            Some(path) => EvaluationConfig::from_file(path).map_err(|e| Error::Config(e.to_string()))?,
            None => EvaluationConfig::default(),
        };

        if let Some(path) = &self.test_csv {
            config.test_csv = path.clone();
        }
        if let Some(dir) = &self.models_dir {
            config.models_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(ms) = self.interval_ms {
            config.sample_interval_ms = ms;
        }
        if let Some(rows) = self.warmup_rows {
            config.warmup_rows = rows;
        }
        if self.no_curves {
            config.write_curves = false;
        }

        config.validate().map_err(|e| Error::Config(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_batch_with_overrides() {
        let cli = Cli::try_parse_from([
            "nismon",
            "--log-level",
            "debug",
            "batch",
            "--models-dir",
            "models",
            "--interval-ms",
            "25",
            "--no-curves",
        ])
        .unwrap();

        assert_eq!(cli.log_level, "debug");
        assert!(!cli.json_logs);
        let config = cli.command.options().resolve_config().unwrap();
        assert_eq!(config.models_dir, PathBuf::from("models"));
        assert_eq!(config.sample_interval_ms, 25);
        assert!(!config.write_curves);
        assert_eq!(config.warmup_rows, 10);
    }

    #[test]
    fn test_evaluate_requires_model() {
        assert!(Cli::try_parse_from(["nismon", "evaluate"]).is_err());

        let cli = Cli::try_parse_from(["nismon", "evaluate", "--model", "rf.model.json"]).unwrap();
        match cli.command {
            Command::Evaluate { model, .. } => assert_eq!(model, PathBuf::from("rf.model.json")),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_flags_override_config_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("nismon.toml");
        fs::write(&path, "warmup_rows = 50\nsample_interval_ms = 20\n").unwrap();

        let args = EvalArgs {
            config: Some(path),
            interval_ms: Some(5),
            ..Default::default()
        };
        let config = args.resolve_config().unwrap();
        assert_eq!(config.warmup_rows, 50);
        assert_eq!(config.sample_interval_ms, 5);
    }

    #[test]
    fn test_invalid_override_is_config_error() {
        let args = EvalArgs {
            interval_ms: Some(0),
            ..Default::default()
        };
        let err = args.resolve_config().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.exit_code(), crate::cli::EXIT_CONFIG_ERROR);
    }
}
