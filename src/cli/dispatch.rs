//! Subcommand dispatch
//!
//! Resolves the configuration, runs the evaluation and prints the outcome
//! to stdout. Returns the process exit code.

use std::fmt::Write as _;
use std::path::Path;

use nismon_core::{BatchOrchestrator, BatchSummary, EvaluationConfig, MetricsRecord};
use tracing::error;

use crate::cli::{Command, Error, Result, EXIT_SUCCESS};

/// Exit code wrapper for CLI operations
pub type ExitCode = i32;

/// Run `command` and map the outcome to an exit code.
///
/// A batch where some models were skipped still succeeds.
pub async fn run(command: Command) -> ExitCode {
    let config = match command.options().resolve_config() {
        Ok(config) => config,
        Err(e) => return report_error(e),
    };

    let outcome = match &command {
        Command::Batch(_) => run_batch(config).await,
        Command::Evaluate { model, .. } => run_single(config, model).await,
    };
    match outcome {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => report_error(e),
    }
}

fn report_error(e: Error) -> ExitCode {
    error!("{}", e);
    eprintln!("Error: {}", e);
    e.exit_code()
}

async fn run_batch(config: EvaluationConfig) -> Result<()> {
    let orchestrator = BatchOrchestrator::new(config)?;
    let summary = orchestrator.run().await?;
    print!("{}", format_summary(&summary));
    Ok(())
}

async fn run_single(config: EvaluationConfig, model: &Path) -> Result<()> {
    let orchestrator = BatchOrchestrator::new(config)?;
    let record = orchestrator.evaluate_single(model).await?;
    println!("{}", format_record(&record));
    println!("Reports written to {}", orchestrator.writer().output_dir().display());
    Ok(())
}

fn format_record(record: &MetricsRecord) -> String {
    let unavailable = |value: Option<f64>| {
        value
            .map(|v| format!("{v:.1}"))
            .unwrap_or_else(|| "unavailable".to_string())
    };
    format!(
        "{}: accuracy={:.4} f1_macro={:.4} latency_ms={:.4} mem_overhead_MiB={} cpu_avg_pct={}",
        record.model,
        record.classification.accuracy,
        record.classification.f1_macro,
        record.latency_ms,
        unavailable(record.mem_overhead_mib),
        unavailable(record.cpu_avg_pct)
    )
}

/// Human-readable batch outcome: one line per model, then the table path.
pub fn format_summary(summary: &BatchSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Run {}: {} models, {} succeeded, {} failed",
        summary.run_id,
        summary.total(),
        summary.succeeded.len(),
        summary.failed.len()
    );
    for record in &summary.succeeded {
        let _ = writeln!(out, "  ok    {}", format_record(record));
    }
    for failure in &summary.failed {
        let _ = writeln!(out, "  FAIL  {}: {}", failure.model, failure.error);
    }
    let _ = writeln!(out, "Summary table saved to {}", summary.tradeoff_path.display());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use nismon_core::{ClassificationMetrics, LabelUniverse, ModelFailure};
    use std::path::PathBuf;
    use uuid::Uuid;

    fn record(model: &str, cpu: Option<f64>) -> MetricsRecord {
        let y: Vec<String> = vec!["a".into(), "b".into()];
        let universe = LabelUniverse::from_labels(y.iter().cloned());
        let (_, classification) = ClassificationMetrics::compute(&universe, &y, &y).unwrap();
        MetricsRecord {
            model: model.to_string(),
            classification,
            latency_ms: 0.25,
            mem_overhead_mib: Some(2.0),
            cpu_avg_pct: cpu,
            per_class: None,
        }
    }

    #[test]
    fn test_format_record_without_cpu() {
        let line = format_record(&record("svm", None));
        assert!(line.starts_with("svm: accuracy=1.0000"));
        assert!(line.contains("mem_overhead_MiB=2.0"));
        assert!(line.ends_with("cpu_avg_pct=unavailable"));

        let mut without_memory = record("svm", Some(5.0));
        without_memory.mem_overhead_mib = None;
        let line = format_record(&without_memory);
        assert!(line.contains("mem_overhead_MiB=unavailable cpu_avg_pct=5.0"));
    }

    #[test]
    fn test_format_summary_lists_failures() {
        let summary = BatchSummary {
            run_id: Uuid::nil(),
            succeeded: vec![record("rf", Some(42.0))],
            failed: vec![ModelFailure {
                model: "broken".to_string(),
                path: PathBuf::from("broken.model.json"),
                error: "Failed to load model artifact".to_string(),
            }],
            tradeoff_path: PathBuf::from("out/tradeoff_metrics_summary.csv"),
        };

        let text = format_summary(&summary);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], format!("Run {}: 2 models, 1 succeeded, 1 failed", Uuid::nil()));
        assert!(lines[1].contains("rf: accuracy=1.0000") && lines[1].ends_with("cpu_avg_pct=42.0"));
        assert_eq!(lines[2], "  FAIL  broken: Failed to load model artifact");
        assert_eq!(lines[3], "Summary table saved to out/tradeoff_metrics_summary.csv");
    }
}
