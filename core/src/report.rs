//! Report Writer
//!
//! Writes per-model reports and the batch trade-off table into the output
//! directory. Tables go through polars' CSV writer; existing files are
//! overwritten.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::{debug, info};

use crate::error::Result;
use crate::metrics::{ClassCurves, ConfusionMatrix, CurvePoint, MetricsRecord};
use crate::profiling::{LatencyProfile, ResourceProfile};

pub const TRADEOFF_SUMMARY_FILE: &str = "tradeoff_metrics_summary.csv";

/// Writes report files under one output directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    /// Create the output directory if needed.
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn path_for(&self, model: &str, suffix: &str) -> PathBuf {
        self.output_dir.join(format!("{model}_{suffix}"))
    }

    fn write_csv(&self, path: &Path, mut frame: DataFrame) -> Result<()> {
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut frame)?;
        debug!("Wrote {} rows to {:?}", frame.height(), path);
        Ok(())
    }

    /// `<model>_confusion_matrix.csv`: `class` column of `true_<label>` row
    /// names, then one `pred_<label>` column per class (and
    /// `pred_unmatched` when any prediction fell outside the universe).
    pub fn write_confusion_matrix(&self, model: &str, matrix: &ConfusionMatrix) -> Result<PathBuf> {
        let labels = matrix.labels();
        let mut columns = Vec::with_capacity(labels.len() + 2);
        columns.push(Series::new(
            "class",
            labels.iter().map(|l| format!("true_{l}")).collect::<Vec<_>>(),
        ));
        for (col, label) in labels.iter().enumerate() {
            let counts: Vec<u64> = matrix.counts().column(col).to_vec();
            columns.push(Series::new(&format!("pred_{label}"), counts));
        }
        if matrix.has_unmatched() {
            columns.push(Series::new("pred_unmatched", matrix.unmatched().to_vec()));
        }

        let path = self.path_for(model, "confusion_matrix.csv");
        self.write_csv(&path, DataFrame::new(columns)?)?;
        Ok(path)
    }

    /// `<model>_metrics_summary.csv` with `metric,value` rows.
    pub fn write_metrics_summary(&self, record: &MetricsRecord) -> Result<PathBuf> {
        let (keys, values): (Vec<String>, Vec<Option<f64>>) = record.entries().into_iter().unzip();
        let frame = DataFrame::new(vec![Series::new("metric", keys), Series::new("value", values)])?;

        let path = self.path_for(&record.model, "metrics_summary.csv");
        self.write_csv(&path, frame)?;
        Ok(path)
    }

    /// `<model>_latency_resources.txt`, a human-readable profile summary.
    pub fn write_latency_resources(
        &self,
        model: &str,
        latency: &LatencyProfile,
        resources: &ResourceProfile,
    ) -> Result<PathBuf> {
        let cpu = match &resources.cpu {
            Some(stats) => format!("{:.1}/{:.1}/{:.1}", stats.min, stats.avg, stats.max),
            None => "unavailable".to_string(),
        };
        let mib = |value: Option<f64>| match value {
            Some(v) => format!("{v:.1} MiB"),
            None => "unavailable".to_string(),
        };
        let text = format!(
            "Model:                {model}\n\
             Total inference time: {:.4} s for {} samples\n\
             Avg latency/sample:   {:.3} ms\n\
             Memory before:        {}\n\
             Memory after:         {}\n\
             Peak mem overhead:    {}\n\
             CPU% during inference (min/avg/max): {cpu}\n\
             CPU samples:          {} over {:.4} s\n\
             Generated:            {}\n",
            latency.total.as_secs_f64(),
            latency.n_samples,
            latency.per_sample_ms(),
            mib(resources.mem_before_mib),
            mib(resources.mem_after_mib),
            mib(resources.mem_overhead_mib()),
            resources.cpu_samples.len(),
            resources.window.as_secs_f64(),
            chrono::Utc::now().to_rfc3339(),
        );

        let path = self.path_for(model, "latency_resources.txt");
        fs::write(&path, text)?;
        Ok(path)
    }

    /// `<model>_roc_curves.csv` and `<model>_pr_curves.csv` in long format
    /// (`class,x,y,threshold`).
    pub fn write_curves(&self, model: &str, curves: &[ClassCurves]) -> Result<(PathBuf, PathBuf)> {
        let roc_path = self.path_for(model, "roc_curves.csv");
        self.write_csv(&roc_path, curve_frame(curves, |c| &c.roc)?)?;

        let pr_path = self.path_for(model, "pr_curves.csv");
        self.write_csv(&pr_path, curve_frame(curves, |c| &c.pr)?)?;
        Ok((roc_path, pr_path))
    }

    /// `tradeoff_metrics_summary.csv`: one row per model, `model` first,
    /// then every metric key in first-seen order; absent metrics are blank.
    pub fn write_tradeoff_table(&self, records: &[MetricsRecord]) -> Result<PathBuf> {
        let rows: Vec<Vec<(String, Option<f64>)>> = records.iter().map(MetricsRecord::entries).collect();

        let mut keys: Vec<String> = Vec::new();
        for entries in &rows {
            for (key, _) in entries {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }

        let mut columns = vec![Series::new(
            "model",
            records.iter().map(|r| r.model.clone()).collect::<Vec<_>>(),
        )];
        for key in &keys {
            let values: Vec<Option<f64>> = rows
                .iter()
                .map(|entries| entries.iter().find(|(k, _)| k == key).and_then(|(_, v)| *v))
                .collect();
            columns.push(Series::new(key, values));
        }

        let path = self.output_dir.join(TRADEOFF_SUMMARY_FILE);
        self.write_csv(&path, DataFrame::new(columns)?)?;
        info!("Trade-off summary for {} models saved to {:?}", records.len(), path);
        Ok(path)
    }
}

fn curve_frame<F>(curves: &[ClassCurves], select: F) -> Result<DataFrame>
where
    F: Fn(&ClassCurves) -> &Vec<CurvePoint>,
{
    let mut class = Vec::new();
    let mut x = Vec::new();
    let mut y = Vec::new();
    let mut threshold = Vec::new();
    for curve in curves {
        for point in select(curve) {
            class.push(curve.label.clone());
            x.push(point.x);
            y.push(point.y);
            threshold.push(point.threshold);
        }
    }
    Ok(DataFrame::new(vec![
        Series::new("class", class),
        Series::new("x", x),
        Series::new("y", y),
        Series::new("threshold", threshold),
    ])?)
}
