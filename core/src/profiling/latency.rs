//! Inference latency measurement

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::dataset::FeatureTable;
use crate::error::Result;
use crate::model::ModelArtifact;

/// Wall-clock cost of one full-table prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyProfile {
    pub total: Duration,
    pub n_samples: usize,
}

impl LatencyProfile {
    pub fn per_sample(&self) -> Duration {
        if self.n_samples == 0 {
            return Duration::ZERO;
        }
        self.total.div_f64(self.n_samples as f64)
    }

    pub fn per_sample_ms(&self) -> f64 {
        self.per_sample().as_secs_f64() * 1e3
    }
}

/// Labels from the timed prediction together with its latency.
#[derive(Debug, Clone)]
pub struct TimedPrediction {
    pub labels: Vec<String>,
    pub latency: LatencyProfile,
}

/// Warm up on the first `warmup_rows` rows, then time a full-table
/// prediction. The warm-up output is dropped; the timed output is returned
/// for metric computation.
pub fn measure_latency(
    model: &ModelArtifact,
    features: &FeatureTable,
    warmup_rows: usize,
) -> Result<TimedPrediction> {
    let warmup = features.head(warmup_rows);
    let _ = model.predict(&warmup)?;

    let start = Instant::now();
    let labels = model.predict(features)?;
    let total = start.elapsed();

    let latency = LatencyProfile {
        total,
        n_samples: features.n_rows(),
    };
    debug!(
        "{}: {} rows in {:?} ({:.4} ms/sample)",
        model.name(),
        latency.n_samples,
        total,
        latency.per_sample_ms()
    );
    Ok(TimedPrediction { labels, latency })
}

/// [`measure_latency`] on a blocking worker thread.
pub async fn profile_latency(
    model: Arc<ModelArtifact>,
    features: Arc<FeatureTable>,
    warmup_rows: usize,
) -> Result<TimedPrediction> {
    tokio::task::spawn_blocking(move || measure_latency(&model, &features, warmup_rows)).await?
}
