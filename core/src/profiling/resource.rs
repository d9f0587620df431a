//! CPU and memory profiling around a prediction run
//!
//! The profile window opens only after the baseline memory reading is taken
//! and the CPU sampler has done its baseline refresh. The workload is handed
//! to a blocking thread after that point. When the workload returns, the
//! sampler is cancelled and joined; its readings are only handed back
//! through the join, so nothing reads them while they can still grow.
//!
//! Process counters are best effort. If the current process cannot be
//! observed, memory and CPU figures are reported as unavailable and the
//! workload result is still returned.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sysinfo::{Pid, System};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dataset::FeatureTable;
use crate::error::{EvalError, Result};
use crate::model::ModelArtifact;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Handle on the current process's resource counters.
pub struct ProcessMonitor {
    system: System,
    pid: Pid,
}

impl ProcessMonitor {
    /// `None` when the platform cannot identify the current process.
    pub fn current() -> Option<Self> {
        match sysinfo::get_current_pid() {
            Ok(pid) => {
                let mut system = System::new();
                system.refresh_process(pid);
                Some(Self { system, pid })
            }
            Err(e) => {
                warn!("Process counters unavailable: {}", e);
                None
            }
        }
    }

    /// Resident set size in MiB.
    pub fn resident_mib(&mut self) -> Option<f64> {
        self.system.refresh_process(self.pid);
        self.system
            .process(self.pid)
            .map(|process| process.memory() as f64 / BYTES_PER_MIB)
    }

    /// CPU percentage used since the previous refresh.
    pub fn cpu_percent(&mut self) -> Option<f32> {
        self.system.refresh_process(self.pid);
        self.system.process(self.pid).map(|process| process.cpu_usage())
    }
}

/// One CPU reading and when it was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuReading {
    pub taken_at: Instant,
    pub percent: f32,
}

impl CpuReading {
    pub fn now(percent: f32) -> Self {
        Self {
            taken_at: Instant::now(),
            percent,
        }
    }
}

/// CPU readings collected during one profiling window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuSamples(Vec<CpuReading>);

impl CpuSamples {
    pub fn new(readings: Vec<CpuReading>) -> Self {
        Self(readings)
    }

    pub fn readings(&self) -> &[CpuReading] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Min/avg/max over the readings; `EmptySample` when there are none.
    pub fn stats(&self) -> Result<CpuStats> {
        if self.0.is_empty() {
            return Err(EvalError::EmptySample);
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for reading in &self.0 {
            let value = f64::from(reading.percent);
            min = min.min(value);
            max = max.max(value);
            sum += value;
        }
        Ok(CpuStats {
            min,
            avg: sum / self.0.len() as f64,
            max,
            count: self.0.len(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuStats {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub count: usize,
}

/// Memory delta and CPU profile of one prediction run.
#[derive(Debug, Clone)]
pub struct ResourceProfile {
    /// `None` when the process counters could not be read.
    pub mem_before_mib: Option<f64>,
    pub mem_after_mib: Option<f64>,
    /// When the window opened; the workload never starts earlier.
    pub started_at: Instant,
    pub window: Duration,
    pub cpu_samples: CpuSamples,
    /// `None` when the window closed before a single reading was taken.
    pub cpu: Option<CpuStats>,
}

impl ResourceProfile {
    pub fn mem_overhead_mib(&self) -> Option<f64> {
        Some(self.mem_after_mib? - self.mem_before_mib?)
    }
}

/// Background CPU sampling task.
pub struct CpuSampler {
    ready: Option<oneshot::Receiver<()>>,
    handle: JoinHandle<CpuSamples>,
}

impl CpuSampler {
    fn start(monitor: Option<ProcessMonitor>, interval: Duration, token: CancellationToken) -> Self {
        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let Some(mut monitor) = monitor else {
                return CpuSamples::default();
            };
            // Baseline refresh; usage is measured between consecutive refreshes.
            monitor.cpu_percent();
            let _ = ready_tx.send(());

            let mut readings = Vec::new();
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        if let Some(percent) = monitor.cpu_percent() {
                            readings.push(CpuReading::now(percent));
                        }
                    }
                }
            }
            CpuSamples::new(readings)
        });
        Self {
            ready: Some(ready_rx),
            handle,
        }
    }

    /// Resolves once the baseline refresh is done, or at once when the
    /// sampler has nothing to observe.
    pub async fn ready(&mut self) {
        if let Some(ready) = self.ready.take() {
            let _ = ready.await;
        }
    }

    /// Wait for the task to stop and take its readings.
    pub async fn join(self) -> Result<CpuSamples> {
        Ok(self.handle.await?)
    }
}

/// Sample process CPU every `interval` until `token` is cancelled.
///
/// Readings are pushed only for completed intervals.
pub fn spawn_cpu_sampler(interval: Duration, token: CancellationToken) -> CpuSampler {
    CpuSampler::start(ProcessMonitor::current(), interval, token)
}

/// Run `workload` on a blocking thread while sampling CPU in the background.
pub async fn profile_resources<F, T>(interval: Duration, workload: F) -> Result<(T, ResourceProfile)>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    profile_with(interval, ProcessMonitor::current, workload).await
}

async fn profile_with<F, T>(
    interval: Duration,
    open_monitor: fn() -> Option<ProcessMonitor>,
    workload: F,
) -> Result<(T, ResourceProfile)>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let mut monitor = open_monitor();
    let mem_before_mib = monitor.as_mut().and_then(ProcessMonitor::resident_mib);

    let token = CancellationToken::new();
    let mut sampler = CpuSampler::start(open_monitor(), interval, token.clone());
    sampler.ready().await;

    let started_at = Instant::now();
    let outcome = tokio::task::spawn_blocking(workload).await;
    let window = started_at.elapsed();

    // Stop and join the sampler before touching its readings, even when the
    // run failed.
    token.cancel();
    let cpu_samples = sampler.join().await?;

    let output = outcome??;
    let mem_after_mib = monitor.as_mut().and_then(ProcessMonitor::resident_mib);

    let cpu = match cpu_samples.stats() {
        Ok(stats) => Some(stats),
        Err(EvalError::EmptySample) => {
            warn!(
                "No CPU readings within {:?} (interval {:?}); CPU stats unavailable",
                window, interval
            );
            None
        }
        Err(e) => return Err(e),
    };
    debug!(
        "Profiling window {:?}: {} CPU samples, memory {:?} -> {:?} MiB",
        window,
        cpu_samples.len(),
        mem_before_mib,
        mem_after_mib
    );

    Ok((
        output,
        ResourceProfile {
            mem_before_mib,
            mem_after_mib,
            started_at,
            window,
            cpu_samples,
            cpu,
        },
    ))
}

/// Profile a full-table prediction of `model`; the predicted labels are
/// discarded.
pub async fn profile_prediction(
    model: Arc<ModelArtifact>,
    features: Arc<FeatureTable>,
    interval: Duration,
) -> Result<ResourceProfile> {
    let ((), profile) = profile_resources(interval, move || {
        model.predict(&features).map(|_| ())
    })
    .await?;
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_samples_have_no_stats() {
        let samples = CpuSamples::default();
        assert!(samples.is_empty());
        assert!(matches!(samples.stats(), Err(EvalError::EmptySample)));
    }

    #[test]
    fn test_cpu_stats() {
        let samples = CpuSamples::new(vec![
            CpuReading::now(10.0),
            CpuReading::now(30.0),
            CpuReading::now(20.0),
        ]);
        let stats = samples.stats().unwrap();
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 30.0);
        assert!((stats.avg - 20.0).abs() < 1e-9);
        assert_eq!(stats.count, 3);
    }

    #[tokio::test]
    async fn test_window_shorter_than_interval_reports_unavailable() {
        let (value, profile) = profile_resources(Duration::from_secs(5), || Ok(42))
            .await
            .expect("profiling should succeed");

        assert_eq!(value, 42);
        assert!(profile.cpu_samples.is_empty());
        assert!(profile.cpu.is_none());
        assert!(profile.mem_before_mib.is_some());
        assert!(profile.mem_overhead_mib().is_some());
    }

    #[tokio::test]
    async fn test_workload_starts_inside_window() {
        let (workload_start, profile) = profile_resources(Duration::from_millis(1), || Ok(Instant::now()))
            .await
            .expect("profiling should succeed");

        assert!(workload_start >= profile.started_at);
        assert!(workload_start - profile.started_at <= profile.window);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sampler_collects_during_long_run() {
        let (_, profile) = profile_resources(Duration::from_millis(5), || {
            std::thread::sleep(Duration::from_millis(120));
            Ok(())
        })
        .await
        .expect("profiling should succeed");

        assert!(profile.window >= Duration::from_millis(120));
        assert!(!profile.cpu_samples.is_empty());
        let stats = profile.cpu.expect("stats should be present");
        assert!(stats.min <= stats.avg && stats.avg <= stats.max);
        assert_eq!(stats.count, profile.cpu_samples.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_readings_overlap_running_workload() {
        let busy_for = Duration::from_millis(150);
        let ((started, finished), profile) = profile_resources(Duration::from_millis(5), move || {
            let started = Instant::now();
            std::thread::sleep(busy_for);
            Ok((started, Instant::now()))
        })
        .await
        .expect("profiling should succeed");

        assert!(started >= profile.started_at);
        let during_run = profile
            .cpu_samples
            .readings()
            .iter()
            .filter(|r| r.taken_at >= started && r.taken_at <= finished)
            .count();
        assert!(during_run >= 1, "no reading taken while the workload ran");
    }

    #[tokio::test]
    async fn test_cancel_stops_sampler() {
        let token = CancellationToken::new();
        let mut sampler = spawn_cpu_sampler(Duration::from_secs(3600), token.clone());
        sampler.ready().await;
        token.cancel();

        let samples = tokio::time::timeout(Duration::from_secs(5), sampler.join())
            .await
            .expect("sampler should stop once cancelled")
            .expect("sampler should join");
        // The hour-long interval never completed.
        assert!(samples.is_empty());
    }

    #[tokio::test]
    async fn test_unobservable_process_degrades_to_unavailable() {
        let (value, profile) = profile_with(Duration::from_millis(1), || None, || Ok(7))
            .await
            .expect("missing process counters must not fail the run");

        assert_eq!(value, 7);
        assert_eq!(profile.mem_before_mib, None);
        assert_eq!(profile.mem_after_mib, None);
        assert_eq!(profile.mem_overhead_mib(), None);
        assert!(profile.cpu_samples.is_empty());
        assert!(profile.cpu.is_none());
    }

    #[tokio::test]
    async fn test_failed_run_still_joins_sampler() {
        let result: Result<((), ResourceProfile)> =
            profile_resources(Duration::from_millis(1), || {
                Err(EvalError::Prediction("schema".to_string()))
            })
            .await;
        assert!(matches!(result, Err(EvalError::Prediction(_))));
    }
}
