//! Latency and resource profiling of model predictions

pub mod latency;
pub mod resource;

pub use latency::{measure_latency, profile_latency, LatencyProfile, TimedPrediction};
pub use resource::{
    profile_prediction, profile_resources, spawn_cpu_sampler, CpuSamples, CpuStats,
    CpuReading, CpuSampler, ProcessMonitor, ResourceProfile,
};
