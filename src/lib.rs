//! NISMon: model evaluation harness for telemetry fault detection
//!
//! The binary is a thin layer over `nismon-core`; this library exposes the
//! command-line wiring so it can be tested directly.

pub mod cli;
