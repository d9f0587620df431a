//! CLI module
//!
//! Provides:
//! - Argument parsing (`batch` and `evaluate` subcommands)
//! - Configuration merge (defaults, config file, flags)
//! - Logging bootstrap
//! - Dispatch and exit codes

pub mod args;
pub mod dispatch;
pub mod logging;

// Re-exports
pub use args::{Cli, Command, EvalArgs};
pub use dispatch::{format_summary, run, ExitCode};
pub use logging::init_logging;

use nismon_core::EvalError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Evaluation(#[from] EvalError),
}

impl Error {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Error::Config(_) | Error::Evaluation(EvalError::Config(_)) => EXIT_CONFIG_ERROR,
            Error::Evaluation(_) => EXIT_FAILURE,
        }
    }
}

/// Exit codes (deterministic)
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, Error>;
