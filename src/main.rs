//! NISMon CLI
//!
//! Subcommands:
//! - `batch`: evaluate every artifact in the models directory
//! - `evaluate`: evaluate one artifact
//!
//! Exit codes: 0 success (skipped models included), 1 fatal error,
//! 2 invalid configuration.

use clap::Parser;

use nismon::cli::{init_logging, run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs)?;

    let exit_code = run(cli.command).await;
    std::process::exit(exit_code);
}
