//! Chatwire CLI entry point.

use std::process::ExitCode;

use anyhow::Result;
use chatwire_cli::{Cli, init_logging, run};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let _logging = init_logging(&cli.logging)?;

    let report = run(cli).await?;
    if report.interrupted {
        return Ok(ExitCode::from(130));
    }
    if report.last_failed() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
