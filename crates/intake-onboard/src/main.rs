mod bootstrap_helpers;
mod onboarding_runtime;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use intake_cli::Cli;

use crate::bootstrap_helpers::init_tracing;
use crate::onboarding_runtime::run_cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    run_cli(cli).await
}
