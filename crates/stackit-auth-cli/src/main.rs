mod cli;
mod commands;
mod config;
mod error;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use config::CliConfig;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so `token` output stays pipeable.
    let default_filter = if cli.verbose {
        "warn,stackit_auth_core=debug,stackit_auth=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => error::handle_error(err),
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => CliConfig::load_from_path(Some(path.clone())),
        None => CliConfig::load(),
    };
    commands::run(cli, config).await
}
