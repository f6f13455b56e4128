//! `oncall-sync` binary.
//!
//! Run `oncall-sync --help` for usage information.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use oncall_sync::{Cli, Config, LogFormat, PagerDutyClient, SlackClient, Syncer};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = format!("{e:#}");
            error!(error = %message, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_cli(cli, |key| std::env::var(key).ok())
        .context("Invalid configuration")?;

    info!(
        pairs = config.mapping.len(),
        mode = ?config.mode,
        interval_secs = ?config.interval.map(|d| d.as_secs()),
        "Starting on-call sync"
    );

    let pagerduty = PagerDutyClient::new(
        &config.pagerduty.token,
        &config.pagerduty.api_url,
        config.request_timeout,
    )?;
    let slack = SlackClient::new(
        &config.slack.token,
        &config.slack.api_url,
        config.request_timeout,
    )?;

    Syncer::new(&pagerduty, &slack, config.mode)
        .run(&config.mapping, config.interval)
        .await?;

    Ok(())
}
