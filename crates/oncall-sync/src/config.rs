//! Command line and environment configuration.
//!
//! Flags fall back to `ONCALL_SYNC_*` environment variables. The API tokens
//! are only read from the environment:
//!
//! - `PD_TOKEN`: `PagerDuty` REST API token
//! - `SLACK_TOKEN`: Slack token with `usergroups:write` and `users:read.email`

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{Parser, ValueEnum};

use crate::error::ConfigError;
use crate::mapping::{MappingSource, SyncMapping};
use crate::sync::SyncMode;
use crate::{pagerduty, slack};

/// Default per-request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Sync the current `PagerDuty` level-1 on-call into Slack user groups.
#[derive(Debug, Parser)]
#[command(name = "oncall-sync")]
#[command(version)]
pub struct Cli {
    /// CSV file with one `escalation policy,user group handle` row per line
    #[arg(long, env = "ONCALL_SYNC_MAP_FILE", value_name = "PATH")]
    pub map_file: Option<PathBuf>,

    /// Inline mapping: `policy1:handle1,policy2:handle2`
    #[arg(long, env = "ONCALL_SYNC_MAP", value_name = "PAIRS")]
    pub map: Option<String>,

    /// Only log the updates that would be made
    #[arg(
        long,
        visible_alias = "noop",
        env = "ONCALL_SYNC_DRY_RUN",
        value_parser = BoolishValueParser::new()
    )]
    pub dry_run: bool,

    /// Enable debug logging
    #[arg(short, long, visible_alias = "debug")]
    pub verbose: bool,

    /// Seconds to wait between sync cycles; negative runs once
    #[arg(
        long,
        env = "ONCALL_SYNC_INTERVAL",
        default_value_t = -1,
        allow_negative_numbers = true,
        value_name = "SECS"
    )]
    pub interval: i64,

    /// Log output format
    #[arg(long, env = "ONCALL_SYNC_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Timeout for each API request in seconds
    #[arg(
        long,
        env = "ONCALL_SYNC_REQUEST_TIMEOUT",
        default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS,
        value_name = "SECS"
    )]
    pub request_timeout: u64,

    /// `PagerDuty` REST API base URL
    #[arg(long, env = "PAGERDUTY_API_URL", default_value = pagerduty::DEFAULT_API_URL, hide = true)]
    pub pagerduty_api_url: String,

    /// Slack Web API base URL
    #[arg(long, env = "SLACK_API_URL", default_value = slack::DEFAULT_API_URL, hide = true)]
    pub slack_api_url: String,
}

/// Connection settings for one external service.
#[derive(Clone)]
pub struct ServiceConfig {
    pub token: String,
    pub api_url: String,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub mapping: SyncMapping,
    pub mode: SyncMode,
    /// Delay between cycles, `None` to run once
    pub interval: Option<Duration>,
    pub request_timeout: Duration,
    pub pagerduty: ServiceConfig,
    pub slack: ServiceConfig,
}

impl Config {
    /// Validate CLI arguments and read credentials through `env`.
    ///
    /// The mapping is loaded before the credentials are checked. Nothing
    /// here touches the network.
    ///
    /// # Errors
    /// Returns error if the mapping is missing or malformed, or a token is
    /// absent.
    pub fn from_cli(
        cli: Cli,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let source = MappingSource::from_options(cli.map_file, cli.map)?;
        let mapping = SyncMapping::load(&source)?;

        if cli.request_timeout == 0 {
            return Err(ConfigError::Invalid {
                name: "--request-timeout",
                reason: "must be at least 1 second".to_string(),
            });
        }

        Ok(Self {
            mapping,
            mode: if cli.dry_run {
                SyncMode::DryRun
            } else {
                SyncMode::Apply
            },
            interval: interval_from_secs(cli.interval),
            request_timeout: Duration::from_secs(cli.request_timeout),
            pagerduty: ServiceConfig {
                token: required(&env, pagerduty::ENV_PAGERDUTY_TOKEN)?,
                api_url: cli.pagerduty_api_url,
            },
            slack: ServiceConfig {
                token: required(&env, slack::ENV_SLACK_TOKEN)?,
                api_url: cli.slack_api_url,
            },
        })
    }
}

/// Negative intervals mean run once.
#[must_use]
pub fn interval_from_secs(secs: i64) -> Option<Duration> {
    u64::try_from(secs).ok().map(Duration::from_secs)
}

fn required(
    env: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<String, ConfigError> {
    env(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingCredential(key))
}
