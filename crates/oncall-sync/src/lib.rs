//! Sync `PagerDuty` on-call state into Slack user groups.
//!
//! For every configured pair of escalation policy and Slack user group
//! handle, the syncer finds who is level-1 on-call right now, looks that
//! person up in Slack by email and makes them the only member of the group.
//!
//! # Usage
//!
//! ```no_run
//! use oncall_sync::{Config, PagerDutyClient, SlackClient, Syncer};
//!
//! # async fn example(config: Config) -> anyhow::Result<()> {
//! let pagerduty = PagerDutyClient::new(
//!     &config.pagerduty.token,
//!     &config.pagerduty.api_url,
//!     config.request_timeout,
//! )?;
//! let slack = SlackClient::new(&config.slack.token, &config.slack.api_url, config.request_timeout)?;
//!
//! Syncer::new(&pagerduty, &slack, config.mode)
//!     .run(&config.mapping, config.interval)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`OnCallDirectory`] and [`ChatDirectory`] abstract the two services
//! - [`resolve`] turns names into IDs, keeping the last match on duplicates
//! - [`Syncer`] runs cycles and decides which errors are fatal

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod directory;
pub mod error;
mod http;
pub mod mapping;
pub mod pagerduty;
pub mod resolve;
pub mod slack;
pub mod sync;

pub use config::{Cli, Config, LogFormat};
pub use directory::{ChatDirectory, OnCallDirectory};
pub use error::{ApiError, ConfigError, SyncError};
pub use mapping::{MappingSource, SyncMapping};
pub use pagerduty::PagerDutyClient;
pub use slack::SlackClient;
pub use sync::{CycleReport, SyncMode, SyncOutcome, Syncer};
