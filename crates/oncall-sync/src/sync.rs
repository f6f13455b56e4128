//! Sync loop controller.
//!
//! One cycle walks the mapping pair by pair: resolve the level-1 on-call
//! email, resolve the Slack user and user group, then replace the group's
//! membership (or log the intent in dry-run mode). Fatal errors stop the
//! loop; everything else is logged and the cycle moves on to the next pair.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::directory::{ChatDirectory, OnCallDirectory};
use crate::error::SyncError;
use crate::mapping::SyncMapping;
use crate::resolve::{find_on_call_email, get_user_group_id, get_user_id};

/// Whether membership updates are applied or only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Replace user group membership
    #[default]
    Apply,
    /// Log intended updates without calling the chat service
    DryRun,
}

/// Result of syncing one pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Membership was replaced
    Applied {
        user_id: String,
        user_group_id: String,
    },
    /// Membership update was only logged
    DryRun {
        user_id: String,
        user_group_id: String,
    },
    /// Pair was skipped after a non-fatal error
    Skipped { reason: String },
}

/// Outcome of one pair within a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairReport {
    pub escalation_policy: String,
    pub user_group_handle: String,
    pub outcome: SyncOutcome,
}

/// Outcomes of one full pass over the mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub pairs: Vec<PairReport>,
}

impl CycleReport {
    #[must_use]
    pub fn applied(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::Applied { .. }))
    }

    #[must_use]
    pub fn dry_run(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::DryRun { .. }))
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::Skipped { .. }))
    }

    fn count(&self, pred: impl Fn(&SyncOutcome) -> bool) -> usize {
        self.pairs.iter().filter(|p| pred(&p.outcome)).count()
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} applied, {} dry-run, {} skipped",
            self.applied(),
            self.dry_run(),
            self.skipped()
        )
    }
}

/// Drives sync cycles against an on-call directory and a chat directory.
pub struct Syncer<'a> {
    on_call: &'a dyn OnCallDirectory,
    chat: &'a dyn ChatDirectory,
    mode: SyncMode,
}

impl<'a> Syncer<'a> {
    #[must_use]
    pub fn new(
        on_call: &'a dyn OnCallDirectory,
        chat: &'a dyn ChatDirectory,
        mode: SyncMode,
    ) -> Self {
        Self {
            on_call,
            chat,
            mode,
        }
    }

    /// Sync one escalation policy to one user group.
    ///
    /// # Errors
    /// Returns every resolution or update failure; the caller decides
    /// whether it is fatal.
    pub async fn sync_pair(
        &self,
        escalation_policy: &str,
        user_group_handle: &str,
    ) -> Result<SyncOutcome, SyncError> {
        info!("Syncing escalation policy and user group");

        let email = find_on_call_email(self.on_call, escalation_policy).await?;

        let user_group_id = get_user_group_id(self.chat, user_group_handle)
            .await?
            .ok_or_else(|| SyncError::UserGroupNotFound {
                handle: user_group_handle.to_string(),
            })?;

        let user_id = get_user_id(self.chat, &email)
            .await?
            .ok_or(SyncError::ChatUserNotFound { email })?;

        match self.mode {
            SyncMode::DryRun => {
                info!(
                    slack_user_id = %user_id,
                    slack_user_group_id = %user_group_id,
                    "Would assign Slack user to user group"
                );
                Ok(SyncOutcome::DryRun {
                    user_id,
                    user_group_id,
                })
            }
            SyncMode::Apply => {
                self.chat
                    .set_user_group_members(&user_group_id, &[user_id.as_str()])
                    .await
                    .map_err(|source| SyncError::Update {
                        user_group_id: user_group_id.clone(),
                        source,
                    })?;
                info!(
                    slack_user_id = %user_id,
                    slack_user_group_id = %user_group_id,
                    "Assigned Slack user to user group"
                );
                Ok(SyncOutcome::Applied {
                    user_id,
                    user_group_id,
                })
            }
        }
    }

    /// Run one pass over the mapping.
    ///
    /// Non-fatal pair errors are logged and recorded as skipped.
    ///
    /// # Errors
    /// Returns the first fatal error; remaining pairs are not processed.
    pub async fn run_cycle(&self, mapping: &SyncMapping) -> Result<CycleReport, SyncError> {
        let mut report = CycleReport::default();

        for (escalation_policy, user_group_handle) in mapping.iter() {
            let span = info_span!("sync", escalation_policy, user_group = user_group_handle);

            let outcome = match self
                .sync_pair(escalation_policy, user_group_handle)
                .instrument(span.clone())
                .await
            {
                Ok(outcome) => outcome,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    span.in_scope(|| warn!(error = %e, "Skipping pair"));
                    SyncOutcome::Skipped {
                        reason: e.to_string(),
                    }
                }
            };

            report.pairs.push(PairReport {
                escalation_policy: escalation_policy.to_string(),
                user_group_handle: user_group_handle.to_string(),
                outcome,
            });
        }

        info!(summary = %report, "Sync cycle complete");

        Ok(report)
    }

    /// Run cycles until a fatal error, sleeping `interval` between them.
    ///
    /// With no interval a single cycle runs and the call returns.
    ///
    /// # Errors
    /// Returns the first fatal error.
    pub async fn run(
        &self,
        mapping: &SyncMapping,
        interval: Option<Duration>,
    ) -> Result<(), SyncError> {
        loop {
            self.run_cycle(mapping).await?;

            let Some(interval) = interval else {
                return Ok(());
            };

            debug!(interval_secs = interval.as_secs(), "Sleeping until next sync");
            tokio::time::sleep(interval).await;
        }
    }
}
