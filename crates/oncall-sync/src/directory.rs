//! Directory abstractions over the incident and chat services.
//!
//! The resolvers and the sync loop only talk to these traits, so they can be
//! driven by the real HTTP clients or by in-memory fakes.

use async_trait::async_trait;

use crate::error::ApiError;

/// One on-call assignment of a user to an escalation policy level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnCallRecord {
    /// Escalation policy summary (its display name)
    pub escalation_policy_summary: String,
    /// Tier within the policy, 1 is the first responder
    pub escalation_level: u32,
    /// Incident service user ID
    pub user_id: String,
}

/// One page of on-call records.
#[derive(Debug, Clone, Default)]
pub struct OnCallPage {
    pub records: Vec<OnCallRecord>,
    /// Whether the service has more records after this page
    pub more: bool,
}

/// Incident service user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnCallUser {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
}

/// Chat service user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub id: String,
    /// Profile email, absent for bots and restricted profiles
    pub email: Option<String>,
}

/// One page of chat users.
#[derive(Debug, Clone, Default)]
pub struct ChatUserPage {
    pub users: Vec<ChatUser>,
    /// Cursor for the next page, `None` on the last page
    pub next_cursor: Option<String>,
}

/// Chat service user group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUserGroup {
    pub id: String,
    pub handle: String,
}

/// Read access to the incident-management service.
#[async_trait]
pub trait OnCallDirectory: Send + Sync {
    /// Fetch one page of current on-call records starting at `offset`.
    async fn on_calls_page(&self, offset: usize) -> Result<OnCallPage, ApiError>;

    /// Look up a user by ID. Returns `None` when the user does not exist.
    async fn user(&self, user_id: &str) -> Result<Option<OnCallUser>, ApiError>;
}

/// Access to the chat service.
#[async_trait]
pub trait ChatDirectory: Send + Sync {
    /// Fetch one page of users. `None` requests the first page.
    async fn users_page(&self, cursor: Option<&str>) -> Result<ChatUserPage, ApiError>;

    /// List all user groups.
    async fn user_groups(&self) -> Result<Vec<ChatUserGroup>, ApiError>;

    /// Replace a user group's membership with exactly `user_ids`.
    async fn set_user_group_members(
        &self,
        user_group_id: &str,
        user_ids: &[&str],
    ) -> Result<(), ApiError>;
}
