//! Slack Web API client for users and user groups.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::directory::{ChatDirectory, ChatUser, ChatUserGroup, ChatUserPage};
use crate::error::{ApiError, ConfigError};
use crate::http::{build_client, ensure_success};

/// Slack Web API endpoint.
pub const DEFAULT_API_URL: &str = "https://slack.com/api";

/// Environment variable holding the Slack bot token.
pub const ENV_SLACK_TOKEN: &str = "SLACK_TOKEN";

const SERVICE: &str = "Slack";

/// Users requested per `users.list` page.
const PAGE_LIMIT: usize = 200;

/// Slack Web API client.
#[derive(Debug, Clone)]
pub struct SlackClient {
    client: reqwest::Client,
    api_url: String,
}

impl SlackClient {
    /// Create a client authenticated with a bot or user token.
    ///
    /// # Errors
    /// Returns error if the token is not a valid header value or the HTTP
    /// client cannot be built.
    pub fn new(token: &str, api_url: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                ConfigError::Invalid {
                    name: ENV_SLACK_TOKEN,
                    reason: e.to_string(),
                }
            })?,
        );

        Ok(Self {
            client: build_client(headers, timeout)?,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_url)
    }

    /// Send a Web API call and unwrap the `{"ok": ..}` envelope.
    async fn call<R: DeserializeOwned>(
        &self,
        method: &'static str,
        request: RequestBuilder,
    ) -> Result<R, ApiError> {
        let response = ensure_success(SERVICE, request.send().await?).await?;
        let body = response.bytes().await?;
        let envelope: Value = serde_json::from_slice(&body).map_err(|source| ApiError::Decode {
            service: SERVICE,
            source,
        })?;

        if envelope.get("ok").and_then(Value::as_bool) != Some(true) {
            let code = envelope
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_string();
            warn!(method, code = %code, "Slack API call rejected");
            return Err(ApiError::Rejected {
                service: SERVICE,
                code,
            });
        }

        serde_json::from_value(envelope).map_err(|source| ApiError::Decode {
            service: SERVICE,
            source,
        })
    }
}

#[async_trait]
impl ChatDirectory for SlackClient {
    #[instrument(skip(self))]
    async fn users_page(&self, cursor: Option<&str>) -> Result<ChatUserPage, ApiError> {
        let mut query = vec![("limit", PAGE_LIMIT.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        let request = self.client.get(self.url("users.list")).query(&query);
        let response: UsersListResponse = self.call("users.list", request).await?;

        let next_cursor = response
            .response_metadata
            .and_then(|m| m.next_cursor)
            .filter(|c| !c.is_empty());

        debug!(
            count = response.members.len(),
            has_next = next_cursor.is_some(),
            "Fetched Slack users page"
        );

        Ok(ChatUserPage {
            users: response.members.into_iter().map(ChatUser::from).collect(),
            next_cursor,
        })
    }

    #[instrument(skip(self))]
    async fn user_groups(&self) -> Result<Vec<ChatUserGroup>, ApiError> {
        let request = self.client.get(self.url("usergroups.list"));
        let response: UserGroupsListResponse = self.call("usergroups.list", request).await?;

        debug!(count = response.usergroups.len(), "Fetched Slack user groups");

        Ok(response
            .usergroups
            .into_iter()
            .map(|g| ChatUserGroup {
                id: g.id,
                handle: g.handle,
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn set_user_group_members(
        &self,
        user_group_id: &str,
        user_ids: &[&str],
    ) -> Result<(), ApiError> {
        let payload = UpdateMembersRequest {
            usergroup: user_group_id,
            users: user_ids.join(","),
        };

        let request = self
            .client
            .post(self.url("usergroups.users.update"))
            .json(&payload);
        let _: Value = self.call("usergroups.users.update", request).await?;

        debug!("Slack user group membership updated");
        Ok(())
    }
}

// =============================================================================
// Slack API types (internal)
// =============================================================================

#[derive(Debug, Serialize)]
struct UpdateMembersRequest<'a> {
    usergroup: &'a str,
    /// Comma-separated user IDs
    users: String,
}

#[derive(Debug, Deserialize)]
struct UsersListResponse {
    #[serde(default)]
    members: Vec<ApiUser>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    #[serde(default)]
    profile: ApiProfile,
}

#[derive(Debug, Default, Deserialize)]
struct ApiProfile {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserGroupsListResponse {
    #[serde(default)]
    usergroups: Vec<ApiUserGroup>,
}

#[derive(Debug, Deserialize)]
struct ApiUserGroup {
    id: String,
    handle: String,
}

impl From<ApiUser> for ChatUser {
    fn from(user: ApiUser) -> Self {
        Self {
            id: user.id,
            email: user.profile.email,
        }
    }
}
