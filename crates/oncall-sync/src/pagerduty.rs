//! `PagerDuty` REST API v2 client.
//!
//! Only the two read calls the sync needs are implemented: the on-call
//! listing (offset paginated) and the single user lookup.
//!
//! # Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use oncall_sync::directory::OnCallDirectory;
//! use oncall_sync::pagerduty::{PagerDutyClient, DEFAULT_API_URL};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = PagerDutyClient::new("token", DEFAULT_API_URL, Duration::from_secs(30))?;
//! let page = client.on_calls_page(0).await?;
//! println!("{} on-call records, more: {}", page.records.len(), page.more);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::directory::{OnCallDirectory, OnCallPage, OnCallRecord, OnCallUser};
use crate::error::{ApiError, ConfigError};
use crate::http::{build_client, ensure_success};

/// `PagerDuty` REST API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.pagerduty.com";

/// Environment variable holding the `PagerDuty` API token.
pub const ENV_PAGERDUTY_TOKEN: &str = "PD_TOKEN";

const SERVICE: &str = "PagerDuty";

/// Media type selecting version 2 of the REST API.
const ACCEPT_V2: &str = "application/vnd.pagerduty+json;version=2";

/// Records requested per on-call page.
const PAGE_LIMIT: usize = 100;

/// `PagerDuty` REST API client.
#[derive(Debug, Clone)]
pub struct PagerDutyClient {
    client: reqwest::Client,
    api_url: String,
}

impl PagerDutyClient {
    /// Create a client authenticated with a REST API token.
    ///
    /// # Errors
    /// Returns error if the token is not a valid header value or the HTTP
    /// client cannot be built.
    pub fn new(token: &str, api_url: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Token token={token}")).map_err(|e| {
                ConfigError::Invalid {
                    name: ENV_PAGERDUTY_TOKEN,
                    reason: e.to_string(),
                }
            })?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_V2));

        Ok(Self {
            client: build_client(headers, timeout)?,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<R, ApiError> {
        let response = self
            .client
            .get(format!("{}{path}", self.api_url))
            .query(query)
            .send()
            .await?;
        let response = ensure_success(SERVICE, response).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| ApiError::Decode {
            service: SERVICE,
            source,
        })
    }
}

#[async_trait]
impl OnCallDirectory for PagerDutyClient {
    #[instrument(skip(self))]
    async fn on_calls_page(&self, offset: usize) -> Result<OnCallPage, ApiError> {
        let response: OnCallsResponse = self
            .get(
                "/oncalls",
                &[
                    ("offset", offset.to_string()),
                    ("limit", PAGE_LIMIT.to_string()),
                ],
            )
            .await?;

        debug!(
            count = response.oncalls.len(),
            more = response.more,
            "Fetched on-call page"
        );

        Ok(OnCallPage {
            records: response
                .oncalls
                .into_iter()
                .map(OnCallRecord::from)
                .collect(),
            more: response.more,
        })
    }

    #[instrument(skip(self))]
    async fn user(&self, user_id: &str) -> Result<Option<OnCallUser>, ApiError> {
        let path = format!("/users/{user_id}");
        match self.get::<UserResponse>(&path, &[]).await {
            Ok(response) => Ok(Some(response.user.into())),
            Err(ApiError::Status {
                status: StatusCode::NOT_FOUND,
                ..
            }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// =============================================================================
// API types (internal)
// =============================================================================

#[derive(Debug, Deserialize)]
struct OnCallsResponse {
    #[serde(default)]
    oncalls: Vec<ApiOnCall>,
    #[serde(default)]
    more: bool,
}

#[derive(Debug, Deserialize)]
struct ApiOnCall {
    escalation_policy: ApiReference,
    escalation_level: u32,
    user: ApiReference,
}

#[derive(Debug, Deserialize)]
struct ApiReference {
    id: String,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    user: ApiUser,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    email: String,
    #[serde(default)]
    name: Option<String>,
}

impl From<ApiOnCall> for OnCallRecord {
    fn from(on_call: ApiOnCall) -> Self {
        Self {
            escalation_policy_summary: on_call.escalation_policy.summary,
            escalation_level: on_call.escalation_level,
            user_id: on_call.user.id,
        }
    }
}

impl From<ApiUser> for OnCallUser {
    fn from(user: ApiUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client =
            PagerDutyClient::new("token", "https://pd.example.com/", Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.api_url, "https://pd.example.com");
    }

    #[test]
    fn test_invalid_token_rejected() {
        let err = PagerDutyClient::new("bad\ntoken", DEFAULT_API_URL, Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: ENV_PAGERDUTY_TOKEN,
                ..
            }
        ));
    }

    #[test]
    fn test_on_call_deserialization() {
        let json = r#"{
            "oncalls": [{
                "escalation_policy": {"id": "PEP1", "summary": "Platform", "type": "escalation_policy_reference"},
                "escalation_level": 1,
                "user": {"id": "PU1", "summary": "Ada", "type": "user_reference"},
                "start": "2024-01-01T00:00:00Z"
            }],
            "limit": 100,
            "offset": 0,
            "more": true
        }"#;

        let response: OnCallsResponse = serde_json::from_str(json).unwrap();
        assert!(response.more);

        let record = OnCallRecord::from(response.oncalls.into_iter().next().unwrap());
        assert_eq!(
            record,
            OnCallRecord {
                escalation_policy_summary: "Platform".to_string(),
                escalation_level: 1,
                user_id: "PU1".to_string(),
            }
        );
    }
}
