//! Error types for on-call sync.
//!
//! Errors are split by layer: [`ConfigError`] for startup problems,
//! [`ApiError`] for the HTTP clients and [`SyncError`] for the sync loop.
//! [`SyncError::is_fatal`] decides whether a failure aborts the process or
//! only skips the current pair.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised while building the runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required credential is missing or empty
    #[error("{0} must be set")]
    MissingCredential(&'static str),

    /// Neither a mapping file nor an inline mapping was given
    #[error("no mapping configured: pass --map-file or --map")]
    MissingMapping,

    /// Both mapping sources were given
    #[error("--map-file and --map are mutually exclusive")]
    ConflictingMapping,

    /// Mapping file could not be read
    #[error("failed to read mapping file {}: {source}", path.display())]
    ReadMapping {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A mapping file row did not have exactly two columns
    #[error("mapping line {line}: expected 2 columns, found {found}")]
    ColumnCount { line: usize, found: usize },

    /// A mapping file row has an unterminated quoted field
    #[error("mapping line {line}: malformed quoted field")]
    MalformedQuote { line: usize },

    /// An inline mapping pair has no `:` separator
    #[error("malformed mapping pair '{0}': expected policy:handle")]
    MalformedPair(String),

    /// A mapping entry has an empty escalation policy or handle
    #[error("mapping entry '{0}' has an empty escalation policy or user group handle")]
    EmptyField(String),

    /// The mapping source contained no entries
    #[error("mapping is empty")]
    EmptyMapping,

    /// A setting could not be turned into a usable value
    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Errors returned by the `PagerDuty` and Slack API clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Service answered with a non-success status
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: StatusCode,
        body: String,
    },

    /// Service answered 200 but rejected the call (Slack `ok: false`)
    #[error("{service} rejected the request: {code}")]
    Rejected { service: &'static str, code: String },

    /// Rate limited by the service
    #[error("{service} rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        service: &'static str,
        retry_after_secs: u64,
    },

    /// Response body did not match the expected shape
    #[error("failed to decode {service} response: {source}")]
    Decode {
        service: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Slack error codes worth retrying on the next cycle.
const TRANSIENT_SLACK_CODES: &[&str] = &[
    "ratelimited",
    "fatal_error",
    "internal_error",
    "request_timeout",
    "service_unavailable",
];

impl ApiError {
    /// Whether the failure is likely to clear up on its own.
    ///
    /// Transport failures, 5xx answers and rate limits are transient.
    /// Authentication, permission and payload problems are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Rejected { code, .. } => TRANSIENT_SLACK_CODES.contains(&code.as_str()),
            Self::RateLimited { .. } => true,
            Self::Decode { .. } => false,
        }
    }
}

/// Errors raised while syncing one escalation policy to one user group.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration problem
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A listing or lookup call failed
    #[error("failed to fetch {what}: {source}")]
    Fetch {
        what: &'static str,
        #[source]
        source: ApiError,
    },

    /// Nobody is level-1 on-call for the escalation policy
    #[error("no level-1 on-call found for escalation policy '{policy}'")]
    NoOnCall { policy: String },

    /// The selected on-call user does not exist in `PagerDuty`
    #[error("PagerDuty user {user_id} not found")]
    OnCallUserNotFound { user_id: String },

    /// No Slack user has the on-call email
    #[error("no Slack user with email '{email}'")]
    ChatUserNotFound { email: String },

    /// No Slack user group has the handle
    #[error("no Slack user group with handle '{handle}'")]
    UserGroupNotFound { handle: String },

    /// Membership update failed
    #[error("failed to update user group {user_group_id}: {source}")]
    Update {
        user_group_id: String,
        #[source]
        source: ApiError,
    },
}

impl SyncError {
    pub(crate) fn fetch(what: &'static str) -> impl FnOnce(ApiError) -> Self {
        move |source| Self::Fetch { what, source }
    }

    /// Whether the error must stop the process instead of skipping the pair.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Config(_) | Self::OnCallUserNotFound { .. } | Self::Update { .. } => true,
            Self::Fetch { source, .. } => !source.is_transient(),
            Self::NoOnCall { .. } | Self::ChatUserNotFound { .. } | Self::UserGroupNotFound { .. } => {
                false
            }
        }
    }
}
