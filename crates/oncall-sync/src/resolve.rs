//! Identity resolution across the incident and chat services.
//!
//! Every lookup that can match more than one entry goes through
//! [`select_preferred`], which keeps the last match in fetch order.

use tracing::{debug, warn};

use crate::directory::{ChatDirectory, ChatUser, OnCallDirectory, OnCallRecord};
use crate::error::{ApiError, SyncError};

/// Escalation level of the first responder.
pub const FIRST_RESPONDER_LEVEL: u32 = 1;

/// Pick one entry out of several matches: the last one wins.
///
/// Duplicate level-1 on-calls, user groups sharing a handle and users
/// sharing an email all resolve this way.
pub fn select_preferred<T>(matches: impl IntoIterator<Item = T>) -> Option<T> {
    matches.into_iter().last()
}

/// Fetch every current on-call record, following offset pagination.
///
/// The next offset is the number of records fetched so far. Stops on the
/// first page that reports no further pages, or on an empty page.
///
/// # Errors
/// Returns the first page error.
pub async fn fetch_all_on_calls(
    directory: &dyn OnCallDirectory,
) -> Result<Vec<OnCallRecord>, ApiError> {
    let mut records = Vec::new();

    loop {
        let page = directory.on_calls_page(records.len()).await?;
        let fetched = page.records.len();
        records.extend(page.records);

        if !page.more {
            break;
        }
        if fetched == 0 {
            warn!(
                offset = records.len(),
                "On-call page reported more records but returned none; listing may be truncated"
            );
            break;
        }
    }

    Ok(records)
}

/// Select the user ID of the level-1 on-call for an escalation policy.
pub fn select_on_call<'a>(records: &'a [OnCallRecord], escalation_policy: &str) -> Option<&'a str> {
    select_preferred(records.iter().filter(|r| {
        r.escalation_policy_summary == escalation_policy
            && r.escalation_level == FIRST_RESPONDER_LEVEL
    }))
    .map(|r| r.user_id.as_str())
}

/// Email of the person currently level-1 on-call for `escalation_policy`.
///
/// # Errors
/// - [`SyncError::Fetch`] if the on-call listing or user lookup fails
/// - [`SyncError::NoOnCall`] if nobody is level-1 for the policy
/// - [`SyncError::OnCallUserNotFound`] if the selected user does not exist
pub async fn find_on_call_email(
    directory: &dyn OnCallDirectory,
    escalation_policy: &str,
) -> Result<String, SyncError> {
    let records = fetch_all_on_calls(directory)
        .await
        .map_err(SyncError::fetch("PagerDuty on-calls"))?;

    let user_id = select_on_call(&records, escalation_policy).ok_or_else(|| {
        SyncError::NoOnCall {
            policy: escalation_policy.to_string(),
        }
    })?;

    let user = directory
        .user(user_id)
        .await
        .map_err(SyncError::fetch("PagerDuty user"))?
        .ok_or_else(|| SyncError::OnCallUserNotFound {
            user_id: user_id.to_string(),
        })?;

    debug!(
        email = %user.email,
        pagerduty_user_id = %user.id,
        on_call_name = user.name.as_deref(),
        escalation_policy,
        "Found email for escalation policy"
    );

    Ok(user.email)
}

/// Fetch every chat user, following cursor pagination.
///
/// # Errors
/// Returns the first page error.
pub async fn fetch_all_chat_users(
    directory: &dyn ChatDirectory,
) -> Result<Vec<ChatUser>, ApiError> {
    let mut users = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = directory.users_page(cursor.as_deref()).await?;
        users.extend(page.users);

        match page.next_cursor {
            Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
            _ => break,
        }
    }

    Ok(users)
}

/// Chat user ID whose profile email equals `email`.
///
/// # Errors
/// Returns [`SyncError::Fetch`] if the user listing fails.
pub async fn get_user_id(
    directory: &dyn ChatDirectory,
    email: &str,
) -> Result<Option<String>, SyncError> {
    let users = fetch_all_chat_users(directory)
        .await
        .map_err(SyncError::fetch("Slack users"))?;

    let user_id = select_preferred(
        users
            .into_iter()
            .filter(|u| u.email.as_deref() == Some(email)),
    )
    .map(|u| u.id);

    if let Some(id) = &user_id {
        debug!(email, slack_user_id = %id, "Found Slack user for email");
    }

    Ok(user_id)
}

/// Chat user group ID whose handle equals `handle`.
///
/// # Errors
/// Returns [`SyncError::Fetch`] if the user group listing fails.
pub async fn get_user_group_id(
    directory: &dyn ChatDirectory,
    handle: &str,
) -> Result<Option<String>, SyncError> {
    let groups = directory
        .user_groups()
        .await
        .map_err(SyncError::fetch("Slack user groups"))?;

    let group_id = select_preferred(groups.into_iter().filter(|g| g.handle == handle)).map(|g| g.id);

    if let Some(id) = &group_id {
        debug!(handle, slack_user_group_id = %id, "Found Slack user group for handle");
    }

    Ok(group_id)
}


#[cfg(test)]
mod tests {
    use super::fakes::{record, unavailable, FakeChat, FakeOnCalls};
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[test]
    fn test_select_preferred_takes_last() {
        assert_eq!(select_preferred([1, 2, 3]), Some(3));
        assert_eq!(select_preferred(Vec::<u8>::new()), None);
    }

    #[tokio::test]
    async fn test_pagination_concatenates_pages_in_order() {
        let directory = FakeOnCalls {
            pages: vec![
                vec![record("A", 1, "u1"), record("A", 2, "u2")],
                vec![record("B", 1, "u3")],
                vec![record("C", 1, "u4"), record("C", 1, "u5")],
            ],
            ..FakeOnCalls::default()
        };

        let records = fetch_all_on_calls(&directory).await.unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "u2", "u3", "u4", "u5"]);
        assert_eq!(directory.offsets(), vec![0, 2, 3]);
    }

    #[tokio::test]
    async fn test_pagination_stops_on_empty_page() {
        let directory = FakeOnCalls {
            pages: vec![vec![record("A", 1, "u1")], vec![], vec![record("A", 1, "u2")]],
            ..FakeOnCalls::default()
        };

        let records = fetch_all_on_calls(&directory).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(directory.offsets(), vec![0, 1]);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_truncated_listing_is_warned() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .without_time()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let directory = FakeOnCalls {
            pages: vec![vec![record("A", 1, "u1")], vec![], vec![record("A", 1, "u2")]],
            ..FakeOnCalls::default()
        };
        let records = fetch_all_on_calls(&directory).await.unwrap();

        assert_eq!(records.len(), 1);
        let output = logs.contents();
        assert!(output.contains("WARN"), "{output}");
        assert!(output.contains("listing may be truncated"), "{output}");
        assert!(output.contains("offset=1"), "{output}");
    }

    #[tokio::test]
    async fn test_last_level_one_match_wins() {
        let directory = FakeOnCalls::single_page(vec![
            record("A", 1, "u1"),
            record("A", 1, "u2"),
        ])
        .with_user("u1", "one@example.com")
        .with_user("u2", "two@example.com");

        let email = find_on_call_email(&directory, "A").await.unwrap();
        assert_eq!(email, "two@example.com");
    }

    #[tokio::test]
    async fn test_higher_levels_and_other_policies_ignored() {
        let directory = FakeOnCalls::single_page(vec![
            record("A", 1, "u1"),
            record("A", 2, "u2"),
            record("B", 1, "u3"),
        ])
        .with_user("u1", "one@example.com");

        let email = find_on_call_email(&directory, "A").await.unwrap();
        assert_eq!(email, "one@example.com");
    }

    #[tokio::test]
    async fn test_no_level_one_is_explicit() {
        let directory = FakeOnCalls::single_page(vec![record("A", 2, "u2")]);

        let err = find_on_call_email(&directory, "A").await.unwrap_err();
        assert!(matches!(err, SyncError::NoOnCall { policy } if policy == "A"));
    }

    #[tokio::test]
    async fn test_unknown_on_call_user_is_fatal() {
        let directory = FakeOnCalls::single_page(vec![record("A", 1, "ghost")]);

        let err = find_on_call_email(&directory, "A").await.unwrap_err();
        assert!(matches!(&err, SyncError::OnCallUserNotFound { user_id } if user_id == "ghost"));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_pagination_error_propagates() {
        let directory = FakeOnCalls {
            fail_listing: Some(unavailable),
            ..FakeOnCalls::default()
        };

        let err = find_on_call_email(&directory, "A").await.unwrap_err();
        assert!(matches!(err, SyncError::Fetch { .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_chat_users_follow_cursor() {
        let directory = FakeChat {
            user_pages: vec![
                vec![ChatUser {
                    id: "U1".to_string(),
                    email: Some("one@example.com".to_string()),
                }],
                vec![ChatUser {
                    id: "U2".to_string(),
                    email: Some("two@example.com".to_string()),
                }],
            ],
            ..FakeChat::default()
        };

        let id = get_user_id(&directory, "two@example.com").await.unwrap();
        assert_eq!(id.as_deref(), Some("U2"));
        assert_eq!(
            *directory.cursors.lock().unwrap(),
            vec![None, Some("page-1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_chat_lookups_last_match_and_absent() {
        let directory = FakeChat::new(
            &[("U1", "dup@example.com"), ("U2", "dup@example.com")],
            &[("S1", "ops"), ("S2", "ops"), ("S3", "db")],
        );

        assert_eq!(
            get_user_id(&directory, "dup@example.com").await.unwrap(),
            Some("U2".to_string())
        );
        assert_eq!(get_user_id(&directory, "nobody@example.com").await.unwrap(), None);
        assert_eq!(
            get_user_group_id(&directory, "ops").await.unwrap(),
            Some("S2".to_string())
        );
        assert_eq!(get_user_group_id(&directory, "missing").await.unwrap(), None);
    }
}
