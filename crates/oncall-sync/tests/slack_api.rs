//! Slack client tests against a mock Web API.

use std::time::Duration;

use oncall_sync::directory::ChatDirectory;
use oncall_sync::resolve::{get_user_group_id, get_user_id};
use oncall_sync::{ApiError, SlackClient};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> SlackClient {
    SlackClient::new("xoxb-test", &server.uri(), Duration::from_secs(5)).unwrap()
}

fn member(id: &str, email: &str) -> serde_json::Value {
    json!({"id": id, "name": id, "deleted": false, "profile": {"email": email}})
}

#[tokio::test]
async fn test_users_follow_next_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users.list"))
        .and(header("authorization", "Bearer xoxb-test"))
        .and(query_param_is_missing("cursor"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "members": [member("U1", "ada@example.com")],
            "response_metadata": {"next_cursor": "dXNlcjpVMg=="}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users.list"))
        .and(query_param("cursor", "dXNlcjpVMg=="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "members": [member("U2", "grace@example.com")],
            "response_metadata": {"next_cursor": ""}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = get_user_id(&client(&server), "grace@example.com")
        .await
        .unwrap();
    assert_eq!(id.as_deref(), Some("U2"));
}

#[tokio::test]
async fn test_user_group_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/usergroups.list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "usergroups": [
                {"id": "S1", "handle": "platform-oncall", "name": "Platform On-Call"},
                {"id": "S2", "handle": "data-oncall", "name": "Data On-Call"}
            ]
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(
        get_user_group_id(&client, "data-oncall").await.unwrap(),
        Some("S2".to_string())
    );
    assert_eq!(get_user_group_id(&client, "nope").await.unwrap(), None);
}

#[tokio::test]
async fn test_update_replaces_members() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/usergroups.users.update"))
        .and(body_json(json!({"usergroup": "S1", "users": "U2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "usergroup": {"id": "S1", "users": ["U2"]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .set_user_group_members("S1", &["U2"])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_invalid_auth_is_not_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/usergroups.list"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ok": false, "error": "invalid_auth"})),
        )
        .mount(&server)
        .await;

    let err = client(&server).user_groups().await.unwrap_err();
    assert!(matches!(&err, ApiError::Rejected { code, .. } if code == "invalid_auth"));
    assert!(!err.is_transient());

    let err = get_user_group_id(&client(&server), "ops").await.unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_ratelimited_code_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/usergroups.users.update"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ok": false, "error": "ratelimited"})),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .set_user_group_members("S1", &["U1"])
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/usergroups.list"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client(&server).user_groups().await.unwrap_err();
    assert!(matches!(err, ApiError::Decode { .. }));
}
