mod common;

use common::mock_server::TraceryMock;
use std::sync::Arc;
use tracery::contract::Message;
use tracery::credential::CREDENTIAL_KEY;
use tracery::extract_message;
use tracery::storage::{KeyValueStore, MemoryStore};
use tracery::types::{LoginRequest, SignUpRequest};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn alice_sign_up() -> SignUpRequest {
    SignUpRequest {
        nickname: "alice".to_string(),
        first_name: "Alice".to_string(),
        last_name: "Liddell".to_string(),
        email: "alice@example.com".to_string(),
        password: "rabbit-hole".to_string(),
    }
}

#[tokio::test]
async fn test_login_returns_token() {
    let mock = TraceryMock::start().await;
    mock.mount_fixture("auth/login_valid.json").await;

    let client = mock.client();
    let response = client
        .login(&LoginRequest::new("alice", "rabbit-hole"))
        .await
        .unwrap();
    assert_eq!(response.access_token, "abc");
    // the bare client never installs anything
    assert!(!client.transport().has_credential());
}

#[tokio::test]
async fn test_login_sends_credentials_as_json() {
    let mock = TraceryMock::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(header("content-type", "application/json"))
        .and(body_json(serde_json::json!({"login": "alice", "password": "rabbit-hole"})))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({"access_token": "abc"})),
        )
        .expect(1)
        .mount(&mock.server)
        .await;

    mock.client()
        .login(&LoginRequest::new("alice", "rabbit-hole"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_session_login_authorizes_later_requests() {
    let mock = TraceryMock::start().await;
    mock.mount_fixture("auth/login_valid.json").await;
    TraceryMock::fixture_mock("profile/get_profile_valid.json")
        .expect(0)
        .named("profile without bearer")
        .mount(&mock.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .and(header("authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            TraceryMock::load_fixture("min", "profile/get_profile_valid.json")
                .response
                .body,
        ))
        .expect(1)
        .with_priority(1)
        .mount(&mock.server)
        .await;

    let storage = Arc::new(MemoryStore::new());
    let session = mock.session_with(storage.clone());
    session
        .login(&LoginRequest::new("alice", "rabbit-hole"))
        .await
        .unwrap();

    assert!(session.is_logged_in());
    assert_eq!(storage.get(CREDENTIAL_KEY).unwrap().as_deref(), Some("abc"));

    let profile = session.profile().await.unwrap();
    assert_eq!(profile.nickname, "alice");
}

#[tokio::test]
async fn test_login_rejected_with_error_payload() {
    let mock = TraceryMock::start().await;
    mock.mount_fixture("auth/login_unauthorized.json").await;

    let session = mock.session();
    let err = session
        .login(&LoginRequest::new("alice", "wrong"))
        .await
        .unwrap_err();

    assert_eq!(err.status_code.as_u64(), Some(401));
    assert_eq!(err.error, "Unauthorized");
    assert_eq!(extract_message(&err), "Wrong login or password");
    assert!(!session.is_logged_in());
}

#[tokio::test]
async fn test_login_with_malformed_body_is_unknown_error() {
    let mock = TraceryMock::start().await;
    mock.mount_fixture("auth/login_malformed.json").await;

    let session = mock.session();
    let err = session
        .login(&LoginRequest::new("alice", "rabbit-hole"))
        .await
        .unwrap_err();

    assert!(err.is_unknown());
    assert_eq!(err.status_code.as_u64(), Some(500));
    assert!(!session.is_logged_in());
}

#[tokio::test]
async fn test_sign_up_valid() {
    let mock = TraceryMock::start().await;
    mock.mount_fixture("auth/sign_up_valid.json").await;

    let session = mock.session();
    let response = session.sign_up(&alice_sign_up()).await.unwrap();
    assert_eq!(response.message, "User created");
    assert!(!session.is_logged_in());
}

#[tokio::test]
async fn test_sign_up_rejected_joins_messages() {
    let mock = TraceryMock::start().await;
    mock.mount_fixture("auth/sign_up_rejected.json").await;

    let err = mock.session().sign_up(&alice_sign_up()).await.unwrap_err();
    assert!(matches!(err.message, Message::Parts(ref parts) if parts.len() == 2));
    assert_eq!(
        extract_message(&err),
        "Nickname already taken, email must be an email"
    );
}

#[tokio::test]
async fn test_sign_up_and_login_uses_nickname() {
    let mock = TraceryMock::start().await;
    mock.mount_fixture("auth/sign_up_valid.json").await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(serde_json::json!({"login": "alice", "password": "rabbit-hole"})))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({"access_token": "abc"})),
        )
        .expect(1)
        .mount(&mock.server)
        .await;

    let session = mock.session();
    let response = session.sign_up_and_login(&alice_sign_up()).await.unwrap();
    assert_eq!(response.access_token, "abc");
    assert_eq!(session.credentials().get().as_deref(), Some("abc"));
}

#[tokio::test]
async fn test_logout_drops_header_and_persisted_token() {
    let mock = TraceryMock::start().await;
    let storage = Arc::new(MemoryStore::new());
    let session = mock.session_with(storage.clone());
    session.credentials().set(Some("abc".to_string())).unwrap();

    session.logout().unwrap();

    assert!(!session.is_logged_in());
    assert!(!session.client().transport().has_credential());
    assert_eq!(storage.get(CREDENTIAL_KEY).unwrap(), None);
}

#[tokio::test]
async fn test_persisted_token_is_used_on_open() {
    let mock = TraceryMock::start().await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .and(header("authorization", "Bearer persisted"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            TraceryMock::load_fixture("min", "profile/get_profile_valid.json")
                .response
                .body,
        ))
        .expect(1)
        .mount(&mock.server)
        .await;

    let storage = Arc::new(MemoryStore::new());
    storage.set(CREDENTIAL_KEY, "persisted").unwrap();
    let session = mock.session_with(storage);

    assert!(session.is_logged_in());
    session.profile().await.unwrap();
}
