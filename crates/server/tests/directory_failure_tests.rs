//! Behaviour when the user directory backend is down.

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use light_idp::{
    api,
    directory::{DirectoryError, User, UserDirectory},
    oidc::{HeaderPrincipal, KeyManager, OidcState, SigningKey},
};
use std::sync::Arc;

const TEST_KEY: &str = include_str!("fixtures/test-signing-key.pem");

/// Directory whose every call fails as if the backend were unreachable.
struct UnavailableDirectory;

#[async_trait]
impl UserDirectory for UnavailableDirectory {
    async fn create(&self, _user: User) -> Result<(), DirectoryError> {
        Err(DirectoryError::Unavailable("connection refused".to_string()))
    }

    async fn get(&self, _id: &str) -> Result<Option<User>, DirectoryError> {
        Err(DirectoryError::Unavailable("connection refused".to_string()))
    }

    async fn save_refresh_token(&self, _id: &str, _token: &str) -> Result<(), DirectoryError> {
        Err(DirectoryError::Unavailable("connection refused".to_string()))
    }

    async fn revoke_refresh_token(&self, _id: &str) -> Result<(), DirectoryError> {
        Err(DirectoryError::Unavailable("connection refused".to_string()))
    }
}

fn test_state() -> OidcState {
    let key = SigningKey::from_pkcs8_pem("test-key", TEST_KEY).expect("load test key");
    OidcState::new(KeyManager::new(key), Arc::new(UnavailableDirectory))
}

async fn issue_code(server: &TestServer) -> String {
    let response = server
        .get("/authorize")
        .add_query_param("response_type", "code")
        .add_query_param("client_id", "abc")
        .add_query_param("redirect_uri", "http://client/cb")
        .add_query_param("principal", "123")
        .await;

    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header");
    url::Url::parse(location)
        .expect("absolute location")
        .query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .expect("code in redirect")
}

#[tokio::test]
async fn test_token_directory_failure_is_server_error() {
    let state = test_state();
    let server = TestServer::new(api::router(state.clone())).expect("create test server");
    let code = issue_code(&server).await;
    let form = [
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("client_id", "abc"),
    ];

    let response = server.post("/token").form(&form).await;
    response.assert_status_internal_server_error();
    let body = response.json::<serde_json::Value>();
    assert_eq!(body["error"], "server_error");
    assert!(body.get("error_description").is_none());

    // the code was consumed before the directory call
    assert!(state.codes.is_empty());
    let retry = server.post("/token").form(&form).await;
    retry.assert_status_bad_request();
    assert_eq!(retry.json::<serde_json::Value>()["error"], "invalid_grant");
}

#[tokio::test]
async fn test_logout_succeeds_when_directory_is_down() {
    let server = TestServer::new(api::router(test_state())).expect("create test server");

    server
        .get("/logout")
        .add_query_param("principal", "123")
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_userinfo_directory_failure_is_server_error() {
    let state = test_state().with_session_resolver(Arc::new(HeaderPrincipal::new(
        HeaderName::from_static("x-remote-user"),
    )));
    let server = TestServer::new(api::router(state)).expect("create test server");

    let response = server
        .get("/userinfo")
        .add_header(
            HeaderName::from_static("x-remote-user"),
            HeaderValue::from_static("123"),
        )
        .await;
    response.assert_status_internal_server_error();
    assert_eq!(response.json::<serde_json::Value>()["error"], "server_error");
}
