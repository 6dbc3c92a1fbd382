//! Config -> session -> client wiring across crates

use std::sync::Arc;

use atelier_client::{ApiError, FileTokenStore, SessionEvent, SessionHolder, TokenStore};
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{file_backed_client, settings_from, write_config};

#[tokio::test]
async fn config_drives_base_url_timeout_and_login_path() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), "http://backend.test:9000/");
    let settings = settings_from(&config_path);

    assert_eq!(settings.base_url, "http://backend.test:9000/");
    assert_eq!(settings.timeout.as_millis(), 2000);
    assert_eq!(settings.login_path, "/signin");
    assert_eq!(
        settings.token_path.as_deref(),
        Some(dir.path().join("session").join("token").as_path())
    );

    let client = file_backed_client(&settings);
    assert_eq!(client.base_url(), "http://backend.test:9000");
}

#[tokio::test]
async fn login_persists_token_for_the_next_process() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/agent/agents"))
        .and(header("authorization", "Bearer persisted"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let settings = settings_from(&write_config(dir.path(), &server.uri()));

    let first = file_backed_client(&settings);
    first.session().set_token(Some("persisted"));
    drop(first);

    // A fresh holder hydrates from the same slot.
    let second = file_backed_client(&settings);
    assert!(second.session().is_authenticated());
    let agents: Vec<Value> = second.get("/api/agent/agents").await.unwrap();
    assert!(agents.is_empty());
}

#[tokio::test]
async fn unauthorized_wipes_durable_slot_and_reports_configured_login_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/user/active"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let settings = settings_from(&write_config(dir.path(), &server.uri()));
    let token_path = settings.token_path.clone().unwrap();

    let client = file_backed_client(&settings);
    client.session().set_token(Some("expired"));
    assert_eq!(
        FileTokenStore::new(&token_path).load().unwrap().as_deref(),
        Some("expired")
    );

    let mut events = client.subscribe();
    let err = client.get::<Value>("/api/user/active").await.unwrap_err();

    assert_eq!(err, ApiError::Unauthorized);
    assert_eq!(err.diagnostic(), "Authentication required: Please log in again");
    assert_eq!(FileTokenStore::new(&token_path).load().unwrap(), None);
    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::Invalidated {
            login_path: "/signin".to_string()
        }
    );

    let rehydrated = SessionHolder::hydrated(FileTokenStore::new(&token_path));
    assert!(!rehydrated.is_authenticated());
}

#[tokio::test]
async fn clones_share_one_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/user/active"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let session = Arc::new(SessionHolder::in_memory());
    session.set_token(Some("shared"));
    let settings = crate::common::memory_settings(&server.uri());
    let client = atelier_client::ApiClient::new(&settings, Arc::clone(&session)).unwrap();
    let clone = client.clone();
    let mut events = client.subscribe();

    let _ = clone.get::<Value>("/api/user/active").await;

    assert!(!session.is_authenticated());
    assert!(!client.session().is_authenticated());
    assert!(events.try_recv().is_ok(), "clone shares the event channel");
}
