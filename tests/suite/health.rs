//! Health probe through the configured client

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use atelier_client::{ApiClient, SessionHolder, check_health};
use std::sync::Arc;

use crate::common::{memory_settings, mount_healthy};

fn anonymous(base_url: &str) -> ApiClient {
    ApiClient::new(&memory_settings(base_url), Arc::new(SessionHolder::in_memory())).unwrap()
}

#[tokio::test]
async fn healthy_backend_reports_success() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;

    let envelope = check_health(&anonymous(&server.uri())).await;

    assert!(envelope.success);
    assert!(envelope.data.is_healthy());
    assert_eq!(envelope.data.comfyui_status.message, "ComfyUI 运行中");
}

#[tokio::test]
async fn nested_envelope_report_is_unwrapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "status": "degraded",
                "message": "ComfyUI 未运行",
                "comfyui_status": { "running": false, "message": "ComfyUI 未运行" }
            }
        })))
        .mount(&server)
        .await;

    let envelope = check_health(&anonymous(&server.uri())).await;

    assert!(!envelope.success);
    assert_eq!(envelope.data.status, "degraded");
    assert_eq!(envelope.message.as_deref(), Some("ComfyUI 未运行"));
}

#[tokio::test]
async fn unauthorized_health_is_degraded_and_still_invalidates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = anonymous(&server.uri());
    client.session().set_token(Some("tok"));
    let mut events = client.subscribe();

    let envelope = check_health(&client).await;

    assert!(!envelope.success);
    assert_eq!(envelope.data.status, "error");
    assert!(!client.session().is_authenticated());
    assert!(events.try_recv().is_ok());
}
