//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use atelier_client::{ApiClient, FileTokenStore, SessionHolder};
use atelier_config::{AtelierConfig, ClientSettings};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Config file pointing at `base_url`, with the token kept under `dir`.
pub fn write_config(dir: &Path, base_url: &str) -> std::path::PathBuf {
    let token_path = dir.join("session").join("token");
    let config_path = dir.join("config.toml");
    let body = format!(
        r#"
[api]
base_url = "{base_url}"
timeout_ms = 2000
login_path = "/signin"

[session]
token_path = "{}"

[perf]
idle_backend = "timer"
"#,
        token_path.display().to_string().replace('\\', "/")
    );
    std::fs::write(&config_path, body).expect("write config");
    config_path
}

/// Resolve settings from a config file, ignoring the process environment.
pub fn settings_from(config_path: &Path) -> ClientSettings {
    let config = AtelierConfig::load_from(config_path)
        .expect("config parses")
        .expect("config exists");
    ClientSettings::resolve_with_env(Some(&config), None)
}

/// Client whose session is backed by the token file named in `settings`.
pub fn file_backed_client(settings: &ClientSettings) -> ApiClient {
    let token_path = settings.token_path.clone().expect("token path configured");
    let session = Arc::new(SessionHolder::hydrated(FileTokenStore::new(token_path)));
    ApiClient::new(settings, session).expect("client builds")
}

/// Default settings aimed at `base_url` with a short timeout and no persistence.
pub fn memory_settings(base_url: &str) -> ClientSettings {
    ClientSettings {
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(2),
        login_path: "/login".to_string(),
        token_path: None,
    }
}

/// Mount a healthy report on `/api/health`.
pub async fn mount_healthy(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "healthy",
            "message": "服务运行正常",
            "comfyui_status": { "running": true, "message": "ComfyUI 运行中" }
        })))
        .mount(server)
        .await;
}
