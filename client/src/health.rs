//! Health probe.
//!
//! The probe is the one call site that never propagates a pipeline rejection: a liveness
//! check must always give its caller something to render.

use atelier_types::{ApiEnvelope, ComfyUiStatus, HealthReport};
use serde_json::Value;

use crate::pipeline::ApiClient;
use crate::request::OutboundRequest;

pub const HEALTH_PATH: &str = "/api/health";

/// Probe the backend. Any failure yields [`ApiEnvelope::degraded`].
pub async fn check_health(client: &ApiClient) -> ApiEnvelope<HealthReport> {
    match client.execute(OutboundRequest::get(HEALTH_PATH)).await {
        Ok(payload) => normalize_health(&payload),
        Err(error) => {
            // The classified kind is dropped here; callers only see the degraded envelope.
            tracing::debug!(kind = error.kind(), "Health probe failed");
            ApiEnvelope::degraded()
        }
    }
}

/// Adapt a raw health payload into the envelope.
///
/// The report may be the payload itself or nested under `data`. A payload with no
/// readable report normalizes to `success: false`.
#[must_use]
pub fn normalize_health(payload: &Value) -> ApiEnvelope<HealthReport> {
    let body = payload
        .get("data")
        .filter(|data| data.get("status").is_some())
        .unwrap_or(payload);

    match serde_json::from_value::<HealthReport>(body.clone()) {
        Ok(report) => ApiEnvelope::from_report(report),
        Err(e) => {
            tracing::warn!("Unrecognized health payload: {e}");
            ApiEnvelope {
                success: false,
                message: None,
                data: HealthReport {
                    status: "unknown".to_string(),
                    message: String::new(),
                    comfyui_status: ComfyUiStatus::default(),
                },
            }
        }
    }
}
