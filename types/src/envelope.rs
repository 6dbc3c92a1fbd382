//! The uniform `{success, message, data}` result shape.

use serde::{Deserialize, Serialize};

/// Status string the backend reports when every dependency is up.
pub const HEALTHY_STATUS: &str = "healthy";
/// Message used when the backend could not be reached at all.
pub const CONNECTION_FAILED_MESSAGE: &str = "服务连接失败";
/// Sub-status message used for the image service when the backend is unreachable.
pub const UNREACHABLE_SERVICE_MESSAGE: &str = "无法连接到服务";

/// Envelope some calls normalize their result into.
///
/// `success` reflects domain-level health, not transport success: a 200 response that
/// carries a failure indicator still yields `success: false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T> ApiEnvelope<T> {
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>, data: T) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiEnvelope<U> {
        ApiEnvelope {
            success: self.success,
            message: self.message,
            data: f(self.data),
        }
    }
}

/// Liveness of the image-generation backend behind the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComfyUiStatus {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub message: String,
}

/// Body of the health-check call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub comfyui_status: ComfyUiStatus,
}

impl HealthReport {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == HEALTHY_STATUS
    }

    /// Report substituted when the backend could not be reached.
    #[must_use]
    pub fn unreachable() -> Self {
        Self {
            status: "error".to_string(),
            message: CONNECTION_FAILED_MESSAGE.to_string(),
            comfyui_status: ComfyUiStatus {
                running: false,
                message: UNREACHABLE_SERVICE_MESSAGE.to_string(),
            },
        }
    }
}

impl ApiEnvelope<HealthReport> {
    /// Wrap a backend report; success only when the backend says it is healthy.
    #[must_use]
    pub fn from_report(report: HealthReport) -> Self {
        Self {
            success: report.is_healthy(),
            message: Some(report.message.clone()),
            data: report,
        }
    }

    /// Canonical envelope for a failed health probe.
    #[must_use]
    pub fn degraded() -> Self {
        Self::failed(CONNECTION_FAILED_MESSAGE, HealthReport::unreachable())
    }
}
