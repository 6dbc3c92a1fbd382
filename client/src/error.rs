//! Inbound outcomes and their classification.
//!
//! Classification is pure: it never touches the session or emits events. The pipeline
//! reacts to the classified kind.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Fallback text when a 4xx response carries no `message` field.
pub const GENERIC_FAILURE_MESSAGE: &str = "Request failed: Please try again";

/// What came back from the transport for a single call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// 2xx with the decoded payload.
    Success(Value),
    /// Non-2xx. `payload` is `None` when the body was empty or not JSON.
    TransportFailure {
        status: StatusCode,
        payload: Option<Value>,
    },
    /// The request went out but no response arrived (offline, refused, timed out).
    NoResponse(String),
    /// The request could not be built or sent at all.
    LocalFault(String),
}

impl Outcome {
    /// The payload of a success, `None` for every failure.
    #[must_use]
    pub fn into_payload(self) -> Option<Value> {
        match self {
            Self::Success(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Closed set of failure kinds surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("server error ({status})")]
    ServerError { status: StatusCode },
    #[error("{message}")]
    ClientDomain { status: StatusCode, message: String },
    #[error("network unreachable: {detail}")]
    NetworkUnreachable { detail: String },
    #[error("request error: {message}")]
    LocalRequest { message: String },
}

/// Map an outcome to its error kind. `None` for success.
#[must_use]
pub fn classify(outcome: &Outcome) -> Option<ApiError> {
    match outcome {
        Outcome::Success(_) => None,
        Outcome::TransportFailure { status, payload } => Some(classify_status(*status, payload.as_ref())),
        Outcome::NoResponse(detail) => Some(ApiError::NetworkUnreachable {
            detail: detail.clone(),
        }),
        Outcome::LocalFault(message) => Some(ApiError::LocalRequest {
            message: message.clone(),
        }),
    }
}

fn classify_status(status: StatusCode, payload: Option<&Value>) -> ApiError {
    match status.as_u16() {
        401 => ApiError::Unauthorized,
        403 => ApiError::Forbidden,
        404 => ApiError::NotFound,
        code if code >= 500 => ApiError::ServerError { status },
        _ => {
            let message = payload
                .and_then(|payload| payload.get("message"))
                .and_then(Value::as_str)
                .filter(|message| !message.is_empty())
                .unwrap_or(GENERIC_FAILURE_MESSAGE);
            ApiError::ClientDomain {
                status,
                message: message.to_string(),
            }
        }
    }
}

impl ApiError {
    /// Short stable name, used as a structured log field.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::ServerError { .. } => "server_error",
            Self::ClientDomain { .. } => "client_domain",
            Self::NetworkUnreachable { .. } => "network_unreachable",
            Self::LocalRequest { .. } => "local_request",
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            Self::Forbidden => Some(StatusCode::FORBIDDEN),
            Self::NotFound => Some(StatusCode::NOT_FOUND),
            Self::ServerError { status } | Self::ClientDomain { status, .. } => Some(*status),
            Self::NetworkUnreachable { .. } | Self::LocalRequest { .. } => None,
        }
    }

    /// The fixed diagnostic line for this kind.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Unauthorized => "Authentication required: Please log in again".to_string(),
            Self::Forbidden => {
                "Forbidden: You do not have permission to perform this action".to_string()
            }
            Self::NotFound => "Not Found: The requested resource was not found".to_string(),
            Self::ServerError { .. } => "Server Error: Please try again later".to_string(),
            Self::ClientDomain { message, .. } => format!("Error: {message}"),
            Self::NetworkUnreachable { .. } => {
                "Network Error: Please check your internet connection".to_string()
            }
            Self::LocalRequest { message } => format!("Request Error: {message}"),
        }
    }

    pub fn log(&self) {
        let diagnostic = self.diagnostic();
        match self {
            Self::NetworkUnreachable { detail } => {
                tracing::error!(kind = self.kind(), %detail, "{diagnostic}");
            }
            _ => match self.status() {
                Some(status) => tracing::error!(kind = self.kind(), status = status.as_u16(), "{diagnostic}"),
                None => tracing::error!(kind = self.kind(), "{diagnostic}"),
            },
        }
    }
}
