//! Backend client for Atelier.
//!
//! # Architecture
//!
//! - [`SessionHolder`] - bearer token and identity, mirrored to a durable [`TokenStore`]
//! - [`classify`] - pure mapping from a transport [`Outcome`] to an [`ApiError`]
//! - [`ApiClient`] - the interceptor pipeline: credential injection on the way out,
//!   payload unwrapping or classification on the way back
//! - [`check_health`] - liveness probe normalized into an [`ApiEnvelope`]
//!
//! # Error Handling
//!
//! Every rejected call is logged once with a fixed line for its kind and returned to the
//! caller unchanged. The only reaction the pipeline performs itself is for
//! [`ApiError::Unauthorized`]: the session is cleared and a
//! [`SessionEvent::Invalidated`] is broadcast so the outer layer can send the user to
//! the login page. Nothing is retried.

pub mod error;
pub mod health;
pub mod pipeline;
pub mod request;
pub mod session;

use std::time::Duration;

pub use atelier_types::{self, ApiEnvelope, BearerToken, HealthReport, Identity};
pub use error::{ApiError, Outcome, classify};
pub use health::{HEALTH_PATH, check_health, normalize_health};
pub use pipeline::{ApiClient, SessionEvent};
pub use request::{FormPart, FormValue, OutboundRequest, RequestBody};
pub use session::{FileTokenStore, MemoryTokenStore, SessionHolder, TokenStore};

const CONNECT_TIMEOUT_SECS: u64 = 10;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_MAX_IDLE_PER_HOST: usize = 16;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// Build the transport. `timeout` bounds the whole call; exceeding it is reported as
/// [`ApiError::NetworkUnreachable`].
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};

    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
        .timeout(timeout)
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
        .user_agent(concat!("atelier/", env!("CARGO_PKG_VERSION")))
        .default_headers(default_headers)
        .build()
}
