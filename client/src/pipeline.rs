//! The interceptor pipeline every call passes through.
//!
//! ```text
//! OutboundRequest -> prepare() -> transmit() -> Outcome -> settle() -> Result<Value, ApiError>
//!                    (bearer,                              (unwrap payload, or classify,
//!                     content-type)                         log, and on 401 logout + event)
//! ```
//!
//! Each call is Pending until `settle` turns it into Fulfilled or Rejected. There is no
//! retry state; recovery is the caller's decision.

use std::sync::Arc;

use atelier_config::ClientSettings;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use url::Url;

use crate::error::{ApiError, Outcome, classify};
use crate::request::{FormPart, FormValue, OutboundRequest, RequestBody};
use crate::session::SessionHolder;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;
const SESSION_EVENT_CAPACITY: usize = 16;

/// Emitted by the pipeline for the outer layer to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The backend rejected our credentials; the session has already been cleared.
    /// The outer layer should send the user to `login_path`.
    Invalidated { login_path: String },
}

/// HTTP client bound to one backend and one session.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    login_path: String,
    session: Arc<SessionHolder>,
    events: broadcast::Sender<SessionEvent>,
}

impl ApiClient {
    pub fn new(settings: &ClientSettings, session: Arc<SessionHolder>) -> Result<Self, reqwest::Error> {
        let http = crate::http_client(settings.timeout)?;
        Ok(Self::with_http(http, settings, session))
    }

    /// Use an already-built transport (shared connection pool, custom TLS).
    #[must_use]
    pub fn with_http(
        http: reqwest::Client,
        settings: &ClientSettings,
        session: Arc<SessionHolder>,
    ) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            login_path: settings.login_path.clone(),
            session,
            events,
        }
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionHolder> {
        &self.session
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Receive session events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Outbound stage: attach the bearer credential and let the transport own the
    /// multipart content type.
    pub fn prepare(&self, request: &mut OutboundRequest) {
        if let Some(token) = self.session.token() {
            match HeaderValue::from_str(&token.authorization()) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    request.headers.insert(AUTHORIZATION, value);
                }
                Err(_) => {
                    tracing::warn!("Session token is not a valid header value; sending without it");
                }
            }
        }

        if request.body.is_multipart() {
            request.headers.remove(CONTENT_TYPE);
        }
    }

    /// Inbound stage: unwrap a success, or classify and react to a failure.
    pub fn settle(&self, outcome: Outcome) -> Result<Value, ApiError> {
        if let Some(error) = classify(&outcome) {
            self.on_rejected(&error);
            return Err(error);
        }
        Ok(outcome.into_payload().unwrap_or(Value::Null))
    }

    fn on_rejected(&self, error: &ApiError) {
        error.log();

        if matches!(error, ApiError::Unauthorized) {
            self.session.logout();
            let event = SessionEvent::Invalidated {
                login_path: self.login_path.clone(),
            };
            if self.events.send(event).is_err() {
                tracing::debug!("No subscriber for session invalidation");
            }
        }
    }

    /// Run a request through the full pipeline and return the raw payload.
    pub async fn execute(&self, mut request: OutboundRequest) -> Result<Value, ApiError> {
        self.prepare(&mut request);
        tracing::debug!(method = %request.method, path = %request.path, "Sending request");
        let outcome = self.transmit(request).await;
        self.settle(outcome)
    }

    /// Run a request and decode the payload into `T`.
    ///
    /// A payload that does not match `T` is reported as [`ApiError::LocalRequest`].
    pub async fn request<T: DeserializeOwned>(&self, request: OutboundRequest) -> Result<T, ApiError> {
        let payload = self.execute(request).await?;
        serde_json::from_value(payload).map_err(|e| {
            let error = ApiError::LocalRequest {
                message: format!("unexpected response shape: {e}"),
            };
            error.log();
            error
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(OutboundRequest::get(path)).await
    }

    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let request = query
            .iter()
            .fold(OutboundRequest::get(path), |request, (key, value)| {
                request.with_query(*key, *value)
            });
        self.request(request).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = encode_body(body)?;
        self.request(OutboundRequest::post(path).with_json(body)).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = encode_body(body)?;
        self.request(OutboundRequest::put(path).with_json(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(OutboundRequest::delete(path)).await
    }

    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        parts: Vec<FormPart>,
    ) -> Result<T, ApiError> {
        self.request(OutboundRequest::post(path).with_multipart(parts))
            .await
    }

    fn url_for(&self, path: &str, query: &[(String, String)]) -> Result<Url, url::ParseError> {
        let mut url = if path.starts_with("http://") || path.starts_with("https://") {
            Url::parse(path)?
        } else {
            Url::parse(&format!(
                "{}/{}",
                self.base_url,
                path.trim_start_matches('/')
            ))?
        };

        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url)
    }

    async fn transmit(&self, request: OutboundRequest) -> Outcome {
        let url = match self.url_for(&request.path, &request.query) {
            Ok(url) => url,
            Err(e) => return Outcome::LocalFault(format!("invalid URL for {}: {e}", request.path)),
        };

        let builder = self
            .http
            .request(request.method, url)
            .headers(request.headers);

        let builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(&body),
            RequestBody::Multipart(parts) => match build_form(parts) {
                Ok(form) => builder.multipart(form),
                Err(e) => return Outcome::LocalFault(e.to_string()),
            },
        };

        match builder.send().await {
            Ok(response) => read_outcome(response).await,
            Err(e) if e.is_builder() => Outcome::LocalFault(e.to_string()),
            Err(e) => Outcome::NoResponse(e.to_string()),
        }
    }
}

fn encode_body<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| {
        let error = ApiError::LocalRequest {
            message: format!("failed to encode request body: {e}"),
        };
        error.log();
        error
    })
}

fn build_form(parts: Vec<FormPart>) -> Result<Form, reqwest::Error> {
    let mut form = Form::new();
    for FormPart { name, value } in parts {
        form = match value {
            FormValue::Text(text) => form.text(name, text),
            FormValue::File {
                bytes,
                file_name,
                mime,
            } => {
                let mut part = Part::bytes(bytes);
                if let Some(file_name) = file_name {
                    part = part.file_name(file_name);
                }
                if let Some(mime) = mime {
                    part = part.mime_str(&mime)?;
                }
                form.part(name, part)
            }
        };
    }
    Ok(form)
}

async fn read_outcome(response: reqwest::Response) -> Outcome {
    let status = response.status();
    if status.is_success() {
        return match response.bytes().await {
            Ok(body) => Outcome::Success(decode_payload(&body)),
            Err(e) => Outcome::NoResponse(format!("failed to read response body: {e}")),
        };
    }

    let body = read_capped_body(response).await;
    Outcome::TransportFailure {
        status,
        payload: serde_json::from_slice(&body).ok(),
    }
}

/// Empty bodies decode to `null`; bodies that are not JSON come back as a JSON string.
fn decode_payload(body: &[u8]) -> Value {
    if body.trim_ascii().is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

async fn read_capped_body(response: reqwest::Response) -> Vec<u8> {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            break;
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryTokenStore;
    use reqwest::StatusCode;
    use serde_json::json;

    fn client_with(session: SessionHolder) -> ApiClient {
        let settings = ClientSettings {
            base_url: "http://127.0.0.1:5001/".to_string(),
            ..ClientSettings::default()
        };
        ApiClient::with_http(reqwest::Client::new(), &settings, Arc::new(session))
    }

    #[test]
    fn prepare_injects_bearer_when_authenticated() {
        let client = client_with(SessionHolder::hydrated(MemoryTokenStore::with_token("tok")));
        let mut request = OutboundRequest::get("/api/user/active");
        client.prepare(&mut request);
        assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), "Bearer tok");
        assert!(request.headers.get(AUTHORIZATION).unwrap().is_sensitive());
    }

    #[test]
    fn prepare_leaves_anonymous_requests_alone() {
        let client = client_with(SessionHolder::in_memory());
        let mut request = OutboundRequest::get("/api/health");
        client.prepare(&mut request);
        assert!(request.headers.get(AUTHORIZATION).is_none());
        assert_eq!(request.headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn prepare_strips_content_type_for_multipart() {
        let client = client_with(SessionHolder::in_memory());
        let mut request = OutboundRequest::post("/images/upload")
            .with_multipart(vec![FormPart::file("file", "a.png", vec![0x89, 0x50])]);
        assert!(request.headers.contains_key(CONTENT_TYPE));
        client.prepare(&mut request);
        assert!(!request.headers.contains_key(CONTENT_TYPE));
    }

    #[test]
    fn url_for_joins_base_and_query() {
        let client = client_with(SessionHolder::in_memory());
        let url = client
            .url_for("/images", &[("page".to_string(), "1".to_string())])
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:5001/images?page=1");

        let url = client.url_for("api/health", &[]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:5001/api/health");

        let url = client.url_for("https://cdn.example.com/x", &[]).unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/x");
    }

    #[test]
    fn settle_unwraps_success_payload() {
        let client = client_with(SessionHolder::in_memory());
        let payload = client.settle(Outcome::Success(json!({"id": 4}))).unwrap();
        assert_eq!(payload, json!({"id": 4}));
    }

    #[test]
    fn settle_unauthorized_logs_out_and_emits_once() {
        let client = client_with(SessionHolder::hydrated(MemoryTokenStore::with_token("tok")));
        let mut events = client.subscribe();

        let err = client
            .settle(Outcome::TransportFailure {
                status: StatusCode::UNAUTHORIZED,
                payload: None,
            })
            .unwrap_err();

        assert_eq!(err, ApiError::Unauthorized);
        assert!(client.session().token().is_none());
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Invalidated {
                login_path: "/login".to_string()
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn settle_other_failures_leave_session_untouched() {
        let client = client_with(SessionHolder::hydrated(MemoryTokenStore::with_token("tok")));
        let mut events = client.subscribe();

        for outcome in [
            Outcome::TransportFailure {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                payload: None,
            },
            Outcome::TransportFailure {
                status: StatusCode::FORBIDDEN,
                payload: None,
            },
            Outcome::NoResponse("offline".to_string()),
            Outcome::LocalFault("bad".to_string()),
        ] {
            assert!(client.settle(outcome).is_err());
        }

        assert_eq!(client.session().token().unwrap().as_str(), "tok");
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn decode_payload_handles_empty_and_text() {
        assert_eq!(decode_payload(b""), Value::Null);
        assert_eq!(decode_payload(b"  \n"), Value::Null);
        assert_eq!(decode_payload(b"[1,2]"), json!([1, 2]));
        assert_eq!(decode_payload(b"ok"), json!("ok"));
    }

    #[test]
    fn invalid_mime_is_a_local_fault() {
        let parts = vec![FormPart::file("file", "a.bin", vec![1]).with_mime("not a mime")];
        assert!(build_form(parts).is_err());
    }
}
