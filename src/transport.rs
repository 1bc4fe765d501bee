//! Request/response transport to the authoritative remote store.
//!
//! The stores only ever see [`Transport`]: four verbs that either return a
//! decoded JSON payload or fail with a [`TransportError`]. [`HttpTransport`]
//! is the production implementation; it attaches the stored bearer token to
//! every request and reports each exchange to an optional
//! [`TransportObserver`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use crate::errors::TransportError;
use crate::store::cache::{CacheKey, PersistedCache};

const DEFAULT_ERROR_MESSAGE: &str = "Request failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Abstraction over the remote store for testability.
/// Real implementation: `HttpTransport`. Test double: `MockTransport`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError>;

    async fn get(&self, path: &str) -> Result<Value, TransportError> {
        self.execute(HttpMethod::Get, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, TransportError> {
        self.execute(HttpMethod::Post, path, Some(body)).await
    }

    async fn put(&self, path: &str, body: Value) -> Result<Value, TransportError> {
        self.execute(HttpMethod::Put, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> Result<Value, TransportError> {
        self.execute(HttpMethod::Delete, path, None).await
    }
}

/// One completed exchange, as reported to a [`TransportObserver`].
#[derive(Debug)]
pub struct RequestEvent<'a> {
    pub method: HttpMethod,
    pub path: &'a str,
    pub status: Option<u16>,
    pub elapsed: Duration,
    pub error: Option<&'a TransportError>,
}

/// Observability hook invoked after every request.
pub trait TransportObserver: Send + Sync {
    fn observe(&self, event: &RequestEvent<'_>);
}

/// Logs every exchange through `tracing` at debug level.
pub struct TracingObserver;

impl TransportObserver for TracingObserver {
    fn observe(&self, event: &RequestEvent<'_>) {
        match event.error {
            None => tracing::debug!(
                method = %event.method,
                path = event.path,
                status = event.status,
                elapsed_ms = event.elapsed.as_millis() as u64,
                "request ok"
            ),
            Some(err) => tracing::debug!(
                method = %event.method,
                path = event.path,
                status = event.status,
                elapsed_ms = event.elapsed.as_millis() as u64,
                error = %err,
                "request failed"
            ),
        }
    }
}

/// `reqwest`-backed transport. The bearer token is read from the persisted
/// cache on every request so a login in one store is picked up immediately.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    cache: Arc<dyn PersistedCache>,
    observer: Option<Arc<dyn TransportObserver>>,
}

impl HttpTransport {
    pub fn new(
        base_url: &str,
        cache: Arc<dyn PersistedCache>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache,
            observer: None,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransportObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Reads the token inline; see [`crate::store::SqliteCache`] for why
    /// cache access is synchronous.
    fn token(&self) -> Option<String> {
        match self.cache.get(CacheKey::Token) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read auth token");
                None
            }
        }
    }

    async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> (Option<u16>, Result<Value, TransportError>) {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method.to_reqwest(), &url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = self.token() {
            request = request.bearer_auth(token);
        }
        if matches!(method, HttpMethod::Post | HttpMethod::Put) {
            request = request.json(&body.unwrap_or_else(|| Value::Object(Default::default())));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return (None, Err(TransportError::Network(e.to_string()))),
        };
        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return (
                    Some(status.as_u16()),
                    Err(TransportError::Network(e.to_string())),
                );
            }
        };

        if !status.is_success() {
            return (
                Some(status.as_u16()),
                Err(TransportError::Status {
                    status: status.as_u16(),
                    message: extract_error_message(&text),
                }),
            );
        }

        let result = if text.trim().is_empty() {
            Ok(Value::Null)
        } else {
            serde_json::from_str(&text).map_err(|e| TransportError::Decode {
                path: path.to_string(),
                message: e.to_string(),
            })
        };
        (Some(status.as_u16()), result)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        let started = Instant::now();
        let (status, result) = self.send(method, path, body).await;
        if let Some(observer) = &self.observer {
            observer.observe(&RequestEvent {
                method,
                path,
                status,
                elapsed: started.elapsed(),
                error: result.as_ref().err(),
            });
        }
        result
    }
}

/// Pulls a human-readable message out of an error body: a JSON `error` or
/// `message` field first, then the raw body, then a generic fallback.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        for field in ["error", "message"] {
            if let Some(msg) = json.get(field).and_then(Value::as_str)
                && !msg.is_empty()
            {
                return msg.to_string();
            }
        }
        return DEFAULT_ERROR_MESSAGE.to_string();
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        DEFAULT_ERROR_MESSAGE.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::cache::MemoryCache;
    use std::sync::Mutex;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport_for(server: &MockServer, cache: Arc<MemoryCache>) -> HttpTransport {
        HttpTransport::new(&server.uri(), cache, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_extract_error_prefers_error_field() {
        assert_eq!(
            extract_error_message(r#"{"error":"Board not found","message":"other"}"#),
            "Board not found"
        );
    }

    #[test]
    fn test_extract_error_falls_back_to_message_field() {
        assert_eq!(
            extract_error_message(r#"{"message":"Forbidden"}"#),
            "Forbidden"
        );
    }

    #[test]
    fn test_extract_error_uses_raw_body_when_not_json() {
        assert_eq!(extract_error_message("Bad Gateway\n"), "Bad Gateway");
    }

    #[test]
    fn test_extract_error_defaults_when_nothing_useful() {
        assert_eq!(extract_error_message(""), "Request failed");
        assert_eq!(extract_error_message(r#"{"code":7}"#), "Request failed");
    }

    #[tokio::test]
    async fn test_get_decodes_json_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/boards"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": "b1"}])))
            .mount(&server)
            .await;

        let transport = transport_for(&server, Arc::new(MemoryCache::new()));
        let value = transport.get("/api/boards").await.unwrap();
        assert_eq!(value[0]["id"], "b1");
    }

    #[tokio::test]
    async fn test_attaches_bearer_token_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/notifications"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let cache = Arc::new(MemoryCache::new());
        cache.set(CacheKey::Token, "secret-token").unwrap();
        let transport = transport_for(&server, cache);
        transport.get("/api/notifications").await.unwrap();
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/boards"))
            .and(body_json(serde_json::json!({"name": "Sprint 1"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "b9"})))
            .mount(&server)
            .await;

        let transport = transport_for(&server, Arc::new(MemoryCache::new()));
        let value = transport
            .post("/api/boards", serde_json::json!({"name": "Sprint 1"}))
            .await
            .unwrap();
        assert_eq!(value["id"], "b9");
    }

    #[tokio::test]
    async fn test_empty_success_body_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/boards/b1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let transport = transport_for(&server, Arc::new(MemoryCache::new()));
        assert_eq!(transport.delete("/api/boards/b1").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_non_success_status_carries_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/boards/b1"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(serde_json::json!({"error": "Not your board"})),
            )
            .mount(&server)
            .await;

        let transport = transport_for(&server, Arc::new(MemoryCache::new()));
        let err = transport
            .put("/api/boards/b1", serde_json::json!({"name": "x"}))
            .await
            .unwrap_err();
        match err {
            TransportError::Status { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Not your board");
            }
            other => panic!("Expected Status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        // Nothing listens on the discard port.
        let transport = HttpTransport::new(
            "http://127.0.0.1:9",
            Arc::new(MemoryCache::new()),
            Duration::from_secs(2),
        )
        .unwrap();
        let err = transport.get("/api/boards").await.unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));
        assert!(!err.is_rejection());
    }

    #[tokio::test]
    async fn test_invalid_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/boards"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let transport = transport_for(&server, Arc::new(MemoryCache::new()));
        let err = transport.get("/api/boards").await.unwrap_err();
        assert!(matches!(err, TransportError::Decode { .. }));
    }

    struct Recorder(Mutex<Vec<(String, Option<u16>, bool)>>);

    impl TransportObserver for Recorder {
        fn observe(&self, event: &RequestEvent<'_>) {
            self.0.lock().unwrap().push((
                format!("{} {}", event.method, event.path),
                event.status,
                event.error.is_some(),
            ));
        }
    }

    #[tokio::test]
    async fn test_observer_sees_every_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let transport =
            transport_for(&server, Arc::new(MemoryCache::new())).with_observer(recorder.clone());
        transport.get("/ok").await.unwrap();
        transport.get("/missing").await.unwrap_err();

        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                ("GET /ok".to_string(), Some(200), false),
                ("GET /missing".to_string(), Some(404), true),
            ]
        );
    }
}
