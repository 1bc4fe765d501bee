//! Ordered remote-candidate chains ending in a local mutation.
//!
//! A mutation lists the endpoint shapes it knows about, most current first.
//! [`FallbackChain::run`] tries them in order and stops at the first success;
//! any failure (network, status, undecodable body) advances to the next
//! candidate. When every candidate failed the caller gets
//! [`Resolution::Local`] and applies the change to its mirror instead.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::TransportError;
use crate::transport::{HttpMethod, Transport};

/// One remote endpoint shape.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
}

impl RemoteCall {
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Put,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Delete,
            path: path.into(),
            body: None,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        transport: &dyn Transport,
    ) -> Result<T, TransportError> {
        let value = transport
            .execute(self.method, &self.path, self.body.clone())
            .await?;
        serde_json::from_value(value).map_err(|e| TransportError::Decode {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }
}

/// Where a mutation ended up.
#[derive(Debug, PartialEq)]
pub enum Resolution<T> {
    /// A remote candidate accepted the write; the payload is its response.
    Remote(T),
    /// Every remote candidate failed; apply the change locally.
    Local,
}

impl<T> Resolution<T> {
    pub fn is_remote(&self) -> bool {
        matches!(self, Resolution::Remote(_))
    }
}

#[derive(Debug, Clone)]
pub struct FallbackChain {
    operation: &'static str,
    candidates: Vec<RemoteCall>,
}

impl FallbackChain {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            candidates: Vec::new(),
        }
    }

    /// Appends a candidate; earlier candidates have priority.
    pub fn then(mut self, call: RemoteCall) -> Self {
        self.candidates.push(call);
        self
    }

    /// Tries every candidate, ignoring the response body.
    pub async fn run(&self, transport: &dyn Transport) -> Resolution<()> {
        match self.run_as::<serde::de::IgnoredAny>(transport).await {
            Resolution::Remote(_) => Resolution::Remote(()),
            Resolution::Local => Resolution::Local,
        }
    }

    /// Tries every candidate; a response that does not decode as `T` counts
    /// as a failure of that candidate.
    pub async fn run_as<T: DeserializeOwned>(&self, transport: &dyn Transport) -> Resolution<T> {
        for (attempt, call) in self.candidates.iter().enumerate() {
            match call.send::<T>(transport).await {
                Ok(response) => {
                    tracing::debug!(
                        operation = self.operation,
                        attempt,
                        path = %call.path,
                        "remote write accepted"
                    );
                    return Resolution::Remote(response);
                }
                Err(e) => {
                    tracing::warn!(
                        operation = self.operation,
                        attempt,
                        method = %call.method,
                        path = %call.path,
                        error = %e,
                        "remote write failed, trying next candidate"
                    );
                }
            }
        }
        tracing::info!(operation = self.operation, "applying mutation locally");
        Resolution::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::MockTransport;
    use serde::Deserialize;
    use serde_json::json;

    #[tokio::test]
    async fn test_first_successful_candidate_wins() {
        let transport = MockTransport::online();
        transport.respond(HttpMethod::Put, "/api/boards/b1", json!({}));
        transport.respond(HttpMethod::Post, "/api/boards/b1/rename", json!({}));

        let chain = FallbackChain::new("rename_board")
            .then(RemoteCall::put("/api/boards/b1", json!({"name": "x"})))
            .then(RemoteCall::post("/api/boards/b1/rename", json!({"name": "x"})));

        assert!(chain.run(&transport).await.is_remote());
        assert_eq!(transport.count(HttpMethod::Put, "/api/boards/b1"), 1);
        assert_eq!(transport.count(HttpMethod::Post, "/api/boards/b1/rename"), 0);
    }

    #[tokio::test]
    async fn test_any_failure_advances_to_next_candidate() {
        let transport = MockTransport::online();
        transport.fail(HttpMethod::Put, "/api/boards/b1", 500, "boom");
        transport.respond(HttpMethod::Post, "/api/boards/b1/rename", json!({}));

        let chain = FallbackChain::new("rename_board")
            .then(RemoteCall::put("/api/boards/b1", json!({"name": "x"})))
            .then(RemoteCall::post("/api/boards/b1/rename", json!({"name": "x"})));

        assert!(chain.run(&transport).await.is_remote());
        assert_eq!(
            transport.paths(),
            vec!["PUT /api/boards/b1", "POST /api/boards/b1/rename"]
        );
    }

    #[tokio::test]
    async fn test_exhausted_chain_resolves_locally() {
        let transport = MockTransport::offline();
        let chain = FallbackChain::new("delete_column")
            .then(RemoteCall::delete("/api/boards/b1/columns/c1"))
            .then(RemoteCall::delete("/api/columns/c1"));

        assert_eq!(chain.run(&transport).await, Resolution::Local);
        assert_eq!(transport.calls().len(), 2);
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Created {
        id: String,
    }

    #[tokio::test]
    async fn test_undecodable_response_counts_as_failure() {
        let transport = MockTransport::online();
        transport.respond(HttpMethod::Post, "/api/boards", json!({"ok": true}));

        let chain = FallbackChain::new("create_board")
            .then(RemoteCall::post("/api/boards", json!({"name": "x"})));

        assert_eq!(chain.run_as::<Created>(&transport).await, Resolution::Local);
    }

    #[tokio::test]
    async fn test_decoded_response_is_returned() {
        let transport = MockTransport::online();
        transport.respond(HttpMethod::Post, "/api/boards", json!({"id": "srv-1"}));

        let chain = FallbackChain::new("create_board")
            .then(RemoteCall::post("/api/boards", json!({"name": "x"})));

        assert_eq!(
            chain.run_as::<Created>(&transport).await,
            Resolution::Remote(Created { id: "srv-1".into() })
        );
    }
}
