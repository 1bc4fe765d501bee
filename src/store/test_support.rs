//! Scripted transport double for store tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::TransportError;
use crate::transport::{HttpMethod, Transport};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
}

enum Scripted {
    Ok(Value),
    Err { status: u16, message: String },
}

/// Answers from a route table. While offline every call fails with a
/// network error; unrouted calls answer 404.
pub struct MockTransport {
    online: AtomicBool,
    routes: Mutex<HashMap<(HttpMethod, String), Scripted>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn online() -> Self {
        Self {
            online: AtomicBool::new(true),
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
        }
    }

    pub fn offline() -> Self {
        let transport = Self::online();
        transport.set_online(false);
        transport
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Every call sleeps this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn respond(&self, method: HttpMethod, path: &str, value: Value) {
        self.routes
            .lock()
            .unwrap()
            .insert((method, path.to_string()), Scripted::Ok(value));
    }

    pub fn fail(&self, method: HttpMethod, path: &str, status: u16, message: &str) {
        self.routes.lock().unwrap().insert(
            (method, path.to_string()),
            Scripted::Err {
                status,
                message: message.to_string(),
            },
        );
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// `"METHOD /path"` for every recorded call, in order.
    pub fn paths(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| format!("{} {}", c.method, c.path))
            .collect()
    }

    pub fn count(&self, method: HttpMethod, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    pub fn last_body(&self, method: HttpMethod, path: &str) -> Option<Value> {
        self.calls()
            .iter()
            .rev()
            .find(|c| c.method == method && c.path == path)
            .and_then(|c| c.body.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        self.calls.lock().unwrap().push(RecordedCall {
            method,
            path: path.to_string(),
            body,
        });
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if !self.online.load(Ordering::SeqCst) {
            return Err(TransportError::Network("connection refused".to_string()));
        }
        match self.routes.lock().unwrap().get(&(method, path.to_string())) {
            Some(Scripted::Ok(value)) => Ok(value.clone()),
            Some(Scripted::Err { status, message }) => Err(TransportError::Status {
                status: *status,
                message: message.clone(),
            }),
            None => Err(TransportError::Status {
                status: 404,
                message: "Not found".to_string(),
            }),
        }
    }
}
