//! Typed error hierarchy for boardsync.
//!
//! Two enums cover the two failure surfaces:
//! - `TransportError`: anything that goes wrong talking to the remote store
//! - `ConfigError`: invalid values in `boardsync.toml` or the environment
//!
//! Cache I/O and the CLI use `anyhow` with context instead.

use thiserror::Error;

/// A failed remote call, normalized across network and HTTP failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request never produced an HTTP response (DNS, refused, timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    /// The response body could not be decoded into the expected shape.
    #[error("Failed to decode response from {path}: {message}")]
    Decode { path: String, message: String },
}

impl TransportError {
    /// Human-readable message, without the status suffix.
    pub fn message(&self) -> &str {
        match self {
            TransportError::Network(msg) => msg,
            TransportError::Status { message, .. } => message,
            TransportError::Decode { message, .. } => message,
        }
    }

    /// True when the server was reached and refused the request itself
    /// (4xx). Connection failures and 5xx answers mean "unreachable".
    pub fn is_rejection(&self) -> bool {
        matches!(self, TransportError::Status { status, .. } if (400..500).contains(status))
    }
}

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid API base '{value}': {message}")]
    InvalidApiBase { value: String, message: String },

    #[error("Invalid refresh interval '{value}': must be between 1 and {max} seconds")]
    InvalidRefreshInterval { value: String, max: u64 },
}
