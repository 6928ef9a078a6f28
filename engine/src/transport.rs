//! The network transport consumed by save, fetch and destroy.
//!
//! The engine never talks to the network itself. A [`Transport`] sends one
//! REST request and resolves with the decoded JSON body; any rejection is
//! treated as a failed round trip.

use async_trait::async_trait;
use thiserror::Error;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials attached to every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub use_master_key: bool,
    pub session_token: Option<String>,
    pub installation_id: Option<String>,
}

/// A rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport error {code}: {message}")]
pub struct TransportError {
    /// Backend error code, or one of the associated constants.
    pub code: i32,
    pub message: String,
}

impl TransportError {
    pub const OTHER_CAUSE: i32 = -1;
    pub const CONNECTION_FAILED: i32 = 100;
    pub const OBJECT_NOT_FOUND: i32 = 101;
    pub const INVALID_JSON: i32 = 107;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Sends REST requests to the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        options: &RequestOptions,
    ) -> Result<serde_json::Value, TransportError>;
}
