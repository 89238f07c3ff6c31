//! Resilient HTTP transport for remote REST APIs.
//!
//! This crate owns the request/retry layer underneath every remote call the
//! system makes:
//! - **Requests** (`ApiRequest`/`ApiResponse`) - ephemeral method/path/body
//!   pairs with content-type-aware body decoding
//! - **Retry** (`retry`) - bounded attempts with bounded exponential backoff,
//!   applied only to transport-level faults
//! - **HTTP** (`http`) - the `reqwest`-backed implementation with a lazily
//!   created, explicitly owned connection pool
//!
//! # Failure classification
//!
//! Connect and timeout failures are transient: they retry up to the attempt
//! bound and, once exhausted, surface as `TransportError::Transient` carrying
//! the underlying fault. Any HTTP response outside [200, 300) is terminal and
//! surfaces immediately as `TransportError::Api` with the decoded body as
//! details. Transient faults are never disguised as API errors.

pub mod http;
pub mod retry;

use async_trait::async_trait;
use dealflow_core::ApiError;
use serde_json::Value;
use thiserror::Error;

pub use http::HttpTransport;
pub use retry::RetryPolicy;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// One outbound request. Owned by a single `execute` call and never retained
/// beyond it.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), headers: Vec::new(), query: Vec::new(), body: None }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Per-request header, applied after the transport's defaults.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Decoded response body. JSON content types decode to `Json`; a failed JSON
/// decode falls back to the raw text instead of failing the call.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Empty,
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) | Self::Empty => None,
        }
    }

    pub fn into_details(self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(text) if !text.is_empty() => Some(Value::String(text)),
            Self::Text(_) | Self::Empty => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl ApiResponse {
    pub fn json(&self) -> Option<&Value> {
        self.body.as_json()
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// Terminal: the remote answered outside [200, 300).
    #[error(transparent)]
    Api(#[from] ApiError),
    /// Connect/timeout faults that survived every retry attempt. Carries the
    /// underlying fault, not an `ApiError`.
    #[error("transient transport failure after {attempts} attempt(s): {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: BoxError,
    },
    /// The underlying HTTP client could not be constructed.
    #[error("http client construction failed: {0}")]
    Client(#[source] reqwest::Error),
}

/// Seam between callers and the wire. Production code uses `HttpTransport`;
/// tests substitute scripted implementations.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}
