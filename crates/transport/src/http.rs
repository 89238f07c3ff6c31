use std::time::Duration;

use async_trait::async_trait;
use dealflow_core::ApiError;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::OnceCell;
use tracing::error;

use crate::retry::{run_with_retry, AttemptFailure};
use crate::{ApiRequest, ApiResponse, Method, ResponseBody, RetryPolicy, Transport, TransportError};

impl Method {
    fn as_reqwest(&self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

/// `reqwest`-backed transport bound to one base endpoint.
///
/// The connection pool is created lazily on the first call and shared by
/// every call thereafter; dropping the transport releases it on all exit
/// paths. Safe to share across concurrent runs: credentials and the pool are
/// read-only after construction.
pub struct HttpTransport {
    base_url: String,
    headers: Vec<(String, String)>,
    timeout: Duration,
    retry: RetryPolicy,
    client: OnceCell<Client>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers: Vec::new(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            client: OnceCell::new(),
        }
    }

    /// Static bearer credential sent with every request. Never refreshed.
    pub fn with_bearer_token(mut self, token: &SecretString) -> Self {
        self.headers
            .push(("Authorization".to_string(), format!("Bearer {}", token.expose_secret())));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn client(&self) -> Result<&Client, TransportError> {
        self.client
            .get_or_try_init(|| async { Client::builder().timeout(self.timeout).build() })
            .await
            .map_err(TransportError::Client)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let client = self.client().await?.clone();
        run_with_retry(&self.retry, || {
            send_once(client.clone(), &self.base_url, &self.headers, request.clone())
        })
        .await
    }
}

async fn send_once(
    client: Client,
    base_url: &str,
    headers: &[(String, String)],
    request: ApiRequest,
) -> Result<ApiResponse, AttemptFailure> {
    let url = format!("{}{}", base_url, normalize_path(&request.path));
    let mut builder = client.request(request.method.as_reqwest(), &url);
    for (name, value) in headers.iter().chain(request.headers.iter()) {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if !request.query.is_empty() {
        builder = builder.query(&request.query);
    }
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }

    let response = builder.send().await.map_err(retryable)?;
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let raw = response.text().await.map_err(retryable)?;
    let body = decode_body(content_type.as_deref(), &raw);

    if (200..300).contains(&status) {
        return Ok(ApiResponse { status, body });
    }

    error!(
        event_name = "transport.response.http_error",
        status,
        url = %url,
        "http request failed"
    );
    Err(AttemptFailure::Fatal(match body.into_details() {
        Some(details) => ApiError::with_details(status, "http request failed", details),
        None => ApiError::new(status, "http request failed"),
    }))
}

fn retryable(source: reqwest::Error) -> AttemptFailure {
    AttemptFailure::Retryable(Box::new(source))
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn decode_body(content_type: Option<&str>, raw: &str) -> ResponseBody {
    if raw.is_empty() {
        return ResponseBody::Empty;
    }

    let declares_json = content_type
        .map(|value| value.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false);
    if declares_json {
        match serde_json::from_str(raw) {
            Ok(value) => ResponseBody::Json(value),
            // Decode failure falls back to raw text rather than failing the
            // call.
            Err(_) => ResponseBody::Text(raw.to_string()),
        }
    } else {
        ResponseBody::Text(raw.to_string())
    }
}
