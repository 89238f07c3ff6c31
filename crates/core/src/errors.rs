use serde_json::Value;
use thiserror::Error;

/// Terminal HTTP failure reported by a remote API.
///
/// Carries the status and decoded body verbatim so callers can branch on the
/// exact remote verdict (the CRM service keys its conflict recovery off
/// status 409).
#[derive(Clone, Debug, Error, PartialEq)]
#[error("api error {status}: {message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), details: None }
    }

    pub fn with_details(status: u16, message: impl Into<String>, details: Value) -> Self {
        Self { status, message: message.into(), details: Some(details) }
    }

    /// The remote reported a duplicate record.
    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }

    /// Short diagnostic suitable for user-facing summaries.
    pub fn detail_text(&self) -> String {
        match &self.details {
            Some(Value::String(text)) => text.clone(),
            Some(value) => value.to_string(),
            None => self.message.clone(),
        }
    }
}
