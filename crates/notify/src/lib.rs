//! Notification delivery - the coordinator's confirmation channel.
//!
//! Treated as a black box by the rest of the system: the coordinator hands a
//! recipient/subject/body triple to a `Notifier` and receives a delivery
//! receipt or a failure. Delivery is at-least-attempted and best-effort; a
//! failed confirmation never changes the outcome of the CRM operations it
//! reports on.

pub mod email;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dealflow_core::ApiError;
use dealflow_transport::TransportError;
use thiserror::Error;

pub use email::{EmailNotifier, EmailProvider};

/// One outbound notification. Recipient and subject fall back to configured
/// defaults when absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub to: Option<String>,
    pub subject: Option<String>,
    pub html_body: String,
    pub text_body: Option<String>,
}

impl Notification {
    pub fn new(html_body: impl Into<String>) -> Self {
        Self { to: None, subject: None, html_body: html_body.into(), text_body: None }
    }

    pub fn with_recipient(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Accepted by the provider for asynchronous delivery.
    Queued,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub provider: &'static str,
    pub status: DeliveryStatus,
    pub message_id: Option<String>,
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    /// No recipient was provided and none is configured. Raised before any
    /// network call.
    #[error("no recipient email provided or configured")]
    MissingRecipient,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Transport(TransportError),
}

impl From<TransportError> for NotifyError {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::Api(error) => Self::Api(error),
            other => Self::Transport(other),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<DeliveryReceipt, NotifyError>;
}
