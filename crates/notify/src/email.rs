use async_trait::async_trait;
use chrono::Utc;
use dealflow_transport::{ApiRequest, HttpTransport, Transport};
use serde_json::{json, Value};
use tracing::info;

use crate::{DeliveryReceipt, DeliveryStatus, Notification, Notifier, NotifyError};

pub const DEFAULT_SUBJECT: &str = "CRM Action Confirmation";

/// Transactional email providers reachable over plain REST.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmailProvider {
    Resend,
    SendGrid,
}

impl EmailProvider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Resend => "https://api.resend.com",
            Self::SendGrid => "https://api.sendgrid.com/v3",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Resend => "resend",
            Self::SendGrid => "sendgrid",
        }
    }

    fn send_path(&self) -> &'static str {
        match self {
            Self::Resend => "/emails",
            Self::SendGrid => "/mail/send",
        }
    }
}

/// Email-backed `Notifier` over the shared resilient transport.
pub struct EmailNotifier<T = HttpTransport> {
    provider: EmailProvider,
    from_email: String,
    default_recipient: Option<String>,
    transport: T,
}

impl<T> EmailNotifier<T>
where
    T: Transport,
{
    pub fn new(provider: EmailProvider, from_email: impl Into<String>, transport: T) -> Self {
        Self { provider, from_email: from_email.into(), default_recipient: None, transport }
    }

    pub fn with_default_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.default_recipient = Some(recipient.into());
        self
    }

    fn payload(&self, to: &str, subject: &str, notification: &Notification) -> Value {
        match self.provider {
            EmailProvider::Resend => {
                let mut body = json!({
                    "from": self.from_email,
                    "to": [to],
                    "subject": subject,
                    "html": notification.html_body,
                });
                if let Some(text) = &notification.text_body {
                    body["text"] = json!(text);
                }
                body
            }
            EmailProvider::SendGrid => json!({
                "personalizations": [{ "to": [{ "email": to }] }],
                "from": { "email": self.from_email },
                "subject": subject,
                "content": [
                    { "type": "text/plain", "value": notification.text_body.as_deref().unwrap_or("") },
                    { "type": "text/html", "value": notification.html_body },
                ],
            }),
        }
    }
}

#[async_trait]
impl<T> Notifier for EmailNotifier<T>
where
    T: Transport,
{
    async fn deliver(&self, notification: &Notification) -> Result<DeliveryReceipt, NotifyError> {
        let to = notification
            .to
            .as_deref()
            .or(self.default_recipient.as_deref())
            .ok_or(NotifyError::MissingRecipient)?;
        let subject = notification.subject.as_deref().unwrap_or(DEFAULT_SUBJECT);

        let request = ApiRequest::post(self.provider.send_path())
            .with_json(self.payload(to, subject, notification));
        let response = self.transport.execute(request).await?;

        // SendGrid answers 202 with an empty body; Resend returns the message
        // id as JSON.
        let message_id = response
            .json()
            .and_then(|body| body.get("id"))
            .and_then(Value::as_str)
            .map(str::to_owned);

        info!(
            event_name = "notify.email.queued",
            provider = self.provider.name(),
            to = %to,
            message_id = message_id.as_deref().unwrap_or("unknown"),
            "confirmation email accepted by provider"
        );

        Ok(DeliveryReceipt {
            provider: self.provider.name(),
            status: DeliveryStatus::Queued,
            message_id,
            delivered_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use dealflow_core::ApiError;
    use dealflow_transport::{
        ApiRequest, ApiResponse, Method, ResponseBody, Transport, TransportError,
    };
    use serde_json::json;

    use crate::{DeliveryStatus, Notification, Notifier, NotifyError};

    use super::{EmailNotifier, EmailProvider};

    struct MockTransport {
        responses: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl MockTransport {
        fn scripted(
            responses: impl IntoIterator<Item = Result<ApiResponse, TransportError>>,
        ) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<ApiRequest> {
            self.requests.lock().expect("request log").clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
            self.requests.lock().expect("request log").push(request);
            self.responses
                .lock()
                .expect("response script")
                .pop_front()
                .expect("test script ran out of responses")
        }
    }

    #[tokio::test]
    async fn resend_payload_carries_sender_recipient_and_html() {
        let transport = MockTransport::scripted([Ok(ApiResponse {
            status: 200,
            body: ResponseBody::Json(json!({ "id": "email-123" })),
        })]);
        let notifier = EmailNotifier::new(EmailProvider::Resend, "bot@example.com", transport);

        let receipt = notifier
            .deliver(
                &Notification::new("<p>done</p>")
                    .with_recipient("ops@example.com")
                    .with_subject("Summary"),
            )
            .await
            .expect("delivery should succeed");

        assert_eq!(receipt.provider, "resend");
        assert_eq!(receipt.status, DeliveryStatus::Queued);
        assert_eq!(receipt.message_id.as_deref(), Some("email-123"));

        let requests = notifier.transport.requests();
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].path, "/emails");
        let body = requests[0].body.as_ref().expect("body");
        assert_eq!(body["from"], "bot@example.com");
        assert_eq!(body["to"], json!(["ops@example.com"]));
        assert_eq!(body["subject"], "Summary");
        assert_eq!(body["html"], "<p>done</p>");
        assert!(body.get("text").is_none());
    }

    #[tokio::test]
    async fn sendgrid_tolerates_empty_202_response() {
        let transport = MockTransport::scripted([Ok(ApiResponse {
            status: 202,
            body: ResponseBody::Empty,
        })]);
        let notifier = EmailNotifier::new(EmailProvider::SendGrid, "bot@example.com", transport)
            .with_default_recipient("ops@example.com");

        let receipt = notifier
            .deliver(&Notification::new("<p>done</p>"))
            .await
            .expect("202 with no body is a successful queue");

        assert_eq!(receipt.provider, "sendgrid");
        assert_eq!(receipt.message_id, None);

        let requests = notifier.transport.requests();
        assert_eq!(requests[0].path, "/mail/send");
        let body = requests[0].body.as_ref().expect("body");
        assert_eq!(body["personalizations"][0]["to"][0]["email"], "ops@example.com");
        assert_eq!(body["subject"], super::DEFAULT_SUBJECT);
        assert_eq!(body["content"][1]["value"], "<p>done</p>");
    }

    #[tokio::test]
    async fn missing_recipient_fails_before_any_network_call() {
        let transport = MockTransport::scripted([]);
        let notifier = EmailNotifier::new(EmailProvider::Resend, "bot@example.com", transport);

        let error = notifier
            .deliver(&Notification::new("<p>done</p>"))
            .await
            .expect_err("no recipient anywhere must fail");

        assert!(matches!(error, NotifyError::MissingRecipient));
        assert!(notifier.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn provider_rejection_surfaces_as_api_error() {
        let transport = MockTransport::scripted([Err(TransportError::Api(ApiError::new(
            401,
            "http request failed",
        )))]);
        let notifier = EmailNotifier::new(EmailProvider::Resend, "bot@example.com", transport)
            .with_default_recipient("ops@example.com");

        let error = notifier
            .deliver(&Notification::new("<p>done</p>"))
            .await
            .expect_err("401 must fail delivery");

        assert!(matches!(error, NotifyError::Api(api) if api.status == 401));
    }
}
