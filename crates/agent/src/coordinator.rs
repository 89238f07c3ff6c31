use dealflow_core::domain::operation::{OperationRequest, SendNotification};
use dealflow_crm::{AssociationStatus, CrmError, CrmService, DealCreation};
use dealflow_notify::{Notification, Notifier};
use dealflow_transport::Transport;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog;
use crate::selector::{Plan, SelectorError, ToolSelector};

/// Sequences one run: an engine-selected plan of CRM operations followed by a
/// single confirmation notification.
///
/// The run moves strictly forward (dispatching, then notifying, then done).
/// Operations execute in plan order because later operations may depend on
/// identifiers produced by earlier ones. One operation's failure is recorded
/// and never cancels its siblings; the notification is best-effort and never
/// changes the recorded CRM outcomes.
pub struct Coordinator<S, T, N> {
    selector: S,
    crm: CrmService<T>,
    notifier: N,
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The engine could not produce a plan; there is nothing to dispatch.
    #[error(transparent)]
    Selection(#[from] SelectorError),
}

/// Outcome classification for failed operations, used in summaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Api,
    Validation,
    Transport,
    Plan,
}

impl FailureKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Validation => "validation",
            Self::Transport => "transport",
            Self::Plan => "plan",
        }
    }
}

#[derive(Debug)]
pub enum OperationOutcome {
    Success { detail: String },
    Failure { kind: FailureKind, detail: String },
}

impl OperationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// One dispatched operation and what became of it. Created per request,
/// aggregated into the run report, then discarded with the run.
#[derive(Debug)]
pub struct OperationRecord {
    pub operation: String,
    pub subject: String,
    pub outcome: OperationOutcome,
}

#[derive(Debug)]
pub enum NotificationStatus {
    Delivered { provider: &'static str, detail: String },
    Failed { detail: String },
}

#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub operations: Vec<OperationRecord>,
    pub notification: NotificationStatus,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.operations.iter().filter(|record| record.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.operations.len() - self.succeeded()
    }

    /// The run rendered as one human-readable string: per-operation outcome
    /// plus notification delivery status.
    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(self.operations.len() + 2);
        lines.push(format!(
            "run {}: {} of {} operations succeeded",
            self.run_id,
            self.succeeded(),
            self.operations.len()
        ));
        for (index, record) in self.operations.iter().enumerate() {
            let line = match &record.outcome {
                OperationOutcome::Success { detail } => {
                    format!("  {}. {} {}: ok ({detail})", index + 1, record.operation, record.subject)
                }
                OperationOutcome::Failure { kind, detail } => format!(
                    "  {}. {} {}: failed [{}] {detail}",
                    index + 1,
                    record.operation,
                    record.subject,
                    kind.as_str()
                ),
            };
            lines.push(line);
        }
        match &self.notification {
            NotificationStatus::Delivered { provider, detail } => {
                lines.push(format!("notification: delivered via {provider} ({detail})"));
            }
            NotificationStatus::Failed { detail } => {
                lines.push(format!("notification: failed ({detail})"));
            }
        }
        lines.join("\n")
    }
}

impl<S, T, N> Coordinator<S, T, N>
where
    S: ToolSelector,
    T: Transport,
    N: Notifier,
{
    pub fn new(selector: S, crm: CrmService<T>, notifier: N) -> Self {
        Self { selector, crm, notifier }
    }

    /// One full run: select a plan for the request, dispatch it, notify.
    pub async fn run(&self, request: &str) -> Result<RunReport, CoordinatorError> {
        let run_id = Uuid::new_v4();
        info!(
            event_name = "run.started",
            correlation_id = %run_id,
            "translating user request into an operation plan"
        );

        let plan = self.selector.select(request, &catalog::operation_specs()).await?;
        info!(
            event_name = "run.plan_selected",
            correlation_id = %run_id,
            operations = plan.calls.len(),
            "operation plan selected"
        );

        Ok(self.execute_plan(run_id, plan).await)
    }

    /// Dispatch a ready-made plan. Split from `run` so callers that already
    /// hold a plan (replays, tests) skip the selection round.
    pub async fn execute_plan(&self, run_id: Uuid, plan: Plan) -> RunReport {
        let mut operations = Vec::new();
        let mut notification_template: Option<SendNotification> = None;

        for call in plan.calls {
            match OperationRequest::parse(&call.name, call.arguments) {
                // The confirmation is a single step after every CRM operation
                // has been attempted; a planned send_notification contributes
                // its recipient, subject, and preamble to that step.
                Ok(OperationRequest::SendNotification(template)) => {
                    notification_template = Some(template);
                }
                Ok(request) => {
                    operations.push(self.dispatch(run_id, request).await);
                }
                Err(error) => {
                    warn!(
                        event_name = "run.operation_rejected",
                        correlation_id = %run_id,
                        operation = %call.name,
                        error = %error,
                        "engine call could not be decoded"
                    );
                    operations.push(OperationRecord {
                        operation: call.name,
                        subject: String::new(),
                        outcome: OperationOutcome::Failure {
                            kind: FailureKind::Plan,
                            detail: error.to_string(),
                        },
                    });
                }
            }
        }

        let notification = self.notify(run_id, &operations, notification_template).await;
        let report = RunReport { run_id, operations, notification };
        info!(
            event_name = "run.completed",
            correlation_id = %run_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "run completed"
        );
        report
    }

    async fn dispatch(&self, run_id: Uuid, request: OperationRequest) -> OperationRecord {
        let operation = request.name().to_string();
        let subject = request.subject();

        let outcome = match request {
            OperationRequest::CreateContact(input) => {
                match self.crm.create_contact(&input).await {
                    Ok(creation) => {
                        let tag = if creation.was_existing() { "existing" } else { "created" };
                        OperationOutcome::Success {
                            detail: format!("contact {} ({tag})", creation.record().id),
                        }
                    }
                    Err(error) => failure_outcome(error),
                }
            }
            OperationRequest::UpdateContact(input) => {
                match self.crm.update_contact(&input).await {
                    Ok(record) => {
                        OperationOutcome::Success { detail: format!("contact {}", record.id) }
                    }
                    Err(error) => failure_outcome(error),
                }
            }
            OperationRequest::CreateDeal(input) => match self.crm.create_deal(&input).await {
                Ok(creation) => deal_outcome(creation),
                Err(error) => failure_outcome(error),
            },
            OperationRequest::UpdateDeal(input) => match self.crm.update_deal(&input).await {
                Ok(record) => OperationOutcome::Success { detail: format!("deal {}", record.id) },
                Err(error) => failure_outcome(error),
            },
            // Intercepted in execute_plan before dispatch.
            OperationRequest::SendNotification(_) => OperationOutcome::Failure {
                kind: FailureKind::Plan,
                detail: "notification is dispatched after CRM operations".to_string(),
            },
        };

        match &outcome {
            OperationOutcome::Success { detail } => info!(
                event_name = "run.operation_completed",
                correlation_id = %run_id,
                operation = %operation,
                detail = %detail,
                "operation completed"
            ),
            OperationOutcome::Failure { kind, detail } => warn!(
                event_name = "run.operation_failed",
                correlation_id = %run_id,
                operation = %operation,
                kind = kind.as_str(),
                detail = %detail,
                "operation failed; remaining plan continues"
            ),
        }

        OperationRecord { operation, subject, outcome }
    }

    async fn notify(
        &self,
        run_id: Uuid,
        operations: &[OperationRecord],
        template: Option<SendNotification>,
    ) -> NotificationStatus {
        let preamble = template.as_ref().map(|template| template.html.as_str());
        let mut notification = Notification::new(summary_html(operations, preamble));
        if let Some(template) = template {
            if let Some(to) = template.to {
                notification = notification.with_recipient(to);
            }
            if let Some(subject) = template.subject {
                notification = notification.with_subject(subject);
            }
        }

        match self.notifier.deliver(&notification).await {
            Ok(receipt) => {
                info!(
                    event_name = "run.notification_sent",
                    correlation_id = %run_id,
                    provider = receipt.provider,
                    "confirmation notification delivered"
                );
                NotificationStatus::Delivered {
                    provider: receipt.provider,
                    detail: receipt.message_id.unwrap_or_else(|| "queued".to_string()),
                }
            }
            Err(error) => {
                // Best-effort: the CRM outcomes above stand regardless.
                warn!(
                    event_name = "run.notification_failed",
                    correlation_id = %run_id,
                    error = %error,
                    "confirmation notification failed"
                );
                NotificationStatus::Failed { detail: error.to_string() }
            }
        }
    }
}

fn failure_outcome(error: CrmError) -> OperationOutcome {
    let kind = match &error {
        CrmError::Api(_) | CrmError::UnexpectedResponse(_) => FailureKind::Api,
        CrmError::Validation(_) => FailureKind::Validation,
        CrmError::Transport(_) => FailureKind::Transport,
    };
    let detail = match &error {
        CrmError::Api(api) => format!("api error {}: {}", api.status, api.detail_text()),
        other => other.to_string(),
    };
    OperationOutcome::Failure { kind, detail }
}

fn deal_outcome(creation: DealCreation) -> OperationOutcome {
    let deal = &creation.deal;
    match creation.association {
        AssociationStatus::NotRequested => OperationOutcome::Success {
            detail: format!("deal {} `{}`", deal.id, deal.name),
        },
        AssociationStatus::Linked { contact_id } => OperationOutcome::Success {
            detail: format!("deal {} `{}` linked to contact {contact_id}", deal.id, deal.name),
        },
        // The deal stands; the caller sees the partial outcome in the detail.
        AssociationStatus::Failed { email, error } => OperationOutcome::Success {
            detail: format!(
                "deal {} `{}` created, but association with {email} failed: {error}",
                deal.id, deal.name
            ),
        },
    }
}

fn summary_html(operations: &[OperationRecord], preamble: Option<&str>) -> String {
    let mut html = String::new();
    if let Some(preamble) = preamble.filter(|text| !text.trim().is_empty()) {
        html.push_str(preamble);
    }
    if operations.is_empty() {
        html.push_str("<p>No CRM operations were performed.</p>");
        return html;
    }

    html.push_str("<ul>");
    for record in operations {
        match &record.outcome {
            OperationOutcome::Success { detail } => {
                html.push_str(&format!(
                    "<li>{} {}: {}</li>",
                    record.operation, record.subject, detail
                ));
            }
            OperationOutcome::Failure { kind, detail } => {
                html.push_str(&format!(
                    "<li>{} {}: failed [{}] {}</li>",
                    record.operation,
                    record.subject,
                    kind.as_str(),
                    detail
                ));
            }
        }
    }
    html.push_str("</ul>");
    html
}
