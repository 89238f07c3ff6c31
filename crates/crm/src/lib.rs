//! CRM record service - contacts, deals, and their association.
//!
//! Implements the mutation workflows the coordinator dispatches:
//! - **Idempotent contact create** - a remote 409 resolves to the existing
//!   record via lookup-by-email instead of failing
//! - **Sparse updates** - only explicitly provided fields are written
//! - **Create-then-associate deals** - a two-step, deliberately non-atomic
//!   sequence; an association failure leaves the created deal in place and is
//!   surfaced to the caller as a partial outcome
//!
//! The remote API offers no native idempotency keys and can report conflicts
//! inconsistently with its own search index; see `CrmService::create_contact`
//! for how that case is handled.

pub mod service;

use dealflow_core::{ApiError, ContactId, DealRecord};
use dealflow_transport::TransportError;
use thiserror::Error;

pub use service::CrmService;

#[derive(Debug, Error)]
pub enum CrmError {
    /// Terminal remote failure, status and details preserved verbatim.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// Local precondition violated before (or instead of) a remote call.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The remote answered 2xx but the payload was not in the expected shape.
    #[error("unexpected response shape: {0}")]
    UnexpectedResponse(String),
    /// Transport-level fault surfaced after retries, never disguised as an
    /// API error.
    #[error(transparent)]
    Transport(TransportError),
}

impl From<TransportError> for CrmError {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::Api(error) => Self::Api(error),
            other => Self::Transport(other),
        }
    }
}

/// Outcome of the deal-to-contact association step.
#[derive(Debug)]
pub enum AssociationStatus {
    NotRequested,
    Linked { contact_id: ContactId },
    /// The deal exists but the link could not be established. The deal is
    /// never rolled back.
    Failed { email: String, error: Box<CrmError> },
}

impl AssociationStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// A created deal together with its (possibly partial) association outcome.
#[derive(Debug)]
pub struct DealCreation {
    pub deal: DealRecord,
    pub association: AssociationStatus,
}
