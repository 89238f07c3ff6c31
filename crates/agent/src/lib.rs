//! Agent runtime - tool selection boundary and run coordination.
//!
//! This crate connects the natural-language front door to the typed CRM
//! operation layer:
//! - **Catalog** (`catalog`) - the fixed set of operation names and argument
//!   schemas published to the tool-selection engine
//! - **Selection** (`selector`) - the narrow `ToolSelector` boundary plus an
//!   OpenAI-compatible implementation; catalog in, ordered plan out
//! - **Coordination** (`coordinator`) - dispatches the plan operation by
//!   operation, records per-operation outcomes, and finishes with one
//!   best-effort confirmation notification
//!
//! # Safety Principle
//!
//! The language model is strictly a translator. It picks operations from a
//! closed catalog and fills their typed arguments; it never talks to the CRM
//! itself, and the coordinator performs no natural-language interpretation.

pub mod catalog;
pub mod coordinator;
pub mod selector;

pub use catalog::{operation_specs, ToolSpec};
pub use coordinator::{
    Coordinator, CoordinatorError, FailureKind, NotificationStatus, OperationOutcome,
    OperationRecord, RunReport,
};
pub use selector::{OpenAiToolSelector, Plan, PlannedCall, SelectorError, ToolSelector};
