pub mod config;
pub mod domain;
pub mod errors;

pub use domain::contact::{ContactCreation, ContactId, ContactRecord};
pub use domain::deal::{DealId, DealRecord};
pub use domain::operation::{
    CreateContact, CreateDeal, OperationParseError, OperationRequest, SendNotification,
    UpdateContact, UpdateDeal,
};
pub use errors::ApiError;
