use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Engine-facing operation names, in catalog order.
pub const CREATE_CONTACT: &str = "create_contact";
pub const UPDATE_CONTACT: &str = "update_contact";
pub const CREATE_DEAL: &str = "create_deal";
pub const UPDATE_DEAL: &str = "update_deal";
pub const SEND_NOTIFICATION: &str = "send_notification";

/// Arguments for `create_contact`.
///
/// Field names mirror the schema published to the tool-selection engine
/// (camelCase where the remote CRM uses camelCase input forms).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateContact {
    pub email: String,
    #[serde(default, rename = "firstName")]
    pub first_name: Option<String>,
    #[serde(default, rename = "lastName")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Arguments for `update_contact`. A sparse patch: only provided fields are
/// written, and the contact must already exist (update never creates).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateContact {
    pub email: String,
    #[serde(default, rename = "firstName")]
    pub first_name: Option<String>,
    #[serde(default, rename = "lastName")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Arguments for `create_deal`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateDeal {
    #[serde(default, rename = "dealName")]
    pub name: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub pipeline: Option<String>,
    #[serde(default)]
    pub associated_contact_email: Option<String>,
}

impl CreateDeal {
    /// Deal name with defaulting applied, in priority order: the explicit
    /// name, `Deal for {email}`, `Deal {amount}`, `Untitled Deal`.
    pub fn resolved_name(&self) -> String {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|name| !name.is_empty()) {
            return name.to_string();
        }
        if let Some(email) = &self.associated_contact_email {
            return format!("Deal for {email}");
        }
        if let Some(amount) = self.amount {
            return format!("Deal {amount}");
        }
        "Untitled Deal".to_string()
    }
}

/// Arguments for `update_deal`. Keyed by the opaque remote id; no lookup is
/// performed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateDeal {
    pub deal_id: String,
    #[serde(default, rename = "dealName")]
    pub name: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub pipeline: Option<String>,
}

/// Arguments for `send_notification`. Recipient and subject fall back to
/// configured defaults when absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SendNotification {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    pub html: String,
}

/// One typed operation selected by the tool-selection engine.
///
/// The catalog is closed: the engine can only ever produce one of these five
/// variants, and the coordinator dispatches on the tag alone. No natural
/// language crosses this boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OperationRequest {
    CreateContact(CreateContact),
    UpdateContact(UpdateContact),
    CreateDeal(CreateDeal),
    UpdateDeal(UpdateDeal),
    SendNotification(SendNotification),
}

#[derive(Debug, Error, PartialEq)]
pub enum OperationParseError {
    #[error("unknown operation `{0}`")]
    UnknownOperation(String),
    #[error("invalid arguments for `{operation}`: {detail}")]
    InvalidArguments { operation: String, detail: String },
}

impl OperationRequest {
    /// Decode an engine call (name + JSON arguments) into a typed request.
    pub fn parse(name: &str, arguments: Value) -> Result<Self, OperationParseError> {
        fn decode<T: serde::de::DeserializeOwned>(
            operation: &str,
            arguments: Value,
        ) -> Result<T, OperationParseError> {
            serde_json::from_value(arguments).map_err(|source| {
                OperationParseError::InvalidArguments {
                    operation: operation.to_string(),
                    detail: source.to_string(),
                }
            })
        }

        match name {
            CREATE_CONTACT => Ok(Self::CreateContact(decode(name, arguments)?)),
            UPDATE_CONTACT => Ok(Self::UpdateContact(decode(name, arguments)?)),
            CREATE_DEAL => Ok(Self::CreateDeal(decode(name, arguments)?)),
            UPDATE_DEAL => Ok(Self::UpdateDeal(decode(name, arguments)?)),
            SEND_NOTIFICATION => Ok(Self::SendNotification(decode(name, arguments)?)),
            other => Err(OperationParseError::UnknownOperation(other.to_string())),
        }
    }

    /// The engine-facing name of this operation.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateContact(_) => CREATE_CONTACT,
            Self::UpdateContact(_) => UPDATE_CONTACT,
            Self::CreateDeal(_) => CREATE_DEAL,
            Self::UpdateDeal(_) => UPDATE_DEAL,
            Self::SendNotification(_) => SEND_NOTIFICATION,
        }
    }

    /// Short argument description for run summaries, e.g. the target email.
    pub fn subject(&self) -> String {
        match self {
            Self::CreateContact(args) => args.email.clone(),
            Self::UpdateContact(args) => args.email.clone(),
            Self::CreateDeal(args) => args.resolved_name(),
            Self::UpdateDeal(args) => args.deal_id.clone(),
            Self::SendNotification(args) => {
                args.to.clone().unwrap_or_else(|| "default recipient".to_string())
            }
        }
    }
}
