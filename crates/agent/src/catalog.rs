//! The operation catalog published to the tool-selection engine.
//!
//! The catalog is the whole engine-facing surface: five operations with typed
//! argument schemas. The engine fills arguments; it never sees transport,
//! credentials, or remote identifiers beyond what the user said.

use dealflow_core::domain::operation;
use serde_json::{json, Value};

/// One engine-facing operation: name, description, JSON Schema arguments.
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// All operation names, in catalog order.
pub const OPERATION_NAMES: &[&str] = &[
    operation::CREATE_CONTACT,
    operation::UPDATE_CONTACT,
    operation::CREATE_DEAL,
    operation::UPDATE_DEAL,
    operation::SEND_NOTIFICATION,
];

pub fn operation_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: operation::CREATE_CONTACT,
            description: "Create a new CRM contact with the supplied fields. \
                          Safe to call for an email that may already exist.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "email": { "type": "string", "description": "Contact email address" },
                    "firstName": { "type": "string", "description": "First name" },
                    "lastName": { "type": "string", "description": "Last name" },
                    "phone": { "type": "string", "description": "Phone number" }
                },
                "required": ["email"]
            }),
        },
        ToolSpec {
            name: operation::UPDATE_CONTACT,
            description: "Update an existing CRM contact identified by email. \
                          Only the supplied fields are changed.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "email": { "type": "string", "description": "Email of the existing contact" },
                    "firstName": { "type": "string", "description": "New first name" },
                    "lastName": { "type": "string", "description": "New last name" },
                    "phone": { "type": "string", "description": "New phone number" }
                },
                "required": ["email"]
            }),
        },
        ToolSpec {
            name: operation::CREATE_DEAL,
            description: "Create a CRM deal and optionally associate it with a \
                          contact by email.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "dealName": { "type": "string", "description": "Deal name; derived when omitted" },
                    "amount": { "type": "number", "description": "Deal amount" },
                    "stage": { "type": "string", "description": "Pipeline stage" },
                    "pipeline": { "type": "string", "description": "Pipeline identifier" },
                    "associated_contact_email": {
                        "type": "string",
                        "description": "Email of the contact to link the deal to"
                    }
                },
                "required": []
            }),
        },
        ToolSpec {
            name: operation::UPDATE_DEAL,
            description: "Update fields on an existing CRM deal identified by id.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "deal_id": { "type": "string", "description": "Opaque deal id" },
                    "dealName": { "type": "string", "description": "New deal name" },
                    "amount": { "type": "number", "description": "New amount" },
                    "stage": { "type": "string", "description": "New pipeline stage" },
                    "pipeline": { "type": "string", "description": "New pipeline identifier" }
                },
                "required": ["deal_id"]
            }),
        },
        ToolSpec {
            name: operation::SEND_NOTIFICATION,
            description: "Send a confirmation summarizing the CRM actions taken. \
                          Recipient and subject fall back to configured defaults.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "to": { "type": "string", "description": "Recipient email address" },
                    "subject": { "type": "string", "description": "Message subject" },
                    "html": { "type": "string", "description": "HTML body" }
                },
                "required": ["html"]
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::{operation_specs, OPERATION_NAMES};

    #[test]
    fn catalog_is_closed_and_ordered() {
        let specs = operation_specs();
        let names = specs.iter().map(|spec| spec.name).collect::<Vec<_>>();
        assert_eq!(names, OPERATION_NAMES);
        assert_eq!(specs.len(), 5);
    }

    #[test]
    fn schemas_mark_the_right_required_fields() {
        let specs = operation_specs();
        let required = |name: &str| -> Vec<String> {
            specs
                .iter()
                .find(|spec| spec.name == name)
                .expect("spec should exist")
                .parameters["required"]
                .as_array()
                .expect("required array")
                .iter()
                .filter_map(|value| value.as_str().map(str::to_owned))
                .collect()
        };

        assert_eq!(required("create_contact"), vec!["email"]);
        assert_eq!(required("update_contact"), vec!["email"]);
        assert!(required("create_deal").is_empty(), "every deal field is optional");
        assert_eq!(required("update_deal"), vec!["deal_id"]);
        assert_eq!(required("send_notification"), vec!["html"]);
    }

    #[test]
    fn every_schema_is_an_object_schema() {
        for spec in operation_specs() {
            assert_eq!(spec.parameters["type"], "object", "{} schema", spec.name);
            assert!(spec.parameters["properties"].is_object(), "{} properties", spec.name);
        }
    }
}
