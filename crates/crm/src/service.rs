use dealflow_core::{
    ContactCreation, ContactId, ContactRecord, CreateContact, CreateDeal, DealId, DealRecord,
    UpdateContact, UpdateDeal,
};
use dealflow_transport::{ApiRequest, ApiResponse, HttpTransport, Transport, TransportError};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::{AssociationStatus, CrmError, DealCreation};

const CONTACTS_PATH: &str = "/crm/v3/objects/contacts";
const CONTACT_SEARCH_PATH: &str = "/crm/v3/objects/contacts/search";
const DEALS_PATH: &str = "/crm/v3/objects/deals";

/// Contact and deal mutations over a resilient transport.
///
/// Holds no per-run state: one service instance serves any number of
/// concurrent runs, sharing only the transport underneath.
pub struct CrmService<T = HttpTransport> {
    transport: T,
}

impl<T> CrmService<T>
where
    T: Transport,
{
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Create a contact, treating a remote 409 as success-with-existing.
    ///
    /// On conflict the existing record is fetched by email and returned as
    /// `ContactCreation::Existing`. If the remote reports a conflict but the
    /// follow-up lookup finds nothing, the original conflict is re-raised; a
    /// record is never fabricated.
    pub async fn create_contact(
        &self,
        input: &CreateContact,
    ) -> Result<ContactCreation, CrmError> {
        let mut properties = Map::new();
        properties.insert("email".to_string(), Value::String(input.email.clone()));
        if let Some(first_name) = input.first_name.as_deref().filter(|value| !value.is_empty()) {
            properties.insert("firstname".to_string(), Value::String(first_name.to_string()));
        }
        if let Some(last_name) = input.last_name.as_deref().filter(|value| !value.is_empty()) {
            properties.insert("lastname".to_string(), Value::String(last_name.to_string()));
        }
        if let Some(phone) = input.phone.as_deref().filter(|value| !value.is_empty()) {
            properties.insert("phone".to_string(), Value::String(phone.to_string()));
        }

        let request = ApiRequest::post(CONTACTS_PATH).with_json(json!({ "properties": properties }));
        match self.transport.execute(request).await {
            Ok(response) => {
                let record = contact_from_response(&response, &input.email)?;
                info!(
                    event_name = "crm.contact.created",
                    contact_id = %record.id,
                    email = %record.email,
                    "new contact created"
                );
                Ok(ContactCreation::Created(record))
            }
            Err(TransportError::Api(error)) if error.is_conflict() => {
                match self.find_contact_by_email(&input.email).await? {
                    Some(existing) => {
                        info!(
                            event_name = "crm.contact.conflict_recovered",
                            contact_id = %existing.id,
                            email = %input.email,
                            "contact already existed"
                        );
                        Ok(ContactCreation::Existing(existing))
                    }
                    None => {
                        warn!(
                            event_name = "crm.contact.conflict_unresolved",
                            email = %input.email,
                            "conflict reported but existing record not found"
                        );
                        Err(CrmError::Api(error))
                    }
                }
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Sparse update of an existing contact, resolved by email.
    ///
    /// Update is never create-on-miss: an unknown email is a validation
    /// failure, since an explicit update implies the caller believes the
    /// record exists.
    pub async fn update_contact(&self, input: &UpdateContact) -> Result<ContactRecord, CrmError> {
        let contact = self.find_contact_by_email(&input.email).await?.ok_or_else(|| {
            CrmError::Validation(format!("contact not found for email {}", input.email))
        })?;

        let mut properties = Map::new();
        if let Some(first_name) = &input.first_name {
            properties.insert("firstname".to_string(), Value::String(first_name.clone()));
        }
        if let Some(last_name) = &input.last_name {
            properties.insert("lastname".to_string(), Value::String(last_name.clone()));
        }
        if let Some(phone) = &input.phone {
            properties.insert("phone".to_string(), Value::String(phone.clone()));
        }

        let request = ApiRequest::patch(format!("{CONTACTS_PATH}/{}", contact.id))
            .with_json(json!({ "properties": properties }));
        let response = self.transport.execute(request).await?;
        let record = contact_from_response(&response, &input.email)?;
        info!(
            event_name = "crm.contact.updated",
            contact_id = %record.id,
            email = %input.email,
            "contact updated"
        );
        Ok(record)
    }

    /// Create a deal and, when an associated contact email was supplied, link
    /// it to that contact with a second call.
    ///
    /// The two steps are not atomic: if the association step fails, the
    /// created deal stands and the failure is surfaced in
    /// `DealCreation::association` rather than rolling anything back.
    pub async fn create_deal(&self, input: &CreateDeal) -> Result<DealCreation, CrmError> {
        let deal_name = input.resolved_name();
        let mut properties = Map::new();
        properties.insert("dealname".to_string(), Value::String(deal_name.clone()));
        if let Some(amount) = input.amount {
            properties.insert("amount".to_string(), json!(amount));
        }
        if let Some(stage) = input.stage.as_deref().filter(|value| !value.is_empty()) {
            properties.insert("dealstage".to_string(), Value::String(stage.to_string()));
        }
        if let Some(pipeline) = input.pipeline.as_deref().filter(|value| !value.is_empty()) {
            properties.insert("pipeline".to_string(), Value::String(pipeline.to_string()));
        }

        let request = ApiRequest::post(DEALS_PATH).with_json(json!({ "properties": properties }));
        let response = self.transport.execute(request).await?;
        let deal = deal_from_response(&response, &deal_name, input)?;
        info!(
            event_name = "crm.deal.created",
            deal_id = %deal.id,
            deal_name = %deal.name,
            "new deal created"
        );

        let association = match &input.associated_contact_email {
            None => AssociationStatus::NotRequested,
            Some(email) => match self.associate_deal_with_contact(&deal.id, email).await {
                Ok(contact_id) => {
                    info!(
                        event_name = "crm.deal.associated",
                        deal_id = %deal.id,
                        contact_id = %contact_id,
                        "deal associated with contact"
                    );
                    AssociationStatus::Linked { contact_id }
                }
                Err(error) => {
                    warn!(
                        event_name = "crm.deal.association_failed",
                        deal_id = %deal.id,
                        email = %email,
                        error = %error,
                        "deal created but association failed; deal is kept"
                    );
                    AssociationStatus::Failed { email: email.clone(), error: Box::new(error) }
                }
            },
        };

        Ok(DealCreation { deal, association })
    }

    /// Sparse update of a deal, keyed by its opaque remote id.
    pub async fn update_deal(&self, input: &UpdateDeal) -> Result<DealRecord, CrmError> {
        let mut properties = Map::new();
        if let Some(name) = &input.name {
            properties.insert("dealname".to_string(), Value::String(name.clone()));
        }
        if let Some(amount) = input.amount {
            properties.insert("amount".to_string(), json!(amount));
        }
        if let Some(stage) = &input.stage {
            properties.insert("dealstage".to_string(), Value::String(stage.clone()));
        }
        if let Some(pipeline) = &input.pipeline {
            properties.insert("pipeline".to_string(), Value::String(pipeline.clone()));
        }

        let request = ApiRequest::patch(format!("{DEALS_PATH}/{}", input.deal_id))
            .with_json(json!({ "properties": properties }));
        let response = self.transport.execute(request).await?;
        let fallback_name = input.name.clone().unwrap_or_default();
        let deal = deal_from_response(&response, &fallback_name, &CreateDeal::default())?;
        info!(event_name = "crm.deal.updated", deal_id = %deal.id, "deal updated");
        Ok(deal)
    }

    /// Exact-match lookup by email, limit 1. Internal: used by the conflict
    /// path of create, by update, and by deal association.
    async fn find_contact_by_email(&self, email: &str) -> Result<Option<ContactRecord>, CrmError> {
        let query = json!({
            "filterGroups": [{
                "filters": [{ "propertyName": "email", "operator": "EQ", "value": email }]
            }],
            "properties": ["email", "firstname", "lastname", "phone"],
            "limit": 1,
        });
        let response =
            self.transport.execute(ApiRequest::post(CONTACT_SEARCH_PATH).with_json(query)).await?;

        let Some(body) = response.json() else {
            return Ok(None);
        };
        let Some(results) = body.get("results").and_then(Value::as_array) else {
            return Ok(None);
        };
        match results.first() {
            Some(value) => Ok(Some(contact_from_value(value, email)?)),
            None => Ok(None),
        }
    }

    async fn associate_deal_with_contact(
        &self,
        deal_id: &DealId,
        email: &str,
    ) -> Result<ContactId, CrmError> {
        let contact = self.find_contact_by_email(email).await?.ok_or_else(|| {
            CrmError::Validation(format!("contact not found for email {email}"))
        })?;

        // v3 association path with a name-based association type, avoiding the
        // v4 API's numeric type-id requirement.
        let path = format!(
            "{DEALS_PATH}/{}/associations/contacts/{}/deal_to_contact",
            deal_id, contact.id
        );
        self.transport.execute(ApiRequest::put(path)).await?;
        Ok(contact.id)
    }
}

fn contact_from_response(
    response: &ApiResponse,
    fallback_email: &str,
) -> Result<ContactRecord, CrmError> {
    let body = response.json().ok_or_else(|| {
        CrmError::UnexpectedResponse("contact response body was not JSON".to_string())
    })?;
    contact_from_value(body, fallback_email)
}

fn contact_from_value(value: &Value, fallback_email: &str) -> Result<ContactRecord, CrmError> {
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| CrmError::UnexpectedResponse("contact payload missing `id`".to_string()))?;
    let properties = value.get("properties").cloned().unwrap_or(Value::Null);

    Ok(ContactRecord {
        id: ContactId(id.to_string()),
        email: string_property(&properties, "email")
            .unwrap_or_else(|| fallback_email.to_string()),
        first_name: string_property(&properties, "firstname"),
        last_name: string_property(&properties, "lastname"),
        phone: string_property(&properties, "phone"),
    })
}

fn deal_from_response(
    response: &ApiResponse,
    fallback_name: &str,
    input: &CreateDeal,
) -> Result<DealRecord, CrmError> {
    let body = response.json().ok_or_else(|| {
        CrmError::UnexpectedResponse("deal response body was not JSON".to_string())
    })?;
    let id = body
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| CrmError::UnexpectedResponse("deal payload missing `id`".to_string()))?;
    let properties = body.get("properties").cloned().unwrap_or(Value::Null);

    Ok(DealRecord {
        id: DealId(id.to_string()),
        name: string_property(&properties, "dealname")
            .unwrap_or_else(|| fallback_name.to_string()),
        amount: numeric_property(&properties, "amount").or(input.amount),
        stage: string_property(&properties, "dealstage").or_else(|| input.stage.clone()),
        pipeline: string_property(&properties, "pipeline").or_else(|| input.pipeline.clone()),
    })
}

fn string_property(properties: &Value, key: &str) -> Option<String> {
    properties
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

// The remote serializes numeric properties as either numbers or strings.
fn numeric_property(properties: &Value, key: &str) -> Option<f64> {
    match properties.get(key)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}
