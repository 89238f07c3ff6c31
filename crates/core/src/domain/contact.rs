use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId(pub String);

impl std::fmt::Display for ContactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A contact as known to the remote CRM.
///
/// Email is the external key; the remote enforces at most one record per
/// email, and duplicates are only ever discovered through conflict responses
/// at call time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: ContactId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

/// Outcome of an idempotent contact create.
///
/// A 409 from the remote is not a failure: it resolves to `Existing` with
/// the record fetched by email. The branch is part of the signature so the
/// idempotent-create semantics are visible to callers instead of being
/// buried in error handling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContactCreation {
    Created(ContactRecord),
    Existing(ContactRecord),
}

impl ContactCreation {
    pub fn record(&self) -> &ContactRecord {
        match self {
            Self::Created(record) | Self::Existing(record) => record,
        }
    }

    pub fn was_existing(&self) -> bool {
        matches!(self, Self::Existing(_))
    }
}

#[cfg(test)]
mod tests {
    use super::{ContactCreation, ContactId, ContactRecord};

    fn record() -> ContactRecord {
        ContactRecord {
            id: ContactId("101".to_string()),
            email: "ada@example.com".to_string(),
            first_name: Some("Ada".to_string()),
            last_name: None,
            phone: None,
        }
    }

    #[test]
    fn creation_branches_expose_the_same_record() {
        let created = ContactCreation::Created(record());
        let existing = ContactCreation::Existing(record());

        assert_eq!(created.record(), existing.record());
        assert!(!created.was_existing());
        assert!(existing.was_existing());
    }
}
