use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DealId(pub String);

impl std::fmt::Display for DealId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A deal as known to the remote CRM.
///
/// The contact association is not part of the record itself: it lives in a
/// separate remote association object and is established by a second call
/// after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DealRecord {
    pub id: DealId,
    pub name: String,
    pub amount: Option<f64>,
    pub stage: Option<String>,
    pub pipeline: Option<String>,
}
