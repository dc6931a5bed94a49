use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Reference to the host-application entity that owns a billing customer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Billable {
    pub billable_type: String,
    pub billable_id: String,
}

impl Billable {
    pub fn new(billable_type: impl Into<String>, billable_id: impl Into<String>) -> Self {
        Self {
            billable_type: billable_type.into(),
            billable_id: billable_id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Customer {
    #[serde(skip)]
    pub id: Uuid,
    #[serde(rename = "id")]
    pub public_id: Uuid,
    pub billable_type: String,
    pub billable_id: String,
    pub workspace_id: Option<Uuid>,
    #[serde(skip)]
    pub gateway_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn new(
        billable: &Billable,
        workspace_id: Option<Uuid>,
        email: Option<String>,
        name: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            public_id: Uuid::new_v4(),
            billable_type: billable.billable_type.clone(),
            billable_id: billable.billable_id.clone(),
            workspace_id,
            gateway_id: None,
            email,
            name,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn billable(&self) -> Billable {
        Billable::new(self.billable_type.clone(), self.billable_id.clone())
    }

    pub fn is_owned_by(&self, billable: &Billable) -> bool {
        self.billable_type == billable.billable_type && self.billable_id == billable.billable_id
    }
}
