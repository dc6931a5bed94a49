use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "usage_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UsageAction {
    Set,
    Increment,
}

impl UsageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageAction::Set => "set",
            UsageAction::Increment => "increment",
        }
    }
}

impl FromStr for UsageAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "set" => Ok(UsageAction::Set),
            "increment" => Ok(UsageAction::Increment),
            _ => Err(format!("Unknown usage action: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord {
    #[serde(skip)]
    pub id: Uuid,
    #[serde(rename = "id")]
    pub public_id: Uuid,
    #[serde(skip)]
    pub subscription_item_id: Uuid,
    pub quantity: i64,
    pub action: UsageAction,
    pub timestamp: DateTime<Utc>,
    pub reported_to_gateway: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(
        subscription_item_id: Uuid,
        quantity: i64,
        action: UsageAction,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            public_id: Uuid::new_v4(),
            subscription_item_id,
            quantity,
            action,
            timestamp,
            reported_to_gateway: false,
            metadata: serde_json::json!({}),
            created_at: now,
        }
    }
}

/// Folds records in timestamp order: `set` replaces the running total,
/// `increment` adds to it.
pub fn current_usage(records: &[UsageRecord]) -> i64 {
    let mut ordered: Vec<&UsageRecord> = records.iter().collect();
    ordered.sort_by_key(|r| (r.timestamp, r.created_at));
    ordered.into_iter().fold(0, |total, record| match record.action {
        UsageAction::Set => record.quantity,
        UsageAction::Increment => total + record.quantity,
    })
}
