use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Event types the reconciler acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEventKind {
    PaymentSucceeded,
    PaymentFailed,
    SubscriptionUpdated,
    SubscriptionDeleted,
    PaymentMethodAttached,
    Unrecognized,
}

impl GatewayEventKind {
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            "invoice.payment_succeeded" => GatewayEventKind::PaymentSucceeded,
            "invoice.payment_failed" => GatewayEventKind::PaymentFailed,
            "customer.subscription.updated" => GatewayEventKind::SubscriptionUpdated,
            "customer.subscription.deleted" => GatewayEventKind::SubscriptionDeleted,
            "payment_method.attached" => GatewayEventKind::PaymentMethodAttached,
            _ => GatewayEventKind::Unrecognized,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEventData {
    pub object: serde_json::Value,
}

/// Signed webhook envelope: `{id, type, created, data: {object}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: Option<i64>,
    pub data: GatewayEventData,
}

impl GatewayEvent {
    pub fn kind(&self) -> GatewayEventKind {
        GatewayEventKind::from_type(&self.event_type)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }

    pub fn object_str(&self, field: &str) -> Option<&str> {
        self.data.object.get(field).and_then(|v| v.as_str())
    }

    pub fn object_timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        self.data
            .object
            .get(field)
            .and_then(|v| v.as_i64())
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }

    /// Failure reason on `invoice.payment_failed` objects.
    pub fn failure_message(&self) -> Option<&str> {
        self.data
            .object
            .get("last_finalization_error")
            .and_then(|err| err.get("message"))
            .and_then(|msg| msg.as_str())
    }
}
