use async_trait::async_trait;
use uuid::Uuid;

/// Domain events handed to audit, notification and alerting collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
    SubscriptionCreated {
        subscription_id: Uuid,
        customer_id: Uuid,
        plan_id: Uuid,
    },
    SubscriptionCanceled {
        subscription_id: Uuid,
        immediate: bool,
    },
    SubscriptionResumed {
        subscription_id: Uuid,
    },
    SubscriptionSuspended {
        subscription_id: Uuid,
    },
    PaymentSucceeded {
        invoice_id: Uuid,
        subscription_id: Option<Uuid>,
    },
    PaymentFailed {
        subscription_id: Uuid,
        failed_payment_count: i32,
        message: Option<String>,
    },
    GatewaySyncFailed {
        subscription_id: Uuid,
        operation: &'static str,
        error: String,
    },
    WebhookHandlerFailed {
        event_id: String,
        event_type: String,
        error: String,
    },
    WebhookUnhandled {
        event_id: String,
        event_type: String,
    },
}

impl BillingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BillingEvent::SubscriptionCreated { .. } => "subscription.created",
            BillingEvent::SubscriptionCanceled { .. } => "subscription.canceled",
            BillingEvent::SubscriptionResumed { .. } => "subscription.resumed",
            BillingEvent::SubscriptionSuspended { .. } => "subscription.suspended",
            BillingEvent::PaymentSucceeded { .. } => "payment.succeeded",
            BillingEvent::PaymentFailed { .. } => "payment.failed",
            BillingEvent::GatewaySyncFailed { .. } => "gateway.sync_failed",
            BillingEvent::WebhookHandlerFailed { .. } => "webhook.handler_failed",
            BillingEvent::WebhookUnhandled { .. } => "webhook.unhandled",
        }
    }

    /// Events that need a human to follow up.
    pub fn needs_attention(&self) -> bool {
        matches!(
            self,
            BillingEvent::GatewaySyncFailed { .. } | BillingEvent::WebhookHandlerFailed { .. }
        )
    }
}

/// Fire-and-forget sink; emitting never fails the calling operation.
#[async_trait]
pub trait BillingEventSink: Send + Sync {
    async fn emit(&self, event: BillingEvent);
}
