use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_error::AppResult;

// ============================================================================
// Port Types - Gateway-agnostic
// ============================================================================

/// Identifier of a subscription on the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteSubscriptionId(pub String);

impl RemoteSubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RemoteSubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct RemoteSubscriptionItem {
    /// Gateway price id of the plan, when the plan is synced.
    pub price_id: Option<String>,
    pub quantity: i32,
}

/// Everything the gateway needs to mirror a local subscription.
#[derive(Debug, Clone)]
pub struct RemoteSubscriptionRequest {
    pub subscription_id: Uuid,
    pub customer_gateway_id: Option<String>,
    pub items: Vec<RemoteSubscriptionItem>,
}

#[derive(Debug, Clone)]
pub struct RemoteSubscription {
    pub id: RemoteSubscriptionId,
    pub status: String,
}

// ============================================================================
// Port Trait
// ============================================================================

/// Outbound calls to the payment gateway. Callers treat every error as a
/// recoverable sync failure; local state is never rolled back on error.
#[async_trait]
pub trait PaymentGatewayPort: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_remote_subscription(
        &self,
        request: &RemoteSubscriptionRequest,
    ) -> AppResult<RemoteSubscription>;

    async fn cancel_remote_subscription(
        &self,
        remote_id: &RemoteSubscriptionId,
        immediate: bool,
    ) -> AppResult<()>;
}
