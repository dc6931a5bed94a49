use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    application::ports::payment_gateway::{
        PaymentGatewayPort, RemoteSubscription, RemoteSubscriptionId, RemoteSubscriptionRequest,
    },
};

/// Local stand-in for a payment gateway.
///
/// Every call succeeds without leaving the process. Remote ids are
/// fabricated so the rest of the lifecycle (webhooks, cancellation) can be
/// exercised in development.
#[derive(Clone, Default)]
pub struct DummyGatewayClient;

impl DummyGatewayClient {
    pub fn new() -> Self {
        Self
    }

    fn generate_subscription_id(&self) -> RemoteSubscriptionId {
        RemoteSubscriptionId::new(format!("dummy_sub_{}", Uuid::new_v4()))
    }
}

#[async_trait]
impl PaymentGatewayPort for DummyGatewayClient {
    fn name(&self) -> &'static str {
        "dummy"
    }

    async fn create_remote_subscription(
        &self,
        request: &RemoteSubscriptionRequest,
    ) -> AppResult<RemoteSubscription> {
        let id = self.generate_subscription_id();
        tracing::debug!(
            subscription_id = %request.subscription_id,
            remote_id = %id,
            "Dummy gateway created subscription"
        );
        Ok(RemoteSubscription {
            id,
            status: "active".to_string(),
        })
    }

    async fn cancel_remote_subscription(
        &self,
        remote_id: &RemoteSubscriptionId,
        immediate: bool,
    ) -> AppResult<()> {
        tracing::debug!(remote_id = %remote_id, immediate, "Dummy gateway canceled subscription");
        Ok(())
    }
}
