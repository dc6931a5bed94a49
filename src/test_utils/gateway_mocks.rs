//! Payment gateway and event sink doubles.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        billing_events::{BillingEvent, BillingEventSink},
        payment_gateway::{
            PaymentGatewayPort, RemoteSubscription, RemoteSubscriptionId,
            RemoteSubscriptionRequest,
        },
    },
};

// ============================================================================
// MockPaymentGateway
// ============================================================================

/// Records every call. Can be switched to fail or to respond slowly.
#[derive(Default)]
pub struct MockPaymentGateway {
    failing: AtomicBool,
    delay: Option<Duration>,
    pub create_requests: Mutex<Vec<RemoteSubscriptionRequest>>,
    pub cancellations: Mutex<Vec<(RemoteSubscriptionId, bool)>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let gateway = Self::default();
        gateway.set_failing(true);
        gateway
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn create_requests(&self) -> Vec<RemoteSubscriptionRequest> {
        self.create_requests.lock().unwrap().clone()
    }

    pub fn cancellations(&self) -> Vec<(RemoteSubscriptionId, bool)> {
        self.cancellations.lock().unwrap().clone()
    }

    async fn respond(&self) -> AppResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::GatewaySync("mock gateway unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGatewayPort for MockPaymentGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_remote_subscription(
        &self,
        request: &RemoteSubscriptionRequest,
    ) -> AppResult<RemoteSubscription> {
        self.create_requests.lock().unwrap().push(request.clone());
        self.respond().await?;
        Ok(RemoteSubscription {
            id: RemoteSubscriptionId::new(format!("sub_mock_{}", Uuid::new_v4().simple())),
            status: "active".to_string(),
        })
    }

    async fn cancel_remote_subscription(
        &self,
        id: &RemoteSubscriptionId,
        immediate: bool,
    ) -> AppResult<()> {
        self.cancellations
            .lock()
            .unwrap()
            .push((id.clone(), immediate));
        self.respond().await
    }
}

// ============================================================================
// RecordingEventSink
// ============================================================================

#[derive(Default)]
pub struct RecordingEventSink {
    pub events: Mutex<Vec<BillingEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BillingEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Number of recorded events with this `BillingEvent::name`.
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }
}

#[async_trait]
impl BillingEventSink for RecordingEventSink {
    async fn emit(&self, event: BillingEvent) {
        self.events.lock().unwrap().push(event);
    }
}
