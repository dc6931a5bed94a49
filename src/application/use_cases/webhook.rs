use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_events::{BillingEvent, BillingEventSink},
    domain::entities::{
        gateway_event::{GatewayEvent, GatewayEventKind},
        subscription::GatewaySubscriptionState,
    },
    infra::webhook_signer::verify_webhook_signature,
    use_cases::{billing_ledger::LedgerUseCases, subscription::SubscriptionUseCases},
};

pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Processed,
    /// Event id seen before; nothing applied.
    Duplicate,
    /// Recognized event referencing nothing this system tracks.
    Ignored,
    Unhandled,
    HandlerFailed(String),
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::Ignored => "ignored",
            WebhookOutcome::Unhandled => "unhandled",
            WebhookOutcome::HandlerFailed(_) => "handler_failed",
        }
    }
}

pub struct WebhookConfig {
    pub secret: Option<SecretString>,
    pub tolerance_secs: i64,
    pub deduplicate: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
            deduplicate: true,
        }
    }
}

#[async_trait]
pub trait ProcessedEventRepo: Send + Sync {
    /// Atomically claims `event_id`. False when it was already claimed.
    async fn claim(
        &self,
        event_id: &str,
        event_type: &str,
        received_at: DateTime<Utc>,
    ) -> AppResult<bool>;
    async fn record_outcome(&self, event_id: &str, outcome: &str) -> AppResult<()>;
}

// ============================================================================
// Reconciler
// ============================================================================

pub struct WebhookReconciler {
    subscriptions: Arc<SubscriptionUseCases>,
    ledger: Arc<LedgerUseCases>,
    processed_events: Arc<dyn ProcessedEventRepo>,
    events: Arc<dyn BillingEventSink>,
    config: WebhookConfig,
}

impl WebhookReconciler {
    pub fn new(
        subscriptions: Arc<SubscriptionUseCases>,
        ledger: Arc<LedgerUseCases>,
        processed_events: Arc<dyn ProcessedEventRepo>,
        events: Arc<dyn BillingEventSink>,
        config: WebhookConfig,
    ) -> Self {
        Self {
            subscriptions,
            ledger,
            processed_events,
            events,
            config,
        }
    }

    /// Authenticates, parses and applies one delivery.
    ///
    /// Errors are returned only for deliveries that must be rejected
    /// (signature, payload, missing configuration). Once the event is
    /// accepted, handler failures come back as `HandlerFailed` so the caller
    /// can still acknowledge the delivery.
    #[instrument(skip_all)]
    pub async fn handle(&self, payload: &str, signature: Option<&str>) -> AppResult<WebhookOutcome> {
        let secret = self
            .config
            .secret
            .as_ref()
            .ok_or(AppError::ProviderNotConfigured)?;
        let signature =
            signature.ok_or_else(|| AppError::SignatureInvalid("Missing signature header".into()))?;
        verify_webhook_signature(
            payload,
            signature,
            secret.expose_secret(),
            self.config.tolerance_secs,
            Utc::now().timestamp(),
        )?;

        let event: GatewayEvent = serde_json::from_str(payload)
            .map_err(|e| AppError::MalformedPayload(format!("Invalid webhook payload: {}", e)))?;
        if event.id.is_empty() || event.event_type.is_empty() {
            return Err(AppError::MalformedPayload(
                "Webhook event is missing id or type".into(),
            ));
        }

        if self.config.deduplicate
            && !self
                .processed_events
                .claim(&event.id, &event.event_type, Utc::now())
                .await?
        {
            info!(event_id = %event.id, event_type = %event.event_type, "Duplicate webhook delivery");
            return Ok(WebhookOutcome::Duplicate);
        }

        let outcome = match self.dispatch(&event).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %err,
                    "Webhook handler failed"
                );
                self.events
                    .emit(BillingEvent::WebhookHandlerFailed {
                        event_id: event.id.clone(),
                        event_type: event.event_type.clone(),
                        error: err.to_string(),
                    })
                    .await;
                WebhookOutcome::HandlerFailed(err.to_string())
            }
        };

        if self.config.deduplicate {
            if let Err(err) = self
                .processed_events
                .record_outcome(&event.id, outcome.as_str())
                .await
            {
                warn!(event_id = %event.id, error = %err, "Failed to record webhook outcome");
            }
        }

        debug!(event_id = %event.id, outcome = outcome.as_str(), "Webhook processed");
        Ok(outcome)
    }

    async fn dispatch(&self, event: &GatewayEvent) -> AppResult<WebhookOutcome> {
        match event.kind() {
            GatewayEventKind::PaymentSucceeded => self.on_payment_succeeded(event).await,
            GatewayEventKind::PaymentFailed => self.on_payment_failed(event).await,
            GatewayEventKind::SubscriptionUpdated => self.on_subscription_updated(event).await,
            GatewayEventKind::SubscriptionDeleted => self.on_subscription_deleted(event).await,
            GatewayEventKind::PaymentMethodAttached => Ok(WebhookOutcome::Ignored),
            GatewayEventKind::Unrecognized => {
                info!(event_id = %event.id, event_type = %event.event_type, "Unhandled webhook event");
                self.events
                    .emit(BillingEvent::WebhookUnhandled {
                        event_id: event.id.clone(),
                        event_type: event.event_type.clone(),
                    })
                    .await;
                Ok(WebhookOutcome::Unhandled)
            }
        }
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    async fn on_payment_succeeded(&self, event: &GatewayEvent) -> AppResult<WebhookOutcome> {
        let invoice_id = required_str(event, "id")?;
        Ok(match self.ledger.mark_paid_by_gateway_id(invoice_id).await? {
            Some(_) => WebhookOutcome::Processed,
            None => ignored(event, invoice_id),
        })
    }

    async fn on_payment_failed(&self, event: &GatewayEvent) -> AppResult<WebhookOutcome> {
        let Some(subscription_id) = event.object_str("subscription") else {
            return Ok(ignored(event, "<none>"));
        };
        match self
            .subscriptions
            .record_payment_failure(subscription_id)
            .await?
        {
            Some(subscription) => {
                self.events
                    .emit(BillingEvent::PaymentFailed {
                        subscription_id: subscription.id,
                        failed_payment_count: subscription.failed_payment_count,
                        message: event.failure_message().map(str::to_string),
                    })
                    .await;
                Ok(WebhookOutcome::Processed)
            }
            None => Ok(ignored(event, subscription_id)),
        }
    }

    async fn on_subscription_updated(&self, event: &GatewayEvent) -> AppResult<WebhookOutcome> {
        let subscription_id = required_str(event, "id")?;
        let state = GatewaySubscriptionState {
            status: event.object_str("status").map(str::to_string),
            current_period_start: event.object_timestamp("current_period_start"),
            current_period_end: event.object_timestamp("current_period_end"),
            observed_at: event.created_at().unwrap_or_else(Utc::now),
        };
        Ok(
            match self
                .subscriptions
                .mirror_gateway_state(subscription_id, &state)
                .await?
            {
                Some(_) => WebhookOutcome::Processed,
                None => ignored(event, subscription_id),
            },
        )
    }

    async fn on_subscription_deleted(&self, event: &GatewayEvent) -> AppResult<WebhookOutcome> {
        let subscription_id = required_str(event, "id")?;
        Ok(
            match self.subscriptions.cancel_from_gateway(subscription_id).await? {
                Some(_) => WebhookOutcome::Processed,
                None => ignored(event, subscription_id),
            },
        )
    }
}

fn required_str<'a>(event: &'a GatewayEvent, field: &str) -> AppResult<&'a str> {
    event.object_str(field).ok_or_else(|| {
        AppError::ValidationError(format!(
            "{} event is missing data.object.{}",
            event.event_type, field
        ))
    })
}

fn ignored(event: &GatewayEvent, remote_id: &str) -> WebhookOutcome {
    debug!(
        event_id = %event.id,
        event_type = %event.event_type,
        remote_id,
        "Webhook references unknown entity"
    );
    WebhookOutcome::Ignored
}
