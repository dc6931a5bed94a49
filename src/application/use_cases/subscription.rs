use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        billing_events::{BillingEvent, BillingEventSink},
        payment_gateway::{
            PaymentGatewayPort, RemoteSubscriptionId, RemoteSubscriptionItem,
            RemoteSubscriptionRequest,
        },
    },
    domain::entities::{
        customer::Customer,
        plan::{EffectiveTiming, Plan},
        subscription::{
            GatewaySubscriptionState, Subscription, SubscriptionItem, SubscriptionStatus,
        },
    },
    use_cases::catalog::PlanRepo,
};

/// Attempts for a single compare-and-swap mutation before giving up.
const MAX_UPDATE_ATTEMPTS: usize = 5;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionItemDetails {
    #[serde(flatten)]
    pub item: SubscriptionItem,
    /// `None` only if the plan row itself is gone.
    pub plan: Option<Plan>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionDetails {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub items: Vec<SubscriptionItemDetails>,
}

/// Side information about the best-effort gateway call of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum GatewaySync {
    Skipped,
    Synced,
    Failed(String),
}

impl GatewaySync {
    pub fn is_failed(&self) -> bool {
        matches!(self, GatewaySync::Failed(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionOutcome {
    pub subscription: SubscriptionDetails,
    pub gateway_sync: GatewaySync,
}

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait SubscriptionRepo: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>>;
    async fn get_by_public_id(&self, public_id: Uuid) -> AppResult<Option<Subscription>>;
    async fn get_by_gateway_id(&self, gateway_id: &str) -> AppResult<Option<Subscription>>;
    async fn list_by_customer(&self, customer_id: Uuid) -> AppResult<Vec<Subscription>>;
    /// Stores a new subscription and its first item atomically.
    async fn create_with_item(
        &self,
        subscription: &Subscription,
        item: &SubscriptionItem,
    ) -> AppResult<Subscription>;
    /// Compare-and-swap on `version`. Returns the stored row with the bumped
    /// version, or `ConcurrencyConflict` if the row changed since it was read.
    async fn update(&self, subscription: &Subscription) -> AppResult<Subscription>;
}

#[async_trait]
pub trait SubscriptionItemRepo: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<SubscriptionItem>>;
    /// Oldest first.
    async fn list_by_subscription(&self, subscription_id: Uuid) -> AppResult<Vec<SubscriptionItem>>;
    async fn create(&self, item: &SubscriptionItem) -> AppResult<SubscriptionItem>;
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct SubscriptionUseCases {
    subscription_repo: Arc<dyn SubscriptionRepo>,
    item_repo: Arc<dyn SubscriptionItemRepo>,
    plan_repo: Arc<dyn PlanRepo>,
    gateway: Option<Arc<dyn PaymentGatewayPort>>,
    events: Arc<dyn BillingEventSink>,
    gateway_timeout: Duration,
}

impl SubscriptionUseCases {
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepo>,
        item_repo: Arc<dyn SubscriptionItemRepo>,
        plan_repo: Arc<dyn PlanRepo>,
        gateway: Option<Arc<dyn PaymentGatewayPort>>,
        events: Arc<dyn BillingEventSink>,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            subscription_repo,
            item_repo,
            plan_repo,
            gateway,
            events,
            gateway_timeout,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    #[instrument(skip(self, customer), fields(customer_id = %customer.id))]
    pub async fn create(
        &self,
        customer: &Customer,
        plan_public_id: Uuid,
        quantity: i32,
    ) -> AppResult<SubscriptionOutcome> {
        if quantity < 1 {
            return Err(AppError::ValidationError(
                "Quantity must be at least 1".into(),
            ));
        }
        let plan = self.available_plan(plan_public_id).await?;
        if plan.requires_plan {
            return Err(AppError::Composition(format!(
                "Plan '{}' requires a base plan on the subscription",
                plan.slug
            )));
        }

        let now = Utc::now();
        let subscription = Subscription::new(customer.id, customer.workspace_id, &plan, now);
        let item = SubscriptionItem::new(subscription.id, plan.id, quantity, now);
        let mut subscription = self
            .subscription_repo
            .create_with_item(&subscription, &item)
            .await?;
        info!(subscription_id = %subscription.id, plan_id = %plan.id, "Subscription created");

        let gateway_sync = match &self.gateway {
            None => GatewaySync::Skipped,
            Some(gateway) => {
                let request = RemoteSubscriptionRequest {
                    subscription_id: subscription.id,
                    customer_gateway_id: customer.gateway_id.clone(),
                    items: vec![RemoteSubscriptionItem {
                        price_id: plan.gateway_price_id.clone(),
                        quantity,
                    }],
                };
                match self
                    .call_gateway(gateway.create_remote_subscription(&request))
                    .await
                {
                    Ok(remote) => {
                        let (saved, _) = self
                            .mutate(subscription.id, |s| {
                                s.gateway_id = Some(remote.id.as_str().to_string());
                                s.gateway_status = Some(remote.status.clone());
                                Ok(true)
                            })
                            .await?;
                        subscription = saved;
                        GatewaySync::Synced
                    }
                    Err(error) => {
                        let (saved, _) = self
                            .mutate(subscription.id, |s| {
                                s.status = SubscriptionStatus::Incomplete;
                                Ok(true)
                            })
                            .await?;
                        subscription = saved;
                        self.report_sync_failure(subscription.id, "create", &error)
                            .await;
                        GatewaySync::Failed(error)
                    }
                }
            }
        };

        self.events
            .emit(BillingEvent::SubscriptionCreated {
                subscription_id: subscription.id,
                customer_id: customer.id,
                plan_id: plan.id,
            })
            .await;

        Ok(SubscriptionOutcome {
            subscription: self.details(subscription).await?,
            gateway_sync,
        })
    }

    /// Attaches another plan or addon. Addons that require a base plan are
    /// rejected unless a plan-type item is already present.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        subscription_id: Uuid,
        plan_public_id: Uuid,
        quantity: i32,
    ) -> AppResult<SubscriptionItem> {
        if quantity < 1 {
            return Err(AppError::ValidationError(
                "Quantity must be at least 1".into(),
            ));
        }
        let subscription = self.load(subscription_id).await?;
        if subscription.has_ended(Utc::now()) {
            return Err(AppError::ValidationError(
                "Subscription has already ended".into(),
            ));
        }
        let plan = self.available_plan(plan_public_id).await?;

        // Items are never detached, so a passing check cannot be invalidated later.
        if plan.requires_plan && !self.has_plan_item(subscription.id).await? {
            return Err(AppError::Composition(format!(
                "Plan '{}' requires a base plan on the subscription",
                plan.slug
            )));
        }

        let item = SubscriptionItem::new(subscription.id, plan.id, quantity, Utc::now());
        let item = self.item_repo.create(&item).await?;
        info!(subscription_id = %subscription.id, item_id = %item.id, "Subscription item added");
        Ok(item)
    }

    /// Cancels locally first; the gateway call afterwards is best-effort.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        subscription_id: Uuid,
        immediately: bool,
    ) -> AppResult<SubscriptionOutcome> {
        let immediate = immediately
            || self
                .primary_cancellation_behavior(subscription_id)
                .await?
                .is_immediate();
        let now = Utc::now();

        let (subscription, _) = self
            .mutate(subscription_id, |s| {
                if s.is_canceled() && s.has_ended(now) {
                    return Err(AppError::ValidationError(
                        "Subscription has already ended".into(),
                    ));
                }
                s.apply_cancellation(immediate, now);
                Ok(true)
            })
            .await?;
        info!(
            subscription_id = %subscription.id,
            immediate,
            ends_at = ?subscription.ends_at,
            "Subscription canceled"
        );

        let gateway_sync = match (&self.gateway, subscription.gateway_id.as_deref()) {
            (Some(gateway), Some(remote_id)) => {
                let remote_id = RemoteSubscriptionId::new(remote_id);
                match self
                    .call_gateway(gateway.cancel_remote_subscription(&remote_id, immediate))
                    .await
                {
                    Ok(()) => GatewaySync::Synced,
                    Err(error) => {
                        self.report_sync_failure(subscription.id, "cancel", &error)
                            .await;
                        GatewaySync::Failed(error)
                    }
                }
            }
            _ => GatewaySync::Skipped,
        };

        self.events
            .emit(BillingEvent::SubscriptionCanceled {
                subscription_id: subscription.id,
                immediate,
            })
            .await;

        Ok(SubscriptionOutcome {
            subscription: self.details(subscription).await?,
            gateway_sync,
        })
    }

    /// Only allowed while on the cancellation grace period; leaves the
    /// subscription untouched otherwise.
    #[instrument(skip(self))]
    pub async fn resume(&self, subscription_id: Uuid) -> AppResult<SubscriptionOutcome> {
        let now = Utc::now();
        let (subscription, _) = self
            .mutate(subscription_id, |s| {
                if !s.on_grace_period(now) {
                    return Err(AppError::NotResumable(
                        "Subscription is not on its cancellation grace period".into(),
                    ));
                }
                s.apply_resume();
                Ok(true)
            })
            .await?;
        info!(subscription_id = %subscription.id, "Subscription resumed");

        self.events
            .emit(BillingEvent::SubscriptionResumed {
                subscription_id: subscription.id,
            })
            .await;

        Ok(SubscriptionOutcome {
            subscription: self.details(subscription).await?,
            gateway_sync: GatewaySync::Skipped,
        })
    }

    #[instrument(skip(self))]
    pub async fn suspend(&self, subscription_id: Uuid) -> AppResult<Subscription> {
        let (subscription, changed) = self
            .mutate(subscription_id, |s| {
                if s.status == SubscriptionStatus::Suspended {
                    return Ok(false);
                }
                if !matches!(
                    s.status,
                    SubscriptionStatus::Active | SubscriptionStatus::PastDue
                ) {
                    return Err(AppError::ValidationError(format!(
                        "Cannot suspend a {} subscription",
                        s.status
                    )));
                }
                s.status = SubscriptionStatus::Suspended;
                Ok(true)
            })
            .await?;

        if changed {
            info!(subscription_id = %subscription.id, "Subscription suspended");
            self.events
                .emit(BillingEvent::SubscriptionSuspended {
                    subscription_id: subscription.id,
                })
                .await;
        }
        Ok(subscription)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn list_for_customer(&self, customer: &Customer) -> AppResult<Vec<SubscriptionDetails>> {
        let subscriptions = self.subscription_repo.list_by_customer(customer.id).await?;
        let mut details = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            details.push(self.details(subscription).await?);
        }
        Ok(details)
    }

    pub async fn get_for_customer(
        &self,
        customer: &Customer,
        public_id: Uuid,
    ) -> AppResult<SubscriptionDetails> {
        let subscription = self.find_owned(customer, public_id).await?;
        self.details(subscription).await
    }

    /// Resolves a subscription by its public id, enforcing ownership.
    pub async fn find_owned(&self, customer: &Customer, public_id: Uuid) -> AppResult<Subscription> {
        let subscription = self
            .subscription_repo
            .get_by_public_id(public_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if subscription.customer_id != customer.id {
            return Err(AppError::Forbidden);
        }
        Ok(subscription)
    }

    pub async fn get_item(
        &self,
        subscription_id: Uuid,
        plan_id: Uuid,
    ) -> AppResult<Option<SubscriptionItem>> {
        Ok(self
            .item_repo
            .list_by_subscription(subscription_id)
            .await?
            .into_iter()
            .find(|item| item.plan_id == plan_id))
    }

    pub async fn has_plan(&self, subscription_id: Uuid, plan_id: Uuid) -> AppResult<bool> {
        Ok(self.get_item(subscription_id, plan_id).await?.is_some())
    }

    // ========================================================================
    // Gateway-driven updates (used by the webhook reconciler)
    // ========================================================================

    /// Returns `None` when no local subscription has this gateway id.
    #[instrument(skip(self))]
    pub async fn record_payment_failure(&self, gateway_id: &str) -> AppResult<Option<Subscription>> {
        let Some(subscription) = self.subscription_repo.get_by_gateway_id(gateway_id).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        let (subscription, _) = self
            .mutate(subscription.id, |s| {
                s.record_payment_failure(now);
                Ok(true)
            })
            .await?;
        warn!(
            subscription_id = %subscription.id,
            failed_payment_count = subscription.failed_payment_count,
            status = %subscription.status,
            "Payment failed for subscription"
        );
        Ok(Some(subscription))
    }

    #[instrument(skip(self, state))]
    pub async fn mirror_gateway_state(
        &self,
        gateway_id: &str,
        state: &GatewaySubscriptionState,
    ) -> AppResult<Option<(Subscription, bool)>> {
        let Some(subscription) = self.subscription_repo.get_by_gateway_id(gateway_id).await? else {
            return Ok(None);
        };
        let (subscription, applied) = self
            .mutate(subscription.id, |s| Ok(s.mirror_gateway_state(state)))
            .await?;
        if applied {
            debug!(subscription_id = %subscription.id, "Mirrored gateway subscription state");
        } else {
            debug!(subscription_id = %subscription.id, "Ignored stale gateway subscription state");
        }
        Ok(Some((subscription, applied)))
    }

    #[instrument(skip(self))]
    pub async fn cancel_from_gateway(
        &self,
        gateway_id: &str,
    ) -> AppResult<Option<(Subscription, bool)>> {
        let Some(subscription) = self.subscription_repo.get_by_gateway_id(gateway_id).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        let (subscription, changed) = self
            .mutate(subscription.id, |s| Ok(s.force_cancel(now)))
            .await?;
        if changed {
            info!(subscription_id = %subscription.id, "Subscription canceled by gateway");
            self.events
                .emit(BillingEvent::SubscriptionCanceled {
                    subscription_id: subscription.id,
                    immediate: true,
                })
                .await;
        }
        Ok(Some((subscription, changed)))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn load(&self, subscription_id: Uuid) -> AppResult<Subscription> {
        self.subscription_repo
            .get_by_id(subscription_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn available_plan(&self, plan_public_id: Uuid) -> AppResult<Plan> {
        let plan = self
            .plan_repo
            .get_by_public_id(plan_public_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if !plan.is_available() {
            return Err(AppError::ValidationError(format!(
                "Plan '{}' is not available",
                plan.slug
            )));
        }
        Ok(plan)
    }

    async fn item_plans(&self, subscription_id: Uuid) -> AppResult<Vec<SubscriptionItemDetails>> {
        let items = self.item_repo.list_by_subscription(subscription_id).await?;
        let mut details = Vec::with_capacity(items.len());
        for item in items {
            let plan = self.plan_repo.get_by_id(item.plan_id).await?;
            details.push(SubscriptionItemDetails { item, plan });
        }
        Ok(details)
    }

    async fn has_plan_item(&self, subscription_id: Uuid) -> AppResult<bool> {
        Ok(self
            .item_plans(subscription_id)
            .await?
            .iter()
            .any(|d| d.plan.as_ref().is_some_and(Plan::is_plan)))
    }

    /// Cancellation policy of the first plan-type item; end of period otherwise.
    async fn primary_cancellation_behavior(
        &self,
        subscription_id: Uuid,
    ) -> AppResult<EffectiveTiming> {
        Ok(self
            .item_plans(subscription_id)
            .await?
            .into_iter()
            .filter_map(|d| d.plan)
            .find(Plan::is_plan)
            .map(|plan| plan.cancellation_behavior)
            .unwrap_or(EffectiveTiming::EndOfPeriod))
    }

    async fn details(&self, subscription: Subscription) -> AppResult<SubscriptionDetails> {
        let items = self.item_plans(subscription.id).await?;
        Ok(SubscriptionDetails {
            subscription,
            items,
        })
    }

    /// Read-modify-write with optimistic concurrency. `apply` returns whether
    /// it changed anything; unchanged rows are not written.
    async fn mutate<F>(&self, subscription_id: Uuid, mut apply: F) -> AppResult<(Subscription, bool)>
    where
        F: FnMut(&mut Subscription) -> AppResult<bool> + Send,
    {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let mut subscription = self.load(subscription_id).await?;
            if !apply(&mut subscription)? {
                return Ok((subscription, false));
            }
            subscription.updated_at = Utc::now();
            match self.subscription_repo.update(&subscription).await {
                Ok(saved) => return Ok((saved, true)),
                Err(AppError::ConcurrencyConflict) => {
                    debug!(
                        subscription_id = %subscription_id,
                        attempt,
                        "Subscription changed concurrently, retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Err(AppError::Internal(format!(
            "Subscription {} kept changing concurrently",
            subscription_id
        )))
    }

    async fn call_gateway<T, F>(&self, call: F) -> Result<T, String>
    where
        F: Future<Output = AppResult<T>> + Send,
    {
        match tokio::time::timeout(self.gateway_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(format!(
                "Gateway call timed out after {}ms",
                self.gateway_timeout.as_millis()
            )),
        }
    }

    async fn report_sync_failure(&self, subscription_id: Uuid, operation: &'static str, error: &str) {
        warn!(
            subscription_id = %subscription_id,
            operation,
            error,
            "Payment gateway sync failed, keeping local state"
        );
        self.events
            .emit(BillingEvent::GatewaySyncFailed {
                subscription_id,
                operation,
                error: error.to_string(),
            })
            .await;
    }
}
