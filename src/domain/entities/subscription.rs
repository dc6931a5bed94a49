use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::plan::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Suspended,
    Incomplete,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Incomplete => "incomplete",
        }
    }

    /// Returns true if the customer should have access to subscribed features.
    pub fn is_entitled(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        )
    }

    /// Transitions reachable through ordinary operations. Resuming a canceled
    /// subscription during its grace period is handled separately.
    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        use SubscriptionStatus::*;

        if *self == next {
            return true;
        }
        match (self, next) {
            (Incomplete, Active | Canceled) => true,
            (Active, Trialing | PastDue | Canceled | Suspended) => true,
            (Trialing, Active | PastDue | Canceled) => true,
            (PastDue, Active | Trialing | Canceled | Suspended) => true,
            (Suspended, Active | Canceled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(SubscriptionStatus::Active),
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "canceled" | "cancelled" => Ok(SubscriptionStatus::Canceled),
            "suspended" => Ok(SubscriptionStatus::Suspended),
            "incomplete" => Ok(SubscriptionStatus::Incomplete),
            _ => Err(format!("Unknown subscription status: {}", s)),
        }
    }
}

/// Remote subscription state carried by a gateway event.
#[derive(Debug, Clone)]
pub struct GatewaySubscriptionState {
    pub status: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    #[serde(skip)]
    pub id: Uuid,
    #[serde(rename = "id")]
    pub public_id: Uuid,
    #[serde(skip)]
    pub customer_id: Uuid,
    pub workspace_id: Option<Uuid>,
    #[serde(skip)]
    pub gateway_id: Option<String>,
    #[serde(skip)]
    pub gateway_status: Option<String>,
    #[serde(skip)]
    pub gateway_synced_at: Option<DateTime<Utc>>,
    pub status: SubscriptionStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub failed_payment_count: i32,
    pub last_failed_payment_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    #[serde(skip)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// A new active subscription whose first period is sized by `plan`.
    pub fn new(
        customer_id: Uuid,
        workspace_id: Option<Uuid>,
        plan: &Plan,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            public_id: Uuid::new_v4(),
            customer_id,
            workspace_id,
            gateway_id: None,
            gateway_status: None,
            gateway_synced_at: None,
            status: SubscriptionStatus::Active,
            trial_ends_at: None,
            current_period_start: Some(now),
            current_period_end: Some(plan.period_end_from(now)),
            canceled_at: None,
            ends_at: None,
            failed_payment_count: 0,
            last_failed_payment_at: None,
            metadata: serde_json::json!({}),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.ends_at.is_some_and(|ends_at| ends_at <= now)
    }

    pub fn on_grace_period(&self, now: DateTime<Utc>) -> bool {
        self.canceled_at.is_some() && self.ends_at.is_some_and(|ends_at| ends_at > now)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && !self.has_ended(now)
    }

    pub fn is_trialing(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Trialing
            && self.trial_ends_at.is_some_and(|trial_ends_at| trial_ends_at > now)
    }

    pub fn is_past_due(&self) -> bool {
        self.status == SubscriptionStatus::PastDue
    }

    pub fn is_canceled(&self) -> bool {
        self.status == SubscriptionStatus::Canceled
    }

    /// Applies a local cancellation. Ends now when `immediate`, otherwise at
    /// the current period end (or now if no period is recorded).
    pub fn apply_cancellation(&mut self, immediate: bool, now: DateTime<Utc>) {
        self.status = SubscriptionStatus::Canceled;
        self.canceled_at = Some(now);
        self.ends_at = if immediate {
            Some(now)
        } else {
            Some(self.current_period_end.unwrap_or(now))
        };
    }

    /// Clears cancellation markers. Callers check `on_grace_period` first.
    pub fn apply_resume(&mut self) {
        self.status = SubscriptionStatus::Active;
        self.canceled_at = None;
        self.ends_at = None;
    }

    /// Records a failed payment. Returns true if the status moved to past_due.
    pub fn record_payment_failure(&mut self, now: DateTime<Utc>) -> bool {
        self.failed_payment_count += 1;
        self.last_failed_payment_at = Some(now);
        if self.status != SubscriptionStatus::PastDue
            && self.status.can_transition_to(SubscriptionStatus::PastDue)
        {
            self.status = SubscriptionStatus::PastDue;
            return true;
        }
        false
    }

    /// Gateway-side deletion. Returns false when already canceled and ended.
    pub fn force_cancel(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_canceled() && self.has_ended(now) {
            return false;
        }
        self.status = SubscriptionStatus::Canceled;
        self.canceled_at.get_or_insert(now);
        self.ends_at = Some(now);
        true
    }

    /// Mirrors remote status and period bounds. Older observations are
    /// dropped; cancellation markers and local status are never touched.
    pub fn mirror_gateway_state(&mut self, state: &GatewaySubscriptionState) -> bool {
        if self
            .gateway_synced_at
            .is_some_and(|synced_at| synced_at > state.observed_at)
        {
            return false;
        }
        if let Some(status) = &state.status {
            self.gateway_status = Some(status.clone());
        }
        if state.current_period_start.is_some() {
            self.current_period_start = state.current_period_start;
        }
        if state.current_period_end.is_some() {
            self.current_period_end = state.current_period_end;
        }
        self.gateway_synced_at = Some(state.observed_at);
        true
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionItem {
    #[serde(skip)]
    pub id: Uuid,
    #[serde(rename = "id")]
    pub public_id: Uuid,
    #[serde(skip)]
    pub subscription_id: Uuid,
    #[serde(skip)]
    pub plan_id: Uuid,
    #[serde(skip)]
    pub gateway_id: Option<String>,
    pub quantity: i32,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionItem {
    pub fn new(subscription_id: Uuid, plan_id: Uuid, quantity: i32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            public_id: Uuid::new_v4(),
            subscription_id,
            plan_id,
            gateway_id: None,
            quantity,
            trial_ends_at: None,
            ends_at: None,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.ends_at.is_some_and(|ends_at| ends_at <= now)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.has_ended(now)
    }

    pub fn on_trial(&self, now: DateTime<Utc>) -> bool {
        self.trial_ends_at.is_some_and(|trial_ends_at| trial_ends_at > now)
    }
}
