//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use std::collections::HashMap;

use chrono::{Months, Utc};
use uuid::Uuid;

use crate::domain::entities::{
    customer::Customer,
    plan::{BillingInterval, EffectiveTiming, Plan, PlanType},
    subscription::{Subscription, SubscriptionStatus},
};

/// Create a test plan with sensible defaults: active monthly base plan,
/// no trial, cancellation at period end.
pub fn create_test_plan(overrides: impl FnOnce(&mut Plan)) -> Plan {
    let now = Utc::now();
    let mut plan = Plan {
        id: Uuid::new_v4(),
        public_id: Uuid::new_v4(),
        name: "Basic".to_string(),
        slug: "basic".to_string(),
        description: Some("A basic plan".to_string()),
        gateway_product_id: None,
        gateway_price_id: Some("price_test123".to_string()),
        price_cents: 2900,
        interval: BillingInterval::Monthly,
        interval_count: 1,
        plan_type: PlanType::Plan,
        requires_plan: false,
        is_active: true,
        trial_period_days: 0,
        grace_period_days: 3,
        cancellation_behavior: EffectiveTiming::EndOfPeriod,
        change_behavior: EffectiveTiming::Immediate,
        prorate_changes: true,
        prorate_cancellations: true,
        features: vec!["reports".to_string()],
        limits: HashMap::new(),
        metadata: serde_json::json!({}),
        sort_order: 0,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    overrides(&mut plan);
    plan
}

/// Create a test customer billed to a fresh `user` billable.
pub fn create_test_customer(overrides: impl FnOnce(&mut Customer)) -> Customer {
    let now = Utc::now();
    let mut customer = Customer {
        id: Uuid::new_v4(),
        public_id: Uuid::new_v4(),
        billable_type: "user".to_string(),
        billable_id: Uuid::new_v4().to_string(),
        workspace_id: None,
        gateway_id: None,
        email: Some("test@example.com".to_string()),
        name: Some("Test Customer".to_string()),
        metadata: serde_json::json!({}),
        created_at: now,
        updated_at: now,
    };
    overrides(&mut customer);
    customer
}

/// Create an active subscription in its first monthly period.
pub fn create_test_subscription(
    customer_id: Uuid,
    overrides: impl FnOnce(&mut Subscription),
) -> Subscription {
    let now = Utc::now();
    let mut subscription = Subscription {
        id: Uuid::new_v4(),
        public_id: Uuid::new_v4(),
        customer_id,
        workspace_id: None,
        gateway_id: None,
        gateway_status: None,
        gateway_synced_at: None,
        status: SubscriptionStatus::Active,
        trial_ends_at: None,
        current_period_start: Some(now),
        current_period_end: now.checked_add_months(Months::new(1)),
        canceled_at: None,
        ends_at: None,
        failed_payment_count: 0,
        last_failed_payment_at: None,
        metadata: serde_json::json!({}),
        version: 0,
        created_at: now,
        updated_at: now,
    };
    overrides(&mut subscription);
    subscription
}
