use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "plan_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Plan,
    Addon,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Plan => "plan",
            PlanType::Addon => "addon",
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan" => Ok(PlanType::Plan),
            "addon" => Ok(PlanType::Addon),
            _ => Err(format!("Unknown plan type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "billing_interval", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Monthly,
    Yearly,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Monthly => "monthly",
            BillingInterval::Yearly => "yearly",
        }
    }

    /// Interval name understood by the payment gateway's recurring prices.
    pub fn gateway_interval(&self) -> &'static str {
        match self {
            BillingInterval::Monthly => "month",
            BillingInterval::Yearly => "year",
        }
    }

    /// Advance `from` by `count` intervals. Calendar-aware: Jan 31 + 1 month is Feb 28/29.
    pub fn advance(&self, from: DateTime<Utc>, count: i32) -> DateTime<Utc> {
        let count = count.max(1) as u32;
        let months = match self {
            BillingInterval::Monthly => count,
            BillingInterval::Yearly => count.saturating_mul(12),
        };
        from.checked_add_months(Months::new(months))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "monthly" | "month" => Ok(BillingInterval::Monthly),
            "yearly" | "year" | "annual" => Ok(BillingInterval::Yearly),
            _ => Err(format!("Unknown billing interval: {}", s)),
        }
    }
}

/// When a cancellation (or plan change) takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "effective_timing", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EffectiveTiming {
    Immediate,
    EndOfPeriod,
}

impl EffectiveTiming {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectiveTiming::Immediate => "immediate",
            EffectiveTiming::EndOfPeriod => "end_of_period",
        }
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self, EffectiveTiming::Immediate)
    }
}

impl FromStr for EffectiveTiming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(EffectiveTiming::Immediate),
            "end_of_period" => Ok(EffectiveTiming::EndOfPeriod),
            _ => Err(format!("Unknown effective timing: {}", s)),
        }
    }
}

/// Values applied to plan fields the caller leaves unset.
#[derive(Debug, Clone)]
pub struct PlanDefaults {
    pub trial_period_days: i32,
    pub grace_period_days: i32,
    pub cancellation_behavior: EffectiveTiming,
    pub change_behavior: EffectiveTiming,
    pub prorate_changes: bool,
    pub prorate_cancellations: bool,
}

impl Default for PlanDefaults {
    fn default() -> Self {
        Self {
            trial_period_days: 0,
            grace_period_days: 3,
            cancellation_behavior: EffectiveTiming::EndOfPeriod,
            change_behavior: EffectiveTiming::Immediate,
            prorate_changes: true,
            prorate_cancellations: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    #[serde(skip)]
    pub id: Uuid,
    #[serde(rename = "id")]
    pub public_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    #[serde(skip)]
    pub gateway_product_id: Option<String>,
    #[serde(skip)]
    pub gateway_price_id: Option<String>,
    pub price_cents: i64,
    pub interval: BillingInterval,
    pub interval_count: i32,
    #[serde(rename = "type")]
    pub plan_type: PlanType,
    pub requires_plan: bool,
    pub is_active: bool,
    pub trial_period_days: i32,
    pub grace_period_days: i32,
    pub cancellation_behavior: EffectiveTiming,
    pub change_behavior: EffectiveTiming,
    pub prorate_changes: bool,
    pub prorate_cancellations: bool,
    pub features: Vec<String>,
    pub limits: HashMap<String, serde_json::Value>,
    pub metadata: serde_json::Value,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Plan {
    pub fn is_plan(&self) -> bool {
        self.plan_type == PlanType::Plan
    }

    pub fn is_addon(&self) -> bool {
        self.plan_type == PlanType::Addon
    }

    /// Can be subscribed to without an accompanying base plan.
    pub fn is_standalone(&self) -> bool {
        !self.requires_plan
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Active and not soft-deleted; only these may be subscribed to.
    pub fn is_available(&self) -> bool {
        self.is_active && !self.is_deleted()
    }

    pub fn has_trial(&self) -> bool {
        self.trial_period_days > 0
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    pub fn limit(&self, key: &str) -> Option<&serde_json::Value> {
        self.limits.get(key)
    }

    pub fn interval_label(&self) -> String {
        if self.interval_count <= 1 {
            return self.interval.as_str().to_string();
        }
        let unit = match self.interval {
            BillingInterval::Monthly => "months",
            BillingInterval::Yearly => "years",
        };
        format!("{} {}", self.interval_count, unit)
    }

    /// End of the first billing period for a subscription starting at `start`.
    pub fn period_end_from(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        self.interval.advance(start, self.interval_count)
    }
}
