use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::plan::{BillingInterval, EffectiveTiming, Plan, PlanDefaults, PlanType},
    validators::is_valid_plan_slug,
};

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlanInput {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price_cents: i64,
    pub interval: BillingInterval,
    #[serde(default)]
    pub interval_count: Option<i32>,
    #[serde(default = "default_plan_type", rename = "type")]
    pub plan_type: PlanType,
    #[serde(default)]
    pub requires_plan: bool,
    #[serde(default)]
    pub trial_period_days: Option<i32>,
    #[serde(default)]
    pub grace_period_days: Option<i32>,
    #[serde(default)]
    pub cancellation_behavior: Option<EffectiveTiming>,
    #[serde(default)]
    pub change_behavior: Option<EffectiveTiming>,
    #[serde(default)]
    pub prorate_changes: Option<bool>,
    #[serde(default)]
    pub prorate_cancellations: Option<bool>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub limits: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub gateway_product_id: Option<String>,
    #[serde(default)]
    pub gateway_price_id: Option<String>,
}

fn default_plan_type() -> PlanType {
    PlanType::Plan
}

#[async_trait]
pub trait PlanRepo: Send + Sync {
    /// Resolves soft-deleted plans too.
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Plan>>;
    /// Resolves soft-deleted plans too.
    async fn get_by_public_id(&self, public_id: Uuid) -> AppResult<Option<Plan>>;
    async fn get_by_slug(&self, slug: &str) -> AppResult<Option<Plan>>;
    /// Active, not soft-deleted, ordered by `sort_order` then `name`.
    async fn list_active(&self) -> AppResult<Vec<Plan>>;
    async fn create(&self, plan: &Plan) -> AppResult<Plan>;
    async fn update(&self, plan: &Plan) -> AppResult<Plan>;
}

/// Validates `input` and fills unset fields from `defaults`.
pub fn build_plan(
    input: CreatePlanInput,
    defaults: &PlanDefaults,
    now: DateTime<Utc>,
) -> AppResult<Plan> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::ValidationError("Plan name is required".into()));
    }
    let slug = input.slug.trim().to_lowercase();
    if !is_valid_plan_slug(&slug) {
        return Err(AppError::ValidationError(format!(
            "Invalid plan slug: {}",
            input.slug
        )));
    }
    if input.price_cents < 0 {
        return Err(AppError::ValidationError("Price cannot be negative".into()));
    }
    let interval_count = input.interval_count.unwrap_or(1);
    if interval_count < 1 {
        return Err(AppError::ValidationError(
            "Interval count must be at least 1".into(),
        ));
    }
    let trial_period_days = input.trial_period_days.unwrap_or(defaults.trial_period_days);
    let grace_period_days = input.grace_period_days.unwrap_or(defaults.grace_period_days);
    if trial_period_days < 0 || grace_period_days < 0 {
        return Err(AppError::ValidationError(
            "Trial and grace periods cannot be negative".into(),
        ));
    }

    Ok(Plan {
        id: Uuid::new_v4(),
        public_id: Uuid::new_v4(),
        name,
        slug,
        description: input.description,
        gateway_product_id: input.gateway_product_id,
        gateway_price_id: input.gateway_price_id,
        price_cents: input.price_cents,
        interval: input.interval,
        interval_count,
        plan_type: input.plan_type,
        requires_plan: input.requires_plan,
        is_active: true,
        trial_period_days,
        grace_period_days,
        cancellation_behavior: input
            .cancellation_behavior
            .unwrap_or(defaults.cancellation_behavior),
        change_behavior: input.change_behavior.unwrap_or(defaults.change_behavior),
        prorate_changes: input.prorate_changes.unwrap_or(defaults.prorate_changes),
        prorate_cancellations: input
            .prorate_cancellations
            .unwrap_or(defaults.prorate_cancellations),
        features: input.features,
        limits: input.limits,
        metadata: input.metadata.unwrap_or_else(|| serde_json::json!({})),
        sort_order: input.sort_order,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    })
}

#[derive(Clone)]
pub struct CatalogUseCases {
    plan_repo: Arc<dyn PlanRepo>,
    defaults: PlanDefaults,
}

impl CatalogUseCases {
    pub fn new(plan_repo: Arc<dyn PlanRepo>, defaults: PlanDefaults) -> Self {
        Self {
            plan_repo,
            defaults,
        }
    }

    pub async fn list_public_plans(&self) -> AppResult<Vec<Plan>> {
        self.plan_repo.list_active().await
    }

    /// Only active, non-deleted plans are visible publicly.
    pub async fn get_public_plan(&self, public_id: Uuid) -> AppResult<Plan> {
        self.plan_repo
            .get_by_public_id(public_id)
            .await?
            .filter(Plan::is_available)
            .ok_or(AppError::NotFound)
    }

    /// Resolves a plan for historical records, soft-deleted or not.
    pub async fn get_plan_any(&self, id: Uuid) -> AppResult<Option<Plan>> {
        self.plan_repo.get_by_id(id).await
    }

    #[instrument(skip(self, input), fields(slug = %input.slug))]
    pub async fn create_plan(&self, input: CreatePlanInput) -> AppResult<Plan> {
        let plan = build_plan(input, &self.defaults, Utc::now())?;
        if self.plan_repo.get_by_slug(&plan.slug).await?.is_some() {
            return Err(AppError::ValidationError(format!(
                "Plan slug already in use: {}",
                plan.slug
            )));
        }
        let plan = self.plan_repo.create(&plan).await?;
        tracing::info!(plan_id = %plan.id, "Plan created");
        Ok(plan)
    }

    #[instrument(skip(self))]
    pub async fn archive_plan(&self, public_id: Uuid) -> AppResult<Plan> {
        let mut plan = self
            .plan_repo
            .get_by_public_id(public_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if plan.is_deleted() {
            return Ok(plan);
        }
        let now = Utc::now();
        plan.deleted_at = Some(now);
        plan.updated_at = now;
        self.plan_repo.update(&plan).await
    }

    #[instrument(skip(self))]
    pub async fn set_plan_active(&self, public_id: Uuid, is_active: bool) -> AppResult<Plan> {
        let mut plan = self
            .plan_repo
            .get_by_public_id(public_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if plan.is_deleted() {
            return Err(AppError::ValidationError("Plan has been archived".into()));
        }
        plan.is_active = is_active;
        plan.updated_at = Utc::now();
        self.plan_repo.update(&plan).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{InMemoryPlanRepo, create_test_plan};

    fn input(slug: &str) -> CreatePlanInput {
        CreatePlanInput {
            name: "Team".into(),
            slug: slug.into(),
            description: None,
            price_cents: 4900,
            interval: BillingInterval::Monthly,
            interval_count: None,
            plan_type: PlanType::Plan,
            requires_plan: false,
            trial_period_days: None,
            grace_period_days: None,
            cancellation_behavior: None,
            change_behavior: None,
            prorate_changes: None,
            prorate_cancellations: None,
            features: vec![],
            limits: HashMap::new(),
            metadata: None,
            sort_order: 0,
            gateway_product_id: None,
            gateway_price_id: None,
        }
    }

    #[test]
    fn build_plan_applies_configured_defaults() {
        let defaults = PlanDefaults {
            trial_period_days: 14,
            cancellation_behavior: EffectiveTiming::Immediate,
            ..PlanDefaults::default()
        };
        let mut custom = input("team");
        custom.prorate_changes = Some(false);

        let plan = build_plan(custom, &defaults, Utc::now()).unwrap();

        assert_eq!(plan.trial_period_days, 14);
        assert_eq!(plan.cancellation_behavior, EffectiveTiming::Immediate);
        assert!(!plan.prorate_changes);
        assert_eq!(plan.interval_count, 1);
        assert_ne!(plan.id, plan.public_id);
    }

    #[test]
    fn build_plan_rejects_invalid_input() {
        let defaults = PlanDefaults::default();

        let mut negative = input("team");
        negative.price_cents = -1;
        assert!(matches!(
            build_plan(negative, &defaults, Utc::now()),
            Err(AppError::ValidationError(_))
        ));

        let mut zero_interval = input("team");
        zero_interval.interval_count = Some(0);
        assert!(matches!(
            build_plan(zero_interval, &defaults, Utc::now()),
            Err(AppError::ValidationError(_))
        ));

        assert!(matches!(
            build_plan(input("bad slug"), &defaults, Utc::now()),
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn public_listing_hides_inactive_and_archived_plans() {
        let visible_b = create_test_plan(|p| {
            p.name = "B".into();
            p.sort_order = 1;
        });
        let visible_a = create_test_plan(|p| {
            p.name = "A".into();
            p.sort_order = 1;
        });
        let first = create_test_plan(|p| {
            p.name = "Z".into();
            p.sort_order = 0;
        });
        let inactive = create_test_plan(|p| p.is_active = false);
        let archived = create_test_plan(|p| p.deleted_at = Some(Utc::now()));
        let repo = Arc::new(InMemoryPlanRepo::with_plans(vec![
            visible_b.clone(),
            visible_a.clone(),
            first.clone(),
            inactive.clone(),
            archived.clone(),
        ]));
        let catalog = CatalogUseCases::new(repo, PlanDefaults::default());

        let names: Vec<String> = catalog
            .list_public_plans()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Z", "A", "B"]);

        assert!(matches!(
            catalog.get_public_plan(archived.public_id).await,
            Err(AppError::NotFound)
        ));
        assert!(catalog.get_plan_any(archived.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn create_plan_rejects_duplicate_slug() {
        let existing = create_test_plan(|p| p.slug = "team".into());
        let repo = Arc::new(InMemoryPlanRepo::with_plans(vec![existing]));
        let catalog = CatalogUseCases::new(repo, PlanDefaults::default());

        let result = catalog.create_plan(input("team")).await;
        assert!(matches!(result, Err(AppError::ValidationError(_))));

        let created = catalog.create_plan(input("team-plus")).await.unwrap();
        assert_eq!(created.slug, "team-plus");
    }

    #[tokio::test]
    async fn archived_plan_still_resolves_but_cannot_be_reactivated() {
        let plan = create_test_plan(|_| {});
        let repo = Arc::new(InMemoryPlanRepo::with_plans(vec![plan.clone()]));
        let catalog = CatalogUseCases::new(repo, PlanDefaults::default());

        let archived = catalog.archive_plan(plan.public_id).await.unwrap();
        assert!(archived.is_deleted());
        assert!(matches!(
            catalog.set_plan_active(plan.public_id, true).await,
            Err(AppError::ValidationError(_))
        ));
    }
}
