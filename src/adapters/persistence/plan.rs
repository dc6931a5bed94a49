use async_trait::async_trait;
use sqlx::{Row, types::Json};
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, parse_json_with_fallback},
    app_error::{AppError, AppResult},
    application::use_cases::catalog::PlanRepo,
    domain::entities::plan::Plan,
};

fn row_to_plan(row: sqlx::postgres::PgRow) -> Plan {
    let id: Uuid = row.get("id");
    let entity_id = id.to_string();
    let features_json: serde_json::Value = row.get("features");
    let limits_json: serde_json::Value = row.get("limits");

    Plan {
        id,
        public_id: row.get("public_id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        gateway_product_id: row.get("gateway_product_id"),
        gateway_price_id: row.get("gateway_price_id"),
        price_cents: row.get("price_cents"),
        interval: row.get("billing_interval"),
        interval_count: row.get("interval_count"),
        plan_type: row.get("plan_type"),
        requires_plan: row.get("requires_plan"),
        is_active: row.get("is_active"),
        trial_period_days: row.get("trial_period_days"),
        grace_period_days: row.get("grace_period_days"),
        cancellation_behavior: row.get("cancellation_behavior"),
        change_behavior: row.get("change_behavior"),
        prorate_changes: row.get("prorate_changes"),
        prorate_cancellations: row.get("prorate_cancellations"),
        features: parse_json_with_fallback(&features_json, "features", "plan", &entity_id),
        limits: parse_json_with_fallback(&limits_json, "limits", "plan", &entity_id),
        metadata: row.get("metadata"),
        sort_order: row.get("sort_order"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, public_id, name, slug, description, gateway_product_id, gateway_price_id,
    price_cents, billing_interval, interval_count, plan_type, requires_plan, is_active,
    trial_period_days, grace_period_days, cancellation_behavior, change_behavior,
    prorate_changes, prorate_cancellations, features, limits, metadata, sort_order,
    created_at, updated_at, deleted_at
"#;

#[async_trait]
impl PlanRepo for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Plan>> {
        let row = sqlx::query(&format!("SELECT {} FROM plans WHERE id = $1", SELECT_COLS))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;
        Ok(row.map(row_to_plan))
    }

    async fn get_by_public_id(&self, public_id: Uuid) -> AppResult<Option<Plan>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM plans WHERE public_id = $1",
            SELECT_COLS
        ))
        .bind(public_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_plan))
    }

    async fn get_by_slug(&self, slug: &str) -> AppResult<Option<Plan>> {
        let row = sqlx::query(&format!("SELECT {} FROM plans WHERE slug = $1", SELECT_COLS))
            .bind(slug)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;
        Ok(row.map(row_to_plan))
    }

    async fn list_active(&self) -> AppResult<Vec<Plan>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM plans WHERE is_active = true AND deleted_at IS NULL ORDER BY sort_order, name",
            SELECT_COLS
        ))
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_plan).collect())
    }

    async fn create(&self, plan: &Plan) -> AppResult<Plan> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO plans (
                id, public_id, name, slug, description, gateway_product_id, gateway_price_id,
                price_cents, billing_interval, interval_count, plan_type, requires_plan, is_active,
                trial_period_days, grace_period_days, cancellation_behavior, change_behavior,
                prorate_changes, prorate_cancellations, features, limits, metadata, sort_order,
                created_at, updated_at, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23, $24, $25, $26)
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(plan.id)
        .bind(plan.public_id)
        .bind(&plan.name)
        .bind(&plan.slug)
        .bind(&plan.description)
        .bind(&plan.gateway_product_id)
        .bind(&plan.gateway_price_id)
        .bind(plan.price_cents)
        .bind(plan.interval)
        .bind(plan.interval_count)
        .bind(plan.plan_type)
        .bind(plan.requires_plan)
        .bind(plan.is_active)
        .bind(plan.trial_period_days)
        .bind(plan.grace_period_days)
        .bind(plan.cancellation_behavior)
        .bind(plan.change_behavior)
        .bind(plan.prorate_changes)
        .bind(plan.prorate_cancellations)
        .bind(Json(&plan.features))
        .bind(Json(&plan.limits))
        .bind(&plan.metadata)
        .bind(plan.sort_order)
        .bind(plan.created_at)
        .bind(plan.updated_at)
        .bind(plan.deleted_at)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row_to_plan(row))
    }

    async fn update(&self, plan: &Plan) -> AppResult<Plan> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE plans SET
                name = $2, description = $3, gateway_product_id = $4, gateway_price_id = $5,
                is_active = $6, features = $7, limits = $8, metadata = $9, sort_order = $10,
                updated_at = $11, deleted_at = $12
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(plan.id)
        .bind(&plan.name)
        .bind(&plan.description)
        .bind(&plan.gateway_product_id)
        .bind(&plan.gateway_price_id)
        .bind(plan.is_active)
        .bind(Json(&plan.features))
        .bind(Json(&plan.limits))
        .bind(&plan.metadata)
        .bind(plan.sort_order)
        .bind(plan.updated_at)
        .bind(plan.deleted_at)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?
        .ok_or(AppError::NotFound)?;
        Ok(row_to_plan(row))
    }
}
