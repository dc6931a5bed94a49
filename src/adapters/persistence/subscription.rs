use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::subscription::{SubscriptionItemRepo, SubscriptionRepo},
    domain::entities::subscription::{Subscription, SubscriptionItem},
};

// ============================================================================
// Subscriptions
// ============================================================================

fn row_to_subscription(row: sqlx::postgres::PgRow) -> Subscription {
    Subscription {
        id: row.get("id"),
        public_id: row.get("public_id"),
        customer_id: row.get("customer_id"),
        workspace_id: row.get("workspace_id"),
        gateway_id: row.get("gateway_id"),
        gateway_status: row.get("gateway_status"),
        gateway_synced_at: row.get("gateway_synced_at"),
        status: row.get("status"),
        trial_ends_at: row.get("trial_ends_at"),
        current_period_start: row.get("current_period_start"),
        current_period_end: row.get("current_period_end"),
        canceled_at: row.get("canceled_at"),
        ends_at: row.get("ends_at"),
        failed_payment_count: row.get("failed_payment_count"),
        last_failed_payment_at: row.get("last_failed_payment_at"),
        metadata: row.get("metadata"),
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SUBSCRIPTION_COLS: &str = r#"
    id, public_id, customer_id, workspace_id, gateway_id, gateway_status, gateway_synced_at,
    status, trial_ends_at, current_period_start, current_period_end, canceled_at, ends_at,
    failed_payment_count, last_failed_payment_at, metadata, version, created_at, updated_at
"#;

#[async_trait]
impl SubscriptionRepo for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE id = $1",
            SUBSCRIPTION_COLS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_subscription))
    }

    async fn get_by_public_id(&self, public_id: Uuid) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE public_id = $1",
            SUBSCRIPTION_COLS
        ))
        .bind(public_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_subscription))
    }

    async fn get_by_gateway_id(&self, gateway_id: &str) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE gateway_id = $1",
            SUBSCRIPTION_COLS
        ))
        .bind(gateway_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_subscription))
    }

    async fn list_by_customer(&self, customer_id: Uuid) -> AppResult<Vec<Subscription>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE customer_id = $1 ORDER BY created_at DESC",
            SUBSCRIPTION_COLS
        ))
        .bind(customer_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_subscription).collect())
    }

    async fn create_with_item(
        &self,
        subscription: &Subscription,
        item: &SubscriptionItem,
    ) -> AppResult<Subscription> {
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO subscriptions (
                id, public_id, customer_id, workspace_id, gateway_id, gateway_status,
                gateway_synced_at, status, trial_ends_at, current_period_start,
                current_period_end, canceled_at, ends_at, failed_payment_count,
                last_failed_payment_at, metadata, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19)
            RETURNING {}
            "#,
            SUBSCRIPTION_COLS
        ))
        .bind(subscription.id)
        .bind(subscription.public_id)
        .bind(subscription.customer_id)
        .bind(subscription.workspace_id)
        .bind(&subscription.gateway_id)
        .bind(&subscription.gateway_status)
        .bind(subscription.gateway_synced_at)
        .bind(subscription.status)
        .bind(subscription.trial_ends_at)
        .bind(subscription.current_period_start)
        .bind(subscription.current_period_end)
        .bind(subscription.canceled_at)
        .bind(subscription.ends_at)
        .bind(subscription.failed_payment_count)
        .bind(subscription.last_failed_payment_at)
        .bind(&subscription.metadata)
        .bind(subscription.version)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::from)?;

        insert_item(&mut *tx, item).await?;

        tx.commit().await.map_err(AppError::from)?;
        Ok(row_to_subscription(row))
    }

    async fn update(&self, subscription: &Subscription) -> AppResult<Subscription> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE subscriptions SET
                gateway_id = $3, gateway_status = $4, gateway_synced_at = $5, status = $6,
                trial_ends_at = $7, current_period_start = $8, current_period_end = $9,
                canceled_at = $10, ends_at = $11, failed_payment_count = $12,
                last_failed_payment_at = $13, metadata = $14, updated_at = $15,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            SUBSCRIPTION_COLS
        ))
        .bind(subscription.id)
        .bind(subscription.version)
        .bind(&subscription.gateway_id)
        .bind(&subscription.gateway_status)
        .bind(subscription.gateway_synced_at)
        .bind(subscription.status)
        .bind(subscription.trial_ends_at)
        .bind(subscription.current_period_start)
        .bind(subscription.current_period_end)
        .bind(subscription.canceled_at)
        .bind(subscription.ends_at)
        .bind(subscription.failed_payment_count)
        .bind(subscription.last_failed_payment_at)
        .bind(&subscription.metadata)
        .bind(subscription.updated_at)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        match row {
            Some(row) => Ok(row_to_subscription(row)),
            None => {
                // Distinguish a stale version from a missing row.
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM subscriptions WHERE id = $1)")
                        .bind(subscription.id)
                        .fetch_one(self.pool())
                        .await
                        .map_err(AppError::from)?;
                if exists {
                    Err(AppError::ConcurrencyConflict)
                } else {
                    Err(AppError::NotFound)
                }
            }
        }
    }
}

// ============================================================================
// Subscription items
// ============================================================================

fn row_to_item(row: sqlx::postgres::PgRow) -> SubscriptionItem {
    SubscriptionItem {
        id: row.get("id"),
        public_id: row.get("public_id"),
        subscription_id: row.get("subscription_id"),
        plan_id: row.get("plan_id"),
        gateway_id: row.get("gateway_id"),
        quantity: row.get("quantity"),
        trial_ends_at: row.get("trial_ends_at"),
        ends_at: row.get("ends_at"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const ITEM_COLS: &str = r#"
    id, public_id, subscription_id, plan_id, gateway_id, quantity,
    trial_ends_at, ends_at, metadata, created_at, updated_at
"#;

async fn insert_item<'e, E>(executor: E, item: &SubscriptionItem) -> AppResult<SubscriptionItem>
where
    E: sqlx::PgExecutor<'e>,
{
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO subscription_items (
            id, public_id, subscription_id, plan_id, gateway_id, quantity,
            trial_ends_at, ends_at, metadata, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {}
        "#,
        ITEM_COLS
    ))
    .bind(item.id)
    .bind(item.public_id)
    .bind(item.subscription_id)
    .bind(item.plan_id)
    .bind(&item.gateway_id)
    .bind(item.quantity)
    .bind(item.trial_ends_at)
    .bind(item.ends_at)
    .bind(&item.metadata)
    .bind(item.created_at)
    .bind(item.updated_at)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)?;
    Ok(row_to_item(row))
}

#[async_trait]
impl SubscriptionItemRepo for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<SubscriptionItem>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscription_items WHERE id = $1",
            ITEM_COLS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_item))
    }

    async fn list_by_subscription(&self, subscription_id: Uuid) -> AppResult<Vec<SubscriptionItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscription_items WHERE subscription_id = $1 ORDER BY created_at",
            ITEM_COLS
        ))
        .bind(subscription_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_item).collect())
    }

    async fn create(&self, item: &SubscriptionItem) -> AppResult<SubscriptionItem> {
        insert_item(self.pool(), item).await
    }
}
