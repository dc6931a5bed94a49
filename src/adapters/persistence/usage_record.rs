use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::usage::UsageRecordRepo,
    domain::entities::usage_record::UsageRecord,
};

fn row_to_usage_record(row: sqlx::postgres::PgRow) -> UsageRecord {
    UsageRecord {
        id: row.get("id"),
        public_id: row.get("public_id"),
        subscription_item_id: row.get("subscription_item_id"),
        quantity: row.get("quantity"),
        action: row.get("action"),
        timestamp: row.get("usage_timestamp"),
        reported_to_gateway: row.get("reported_to_gateway"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, public_id, subscription_item_id, quantity, action, usage_timestamp,
    reported_to_gateway, metadata, created_at
"#;

#[async_trait]
impl UsageRecordRepo for PostgresPersistence {
    async fn create(&self, record: &UsageRecord) -> AppResult<UsageRecord> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO usage_records (
                id, public_id, subscription_item_id, quantity, action, usage_timestamp,
                reported_to_gateway, metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(record.id)
        .bind(record.public_id)
        .bind(record.subscription_item_id)
        .bind(record.quantity)
        .bind(record.action)
        .bind(record.timestamp)
        .bind(record.reported_to_gateway)
        .bind(&record.metadata)
        .bind(record.created_at)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row_to_usage_record(row))
    }

    async fn get_by_public_id(&self, public_id: Uuid) -> AppResult<Option<UsageRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM usage_records WHERE public_id = $1",
            SELECT_COLS
        ))
        .bind(public_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_usage_record))
    }

    async fn list_by_item(&self, subscription_item_id: Uuid) -> AppResult<Vec<UsageRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM usage_records WHERE subscription_item_id = $1 ORDER BY usage_timestamp, created_at",
            SELECT_COLS
        ))
        .bind(subscription_item_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_usage_record).collect())
    }

    async fn list_unreported(&self, subscription_item_id: Uuid) -> AppResult<Vec<UsageRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM usage_records
            WHERE subscription_item_id = $1 AND NOT reported_to_gateway
            ORDER BY usage_timestamp, created_at
            "#,
            SELECT_COLS
        ))
        .bind(subscription_item_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_usage_record).collect())
    }

    async fn mark_reported(&self, id: Uuid) -> AppResult<Option<UsageRecord>> {
        let row = sqlx::query(&format!(
            "UPDATE usage_records SET reported_to_gateway = true WHERE id = $1 RETURNING {}",
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_usage_record))
    }
}
