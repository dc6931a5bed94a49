use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::usage_record::{UsageAction, UsageRecord, current_usage},
    use_cases::subscription::SubscriptionItemRepo,
};

#[async_trait]
pub trait UsageRecordRepo: Send + Sync {
    async fn create(&self, record: &UsageRecord) -> AppResult<UsageRecord>;
    async fn get_by_public_id(&self, public_id: Uuid) -> AppResult<Option<UsageRecord>>;
    /// Ordered by `timestamp`.
    async fn list_by_item(&self, subscription_item_id: Uuid) -> AppResult<Vec<UsageRecord>>;
    /// The item's records never reported to the gateway, oldest first.
    async fn list_unreported(&self, subscription_item_id: Uuid) -> AppResult<Vec<UsageRecord>>;
    /// Sets the reported flag; `None` when no such record exists.
    async fn mark_reported(&self, id: Uuid) -> AppResult<Option<UsageRecord>>;
}

#[derive(Clone)]
pub struct UsageUseCases {
    usage_repo: Arc<dyn UsageRecordRepo>,
    item_repo: Arc<dyn SubscriptionItemRepo>,
}

impl UsageUseCases {
    pub fn new(usage_repo: Arc<dyn UsageRecordRepo>, item_repo: Arc<dyn SubscriptionItemRepo>) -> Self {
        Self {
            usage_repo,
            item_repo,
        }
    }

    #[instrument(skip(self))]
    pub async fn record(
        &self,
        subscription_item_id: Uuid,
        quantity: i64,
        action: UsageAction,
        timestamp: Option<DateTime<Utc>>,
    ) -> AppResult<UsageRecord> {
        if quantity < 0 {
            return Err(AppError::ValidationError(
                "Usage quantity cannot be negative".into(),
            ));
        }
        let now = Utc::now();
        let item = self
            .item_repo
            .get_by_id(subscription_item_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if item.has_ended(now) {
            return Err(AppError::ValidationError(
                "Subscription item has ended".into(),
            ));
        }

        let record = UsageRecord::new(item.id, quantity, action, timestamp.unwrap_or(now), now);
        self.usage_repo.create(&record).await
    }

    /// One-way and idempotent.
    #[instrument(skip(self))]
    pub async fn mark_as_reported(&self, record_id: Uuid) -> AppResult<UsageRecord> {
        self.usage_repo
            .mark_reported(record_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn list_unreported(&self, subscription_item_id: Uuid) -> AppResult<Vec<UsageRecord>> {
        self.usage_repo.list_unreported(subscription_item_id).await
    }

    pub async fn current_usage(&self, subscription_item_id: Uuid) -> AppResult<i64> {
        let records = self.usage_repo.list_by_item(subscription_item_id).await?;
        Ok(current_usage(&records))
    }
}
