use std::sync::Arc;

use crate::{
    application::use_cases::{
        billing_ledger::LedgerUseCases, catalog::CatalogUseCases, customer::CustomerUseCases,
        subscription::SubscriptionUseCases, usage::UsageUseCases, webhook::WebhookReconciler,
    },
    infra::config::AppConfig,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub catalog: Arc<CatalogUseCases>,
    pub customers: Arc<CustomerUseCases>,
    pub subscriptions: Arc<SubscriptionUseCases>,
    pub ledger: Arc<LedgerUseCases>,
    pub usage: Arc<UsageUseCases>,
    pub reconciler: Arc<WebhookReconciler>,
}
