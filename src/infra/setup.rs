use crate::{
    adapters::{
        http::app_state::AppState,
        persistence::PostgresPersistence,
    },
    application::{
        ports::{billing_events::BillingEventSink, payment_gateway::PaymentGatewayPort},
        use_cases::{
            billing_ledger::{InvoiceItemRepo, InvoiceRepo, LedgerUseCases},
            catalog::{CatalogUseCases, PlanRepo},
            customer::{CustomerRepo, CustomerUseCases, PaymentMethodRepo},
            subscription::{SubscriptionItemRepo, SubscriptionRepo, SubscriptionUseCases},
            usage::{UsageRecordRepo, UsageUseCases},
            webhook::{ProcessedEventRepo, WebhookConfig, WebhookReconciler},
        },
    },
    infra::{
        config::{AppConfig, GatewayConfig, GatewayProvider},
        dummy_gateway_client::DummyGatewayClient,
        event_sink::TracingEventSink,
        postgres_persistence,
        stripe_client::StripeGatewayClient,
    },
};
use std::fs::File;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env()?;
    let billing = &config.billing;

    let postgres_arc: Arc<PostgresPersistence> =
        Arc::new(postgres_persistence(&config.database_url).await?);

    let plan_repo = postgres_arc.clone() as Arc<dyn PlanRepo>;
    let subscription_repo = postgres_arc.clone() as Arc<dyn SubscriptionRepo>;
    let subscription_item_repo = postgres_arc.clone() as Arc<dyn SubscriptionItemRepo>;
    let invoice_repo = postgres_arc.clone() as Arc<dyn InvoiceRepo>;
    let events: Arc<dyn BillingEventSink> = Arc::new(TracingEventSink);

    let gateway = build_gateway(&billing.gateway)?;

    let catalog = CatalogUseCases::new(plan_repo.clone(), billing.plan_defaults.clone());

    let customers = CustomerUseCases::new(
        postgres_arc.clone() as Arc<dyn CustomerRepo>,
        postgres_arc.clone() as Arc<dyn PaymentMethodRepo>,
        subscription_repo.clone(),
    );

    let subscriptions = Arc::new(SubscriptionUseCases::new(
        subscription_repo,
        subscription_item_repo.clone(),
        plan_repo,
        gateway,
        events.clone(),
        billing.gateway.timeout,
    ));

    let ledger = Arc::new(LedgerUseCases::new(
        invoice_repo,
        postgres_arc.clone() as Arc<dyn InvoiceItemRepo>,
        events.clone(),
        billing.numbering.clone(),
        billing.currency.clone(),
    ));

    let usage = UsageUseCases::new(
        postgres_arc.clone() as Arc<dyn UsageRecordRepo>,
        subscription_item_repo,
    );

    let reconciler = WebhookReconciler::new(
        subscriptions.clone(),
        ledger.clone(),
        postgres_arc.clone() as Arc<dyn ProcessedEventRepo>,
        events,
        WebhookConfig {
            secret: billing.gateway.webhook_secret.clone(),
            tolerance_secs: billing.webhook_tolerance_secs,
            deduplicate: billing.webhook_deduplicate,
        },
    );

    Ok(AppState {
        config: Arc::new(config),
        catalog: Arc::new(catalog),
        customers: Arc::new(customers),
        subscriptions,
        ledger,
        usage: Arc::new(usage),
        reconciler: Arc::new(reconciler),
    })
}

fn build_gateway(config: &GatewayConfig) -> anyhow::Result<Option<Arc<dyn PaymentGatewayPort>>> {
    let gateway: Option<Arc<dyn PaymentGatewayPort>> = match config.provider {
        GatewayProvider::None => None,
        GatewayProvider::Dummy => Some(Arc::new(DummyGatewayClient::new())),
        GatewayProvider::Stripe => {
            let secret_key = config.secret_key.clone().ok_or_else(|| {
                anyhow::anyhow!("BILLING_GATEWAY_SECRET_KEY is required for the stripe provider")
            })?;
            Some(Arc::new(StripeGatewayClient::new(
                secret_key,
                &config.api_base,
                config.timeout,
            )?))
        }
    };

    match &gateway {
        Some(gateway) => tracing::info!(provider = gateway.name(), "Payment gateway enabled"),
        None => tracing::warn!("No payment gateway configured; subscriptions stay local-only"),
    }
    Ok(gateway)
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "billing_engine=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer().with_target(false).with_level(true).pretty();

    // File (structured JSON logs), skipped when the file cannot be created
    let json_layer = File::create("billing.log").ok().map(|file| {
        fmt::layer()
            .json()
            .with_writer(file)
            .with_current_span(true)
            .with_span_list(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
