//! Wires the billing use cases over in-memory repositories.
//!
//! `TestBillingBuilder` returns the use cases together with handles to the
//! backing mocks so tests can seed state and assert on side effects.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use secrecy::SecretString;
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    application::{
        ports::payment_gateway::PaymentGatewayPort,
        use_cases::{
            billing_ledger::LedgerUseCases,
            catalog::CatalogUseCases,
            customer::CustomerUseCases,
            subscription::SubscriptionUseCases,
            usage::UsageUseCases,
            webhook::{WebhookConfig, WebhookReconciler},
        },
    },
    domain::entities::{
        invoice::InvoiceNumbering,
        plan::{Plan, PlanDefaults},
    },
    infra::config::{
        AppConfig, BillingConfig, DEFAULT_GATEWAY_API_BASE, GatewayConfig, GatewayProvider,
    },
    test_utils::{
        InMemoryCustomerRepo, InMemoryInvoiceRepo, InMemoryPaymentMethodRepo, InMemoryPlanRepo,
        InMemoryProcessedEventRepo, InMemorySubscriptionRepo, InMemoryUsageRecordRepo,
        MockPaymentGateway, RecordingEventSink,
    },
};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

const TEST_CURRENCY: &str = "usd";

/// Use cases plus the mocks behind them.
pub struct TestBilling {
    pub plans: Arc<InMemoryPlanRepo>,
    pub customers: Arc<InMemoryCustomerRepo>,
    pub subscriptions: Arc<InMemorySubscriptionRepo>,
    pub invoices: Arc<InMemoryInvoiceRepo>,
    pub usage_records: Arc<InMemoryUsageRecordRepo>,
    pub processed_events: Arc<InMemoryProcessedEventRepo>,
    pub events: Arc<RecordingEventSink>,
    pub catalog: Arc<CatalogUseCases>,
    pub customer_use_cases: Arc<CustomerUseCases>,
    pub subscription_use_cases: Arc<SubscriptionUseCases>,
    pub ledger: Arc<LedgerUseCases>,
    pub usage: Arc<UsageUseCases>,
    pub reconciler: Arc<WebhookReconciler>,
}

impl TestBilling {
    /// `AppState` over the same use cases, for HTTP-level tests.
    pub fn app_state(&self) -> AppState {
        let config = Arc::new(AppConfig {
            bind_addr: "127.0.0.1:3002".parse::<SocketAddr>().unwrap(),
            database_url: String::new(),
            cors_origin: HeaderValue::from_static("http://localhost:3000"),
            billing: BillingConfig {
                currency: TEST_CURRENCY.to_string(),
                numbering: InvoiceNumbering::default(),
                plan_defaults: PlanDefaults::default(),
                gateway: GatewayConfig {
                    provider: GatewayProvider::None,
                    secret_key: None,
                    webhook_secret: Some(SecretString::from(TEST_WEBHOOK_SECRET)),
                    api_base: Url::parse(DEFAULT_GATEWAY_API_BASE).unwrap(),
                    timeout: Duration::from_secs(5),
                },
                webhook_tolerance_secs: 300,
                webhook_deduplicate: true,
            },
        });

        AppState {
            config,
            catalog: self.catalog.clone(),
            customers: self.customer_use_cases.clone(),
            subscriptions: self.subscription_use_cases.clone(),
            ledger: self.ledger.clone(),
            usage: self.usage.clone(),
            reconciler: self.reconciler.clone(),
        }
    }
}

pub struct TestBillingBuilder {
    plans: Vec<Plan>,
    gateway: Option<Arc<MockPaymentGateway>>,
    gateway_timeout: Duration,
    numbering: InvoiceNumbering,
    webhook_config: WebhookConfig,
}

impl TestBillingBuilder {
    pub fn new() -> Self {
        Self {
            plans: vec![],
            gateway: None,
            gateway_timeout: Duration::from_secs(5),
            numbering: InvoiceNumbering::default(),
            webhook_config: WebhookConfig {
                secret: Some(SecretString::from(TEST_WEBHOOK_SECRET)),
                ..WebhookConfig::default()
            },
        }
    }

    pub fn with_plans(mut self, plans: Vec<Plan>) -> Self {
        self.plans.extend(plans);
        self
    }

    pub fn with_gateway(mut self, gateway: Arc<MockPaymentGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn with_numbering(mut self, numbering: InvoiceNumbering) -> Self {
        self.numbering = numbering;
        self
    }

    pub fn with_webhook_config(mut self, config: WebhookConfig) -> Self {
        self.webhook_config = config;
        self
    }

    pub fn build(self) -> TestBilling {
        let plans = Arc::new(InMemoryPlanRepo::with_plans(self.plans));
        let customers = Arc::new(InMemoryCustomerRepo::new());
        let subscriptions = Arc::new(InMemorySubscriptionRepo::new());
        let invoices = Arc::new(InMemoryInvoiceRepo::new());
        let usage_records = Arc::new(InMemoryUsageRecordRepo::new());
        let processed_events = Arc::new(InMemoryProcessedEventRepo::new());
        let events = Arc::new(RecordingEventSink::new());

        let gateway = self
            .gateway
            .map(|gateway| gateway as Arc<dyn PaymentGatewayPort>);

        let catalog = Arc::new(CatalogUseCases::new(plans.clone(), PlanDefaults::default()));

        let customer_use_cases = Arc::new(CustomerUseCases::new(
            customers.clone(),
            Arc::new(InMemoryPaymentMethodRepo::new()),
            subscriptions.clone(),
        ));

        let subscription_use_cases = Arc::new(SubscriptionUseCases::new(
            subscriptions.clone(),
            subscriptions.items(),
            plans.clone(),
            gateway,
            events.clone(),
            self.gateway_timeout,
        ));

        let ledger = Arc::new(LedgerUseCases::new(
            invoices.clone(),
            invoices.clone(),
            events.clone(),
            self.numbering,
            TEST_CURRENCY.to_string(),
        ));

        let usage = Arc::new(UsageUseCases::new(
            usage_records.clone(),
            subscriptions.items(),
        ));

        let reconciler = Arc::new(WebhookReconciler::new(
            subscription_use_cases.clone(),
            ledger.clone(),
            processed_events.clone(),
            events.clone(),
            self.webhook_config,
        ));

        TestBilling {
            plans,
            customers,
            subscriptions,
            invoices,
            usage_records,
            processed_events,
            events,
            catalog,
            customer_use_cases,
            subscription_use_cases,
            ledger,
            usage,
            reconciler,
        }
    }
}

impl Default for TestBillingBuilder {
    fn default() -> Self {
        Self::new()
    }
}
