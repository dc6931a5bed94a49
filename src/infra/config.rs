use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use axum::http::HeaderValue;
use env_helpers::{get_env, get_env_default};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::domain::entities::{
    invoice::InvoiceNumbering,
    plan::{EffectiveTiming, PlanDefaults},
};

pub const DEFAULT_GATEWAY_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayProvider {
    /// No remote gateway; subscriptions stay local-only.
    None,
    Stripe,
    /// Accepts every call and fabricates remote ids. For development.
    Dummy,
}

impl FromStr for GatewayProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(GatewayProvider::None),
            "stripe" => Ok(GatewayProvider::Stripe),
            "dummy" => Ok(GatewayProvider::Dummy),
            _ => Err(format!("Unknown gateway provider: {}", s)),
        }
    }
}

pub struct GatewayConfig {
    pub provider: GatewayProvider,
    pub secret_key: Option<SecretString>,
    pub webhook_secret: Option<SecretString>,
    pub api_base: Url,
    pub timeout: Duration,
}

/// Everything the billing use cases need, passed in explicitly.
pub struct BillingConfig {
    pub currency: String,
    pub numbering: InvoiceNumbering,
    pub plan_defaults: PlanDefaults,
    pub gateway: GatewayConfig,
    pub webhook_tolerance_secs: i64,
    pub webhook_deduplicate: bool,
}

pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub cors_origin: HeaderValue,
    pub billing: BillingConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr: SocketAddr =
            get_env_default("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3002)));
        let database_url: String = get_env("DATABASE_URL");
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .context("CORS_ORIGIN must be a valid header value")?;

        Ok(Self {
            bind_addr,
            database_url,
            cors_origin,
            billing: BillingConfig::from_env()?,
        })
    }
}

impl BillingConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let currency = get_env_default("BILLING_CURRENCY", String::from("usd")).to_lowercase();
        let numbering = InvoiceNumbering {
            prefix: get_env_default("BILLING_INVOICE_PREFIX", String::from("INV-")),
            starting_number: get_env_default("BILLING_INVOICE_STARTING_NUMBER", 1000i64),
        };

        let fallback = PlanDefaults::default();
        let plan_defaults = PlanDefaults {
            trial_period_days: get_env_default(
                "BILLING_PLAN_DEFAULT_TRIAL_DAYS",
                fallback.trial_period_days,
            ),
            grace_period_days: get_env_default(
                "BILLING_PLAN_DEFAULT_GRACE_DAYS",
                fallback.grace_period_days,
            ),
            cancellation_behavior: timing_env(
                "BILLING_PLAN_DEFAULT_CANCELLATION_BEHAVIOR",
                fallback.cancellation_behavior,
            )?,
            change_behavior: timing_env(
                "BILLING_PLAN_DEFAULT_CHANGE_BEHAVIOR",
                fallback.change_behavior,
            )?,
            prorate_changes: get_env_default(
                "BILLING_PLAN_DEFAULT_PRORATE_CHANGES",
                fallback.prorate_changes,
            ),
            prorate_cancellations: get_env_default(
                "BILLING_PLAN_DEFAULT_PRORATE_CANCELLATIONS",
                fallback.prorate_cancellations,
            ),
        };

        let secret_key = optional_secret("BILLING_GATEWAY_SECRET_KEY");
        let webhook_secret = optional_secret("BILLING_GATEWAY_WEBHOOK_SECRET");
        let default_provider = if secret_key.is_some() { "stripe" } else { "none" };
        let provider: GatewayProvider =
            get_env_default("BILLING_GATEWAY_PROVIDER", default_provider.to_string())
                .parse()
                .map_err(anyhow::Error::msg)?;
        let api_base: Url = get_env_default(
            "BILLING_GATEWAY_API_BASE",
            String::from(DEFAULT_GATEWAY_API_BASE),
        )
        .parse()
        .context("BILLING_GATEWAY_API_BASE must be a valid URL")?;
        let timeout = Duration::from_secs(get_env_default("BILLING_GATEWAY_TIMEOUT_SECS", 10u64));

        let config = Self {
            currency,
            numbering,
            plan_defaults,
            gateway: GatewayConfig {
                provider,
                secret_key,
                webhook_secret,
                api_base,
                timeout,
            },
            webhook_tolerance_secs: get_env_default("BILLING_WEBHOOK_TOLERANCE_SECS", 300i64),
            webhook_deduplicate: get_env_default("BILLING_WEBHOOK_DEDUPLICATE", true),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(key) = &self.gateway.secret_key {
            if !key.expose_secret().starts_with("sk_") {
                bail!("BILLING_GATEWAY_SECRET_KEY must start with sk_");
            }
        }
        if let Some(secret) = &self.gateway.webhook_secret {
            if !secret.expose_secret().starts_with("whsec_") {
                bail!("BILLING_GATEWAY_WEBHOOK_SECRET must start with whsec_");
            }
        }
        if self.gateway.provider == GatewayProvider::Stripe && self.gateway.secret_key.is_none() {
            bail!("BILLING_GATEWAY_SECRET_KEY is required for the stripe provider");
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_lowercase()) {
            bail!("BILLING_CURRENCY must be a three-letter code");
        }
        if self.numbering.starting_number < 0 {
            bail!("BILLING_INVOICE_STARTING_NUMBER cannot be negative");
        }
        Ok(())
    }
}

fn optional_secret(key: &str) -> Option<SecretString> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.is_empty())
        .map(SecretString::from)
}

fn timing_env(key: &'static str, default: EffectiveTiming) -> anyhow::Result<EffectiveTiming> {
    get_env_default(key, default.as_str().to_string())
        .parse()
        .map_err(|e: String| anyhow::anyhow!("{}: {}", key, e))
}
