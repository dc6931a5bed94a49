use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::{
        customer::{Billable, Customer},
        payment_method::{PaymentMethod, PaymentMethodType},
    },
    use_cases::subscription::SubscriptionRepo,
    validators::is_valid_email,
};

#[derive(Debug, Clone, Deserialize)]
pub struct AddPaymentMethodInput {
    #[serde(rename = "type")]
    pub method_type: PaymentMethodType,
    #[serde(default)]
    pub gateway_id: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub last_four: Option<String>,
    #[serde(default)]
    pub exp_month: Option<i32>,
    #[serde(default)]
    pub exp_year: Option<i32>,
    #[serde(default)]
    pub make_default: bool,
}

#[async_trait]
pub trait CustomerRepo: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Customer>>;
    async fn get_by_public_id(&self, public_id: Uuid) -> AppResult<Option<Customer>>;
    async fn get_by_billable(
        &self,
        billable: &Billable,
        workspace_id: Option<Uuid>,
    ) -> AppResult<Option<Customer>>;
    /// Inserts unless a customer already exists for the same billable and
    /// workspace; returns whichever row is stored.
    async fn insert_if_absent(&self, customer: &Customer) -> AppResult<Customer>;
}

#[async_trait]
pub trait PaymentMethodRepo: Send + Sync {
    async fn create(&self, method: &PaymentMethod) -> AppResult<PaymentMethod>;
    async fn get_by_public_id(&self, public_id: Uuid) -> AppResult<Option<PaymentMethod>>;
    async fn list_by_customer(&self, customer_id: Uuid) -> AppResult<Vec<PaymentMethod>>;
    /// Makes `method_id` the customer's only default in one atomic step.
    async fn set_default(&self, customer_id: Uuid, method_id: Uuid) -> AppResult<PaymentMethod>;
}

#[derive(Clone)]
pub struct CustomerUseCases {
    customer_repo: Arc<dyn CustomerRepo>,
    payment_method_repo: Arc<dyn PaymentMethodRepo>,
    subscription_repo: Arc<dyn SubscriptionRepo>,
}

impl CustomerUseCases {
    pub fn new(
        customer_repo: Arc<dyn CustomerRepo>,
        payment_method_repo: Arc<dyn PaymentMethodRepo>,
        subscription_repo: Arc<dyn SubscriptionRepo>,
    ) -> Self {
        Self {
            customer_repo,
            payment_method_repo,
            subscription_repo,
        }
    }

    pub async fn get_by_public_id(&self, public_id: Uuid) -> AppResult<Option<Customer>> {
        self.customer_repo.get_by_public_id(public_id).await
    }

    #[instrument(skip(self, email, name))]
    pub async fn get_or_create_customer(
        &self,
        billable: &Billable,
        workspace_id: Option<Uuid>,
        email: Option<String>,
        name: Option<String>,
    ) -> AppResult<Customer> {
        if billable.billable_type.trim().is_empty() || billable.billable_id.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Billable type and id are required".into(),
            ));
        }
        if email.as_deref().is_some_and(|e| !is_valid_email(e)) {
            return Err(AppError::ValidationError("Invalid email address".into()));
        }

        if let Some(existing) = self
            .customer_repo
            .get_by_billable(billable, workspace_id)
            .await?
        {
            return Ok(existing);
        }

        let customer = Customer::new(billable, workspace_id, email, name, Utc::now());
        let stored = self.customer_repo.insert_if_absent(&customer).await?;
        if stored.id == customer.id {
            tracing::info!(customer_id = %stored.id, "Customer created");
        }
        Ok(stored)
    }

    #[instrument(skip(self, input), fields(customer_id = %customer.id))]
    pub async fn add_payment_method(
        &self,
        customer: &Customer,
        input: AddPaymentMethodInput,
    ) -> AppResult<PaymentMethod> {
        if input.exp_month.is_some_and(|m| !(1..=12).contains(&m)) {
            return Err(AppError::ValidationError("Invalid expiry month".into()));
        }
        if input
            .last_four
            .as_deref()
            .is_some_and(|l| l.len() != 4 || !l.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(AppError::ValidationError(
                "last_four must be four digits".into(),
            ));
        }

        let existing = self
            .payment_method_repo
            .list_by_customer(customer.id)
            .await?;

        let mut method =
            PaymentMethod::new(customer.id, input.method_type, input.gateway_id, Utc::now());
        method.brand = input.brand;
        method.last_four = input.last_four;
        method.exp_month = input.exp_month;
        method.exp_year = input.exp_year;

        let created = self.payment_method_repo.create(&method).await?;
        if input.make_default || existing.is_empty() {
            return self
                .payment_method_repo
                .set_default(customer.id, created.id)
                .await;
        }
        Ok(created)
    }

    #[instrument(skip(self), fields(customer_id = %customer.id))]
    pub async fn set_default_payment_method(
        &self,
        customer: &Customer,
        method_public_id: Uuid,
    ) -> AppResult<PaymentMethod> {
        let method = self
            .payment_method_repo
            .get_by_public_id(method_public_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if method.customer_id != customer.id {
            return Err(AppError::Forbidden);
        }
        self.payment_method_repo
            .set_default(customer.id, method.id)
            .await
    }

    pub async fn list_payment_methods(&self, customer: &Customer) -> AppResult<Vec<PaymentMethod>> {
        self.payment_method_repo.list_by_customer(customer.id).await
    }

    pub async fn default_payment_method(
        &self,
        customer: &Customer,
    ) -> AppResult<Option<PaymentMethod>> {
        Ok(self
            .payment_method_repo
            .list_by_customer(customer.id)
            .await?
            .into_iter()
            .find(|m| m.is_default))
    }

    /// Active or trialing, ignoring subscriptions that have already ended.
    pub async fn has_active_subscription(&self, customer: &Customer) -> AppResult<bool> {
        let now = Utc::now();
        Ok(self
            .subscription_repo
            .list_by_customer(customer.id)
            .await?
            .iter()
            .any(|s| s.status.is_entitled() && !s.has_ended(now)))
    }
}
