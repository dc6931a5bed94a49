//! In-memory mock implementations for billing repository traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::{
        billing_ledger::{
            InvoiceItemRepo, InvoiceRepo, ItemChange, frozen_invoice, totals_out_of_range,
        },
        catalog::PlanRepo,
        customer::{CustomerRepo, PaymentMethodRepo},
        subscription::{SubscriptionItemRepo, SubscriptionRepo},
        usage::UsageRecordRepo,
        webhook::ProcessedEventRepo,
    },
    domain::entities::{
        customer::{Billable, Customer},
        invoice::{Invoice, InvoiceItem, InvoiceNumbering, InvoiceStatus, InvoiceTotals},
        payment_method::PaymentMethod,
        plan::Plan,
        subscription::{Subscription, SubscriptionItem},
        usage_record::UsageRecord,
    },
};

/// Consumes one injected failure, if any are pending.
fn take_injected(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

// ============================================================================
// InMemoryPlanRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryPlanRepo {
    pub plans: Mutex<HashMap<Uuid, Plan>>,
}

impl InMemoryPlanRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plans(plans: Vec<Plan>) -> Self {
        Self {
            plans: Mutex::new(plans.into_iter().map(|p| (p.id, p)).collect()),
        }
    }
}

#[async_trait]
impl PlanRepo for InMemoryPlanRepo {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Plan>> {
        Ok(self.plans.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_public_id(&self, public_id: Uuid) -> AppResult<Option<Plan>> {
        Ok(self
            .plans
            .lock()
            .unwrap()
            .values()
            .find(|p| p.public_id == public_id)
            .cloned())
    }

    async fn get_by_slug(&self, slug: &str) -> AppResult<Option<Plan>> {
        Ok(self
            .plans
            .lock()
            .unwrap()
            .values()
            .find(|p| p.slug == slug)
            .cloned())
    }

    async fn list_active(&self) -> AppResult<Vec<Plan>> {
        let mut plans: Vec<Plan> = self
            .plans
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.is_available())
            .cloned()
            .collect();
        plans.sort_by(|a, b| (a.sort_order, &a.name).cmp(&(b.sort_order, &b.name)));
        Ok(plans)
    }

    async fn create(&self, plan: &Plan) -> AppResult<Plan> {
        self.plans.lock().unwrap().insert(plan.id, plan.clone());
        Ok(plan.clone())
    }

    async fn update(&self, plan: &Plan) -> AppResult<Plan> {
        let mut plans = self.plans.lock().unwrap();
        if !plans.contains_key(&plan.id) {
            return Err(AppError::NotFound);
        }
        plans.insert(plan.id, plan.clone());
        Ok(plan.clone())
    }
}

// ============================================================================
// InMemoryCustomerRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryCustomerRepo {
    pub customers: Mutex<HashMap<Uuid, Customer>>,
}

impl InMemoryCustomerRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, customer: Customer) {
        self.customers.lock().unwrap().insert(customer.id, customer);
    }
}

#[async_trait]
impl CustomerRepo for InMemoryCustomerRepo {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Customer>> {
        Ok(self.customers.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_public_id(&self, public_id: Uuid) -> AppResult<Option<Customer>> {
        Ok(self
            .customers
            .lock()
            .unwrap()
            .values()
            .find(|c| c.public_id == public_id)
            .cloned())
    }

    async fn get_by_billable(
        &self,
        billable: &Billable,
        workspace_id: Option<Uuid>,
    ) -> AppResult<Option<Customer>> {
        Ok(self
            .customers
            .lock()
            .unwrap()
            .values()
            .find(|c| c.is_owned_by(billable) && c.workspace_id == workspace_id)
            .cloned())
    }

    async fn insert_if_absent(&self, customer: &Customer) -> AppResult<Customer> {
        let mut customers = self.customers.lock().unwrap();
        let billable = customer.billable();
        if let Some(existing) = customers
            .values()
            .find(|c| c.is_owned_by(&billable) && c.workspace_id == customer.workspace_id)
        {
            return Ok(existing.clone());
        }
        customers.insert(customer.id, customer.clone());
        Ok(customer.clone())
    }
}

// ============================================================================
// InMemoryPaymentMethodRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryPaymentMethodRepo {
    pub methods: Mutex<HashMap<Uuid, PaymentMethod>>,
}

impl InMemoryPaymentMethodRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentMethodRepo for InMemoryPaymentMethodRepo {
    async fn create(&self, method: &PaymentMethod) -> AppResult<PaymentMethod> {
        self.methods.lock().unwrap().insert(method.id, method.clone());
        Ok(method.clone())
    }

    async fn get_by_public_id(&self, public_id: Uuid) -> AppResult<Option<PaymentMethod>> {
        Ok(self
            .methods
            .lock()
            .unwrap()
            .values()
            .find(|m| m.public_id == public_id)
            .cloned())
    }

    async fn list_by_customer(&self, customer_id: Uuid) -> AppResult<Vec<PaymentMethod>> {
        let mut methods: Vec<PaymentMethod> = self
            .methods
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.customer_id == customer_id)
            .cloned()
            .collect();
        methods.sort_by_key(|m| m.created_at);
        Ok(methods)
    }

    async fn set_default(&self, customer_id: Uuid, method_id: Uuid) -> AppResult<PaymentMethod> {
        let mut methods = self.methods.lock().unwrap();
        if !methods
            .get(&method_id)
            .is_some_and(|m| m.customer_id == customer_id)
        {
            return Err(AppError::NotFound);
        }
        for method in methods.values_mut().filter(|m| m.customer_id == customer_id) {
            method.is_default = method.id == method_id;
        }
        methods.get(&method_id).cloned().ok_or(AppError::NotFound)
    }
}

// ============================================================================
// InMemorySubscriptionItemRepo
// ============================================================================

#[derive(Default)]
pub struct InMemorySubscriptionItemRepo {
    pub items: Mutex<HashMap<Uuid, SubscriptionItem>>,
}

impl InMemorySubscriptionItemRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<SubscriptionItem>) -> Self {
        Self {
            items: Mutex::new(items.into_iter().map(|i| (i.id, i)).collect()),
        }
    }
}

#[async_trait]
impl SubscriptionItemRepo for InMemorySubscriptionItemRepo {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<SubscriptionItem>> {
        Ok(self.items.lock().unwrap().get(&id).cloned())
    }

    async fn list_by_subscription(&self, subscription_id: Uuid) -> AppResult<Vec<SubscriptionItem>> {
        let mut items: Vec<SubscriptionItem> = self
            .items
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.subscription_id == subscription_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.created_at);
        Ok(items)
    }

    async fn create(&self, item: &SubscriptionItem) -> AppResult<SubscriptionItem> {
        self.items.lock().unwrap().insert(item.id, item.clone());
        Ok(item.clone())
    }
}

// ============================================================================
// InMemorySubscriptionRepo
// ============================================================================

/// Subscriptions plus their items. `inject_conflicts(n)` makes the next `n`
/// updates fail with `ConcurrencyConflict`.
#[derive(Default)]
pub struct InMemorySubscriptionRepo {
    pub subscriptions: Mutex<HashMap<Uuid, Subscription>>,
    items: Arc<InMemorySubscriptionItemRepo>,
    pending_conflicts: AtomicUsize,
}

impl InMemorySubscriptionRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscriptions(subscriptions: Vec<Subscription>) -> Self {
        let repo = Self::default();
        for subscription in subscriptions {
            repo.insert(subscription);
        }
        repo
    }

    /// Item store written by `create_with_item`.
    pub fn items(&self) -> Arc<InMemorySubscriptionItemRepo> {
        self.items.clone()
    }

    pub fn insert(&self, subscription: Subscription) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id, subscription);
    }

    pub fn get(&self, id: Uuid) -> Option<Subscription> {
        self.subscriptions.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    /// Edits a stored row directly and bumps its version, like a concurrent writer.
    pub fn update_in_place(&self, id: Uuid, edit: impl FnOnce(&mut Subscription)) {
        if let Some(subscription) = self.subscriptions.lock().unwrap().get_mut(&id) {
            edit(subscription);
            subscription.version += 1;
        }
    }

    pub fn inject_conflicts(&self, count: usize) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl SubscriptionRepo for InMemorySubscriptionRepo {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>> {
        Ok(self.get(id))
    }

    async fn get_by_public_id(&self, public_id: Uuid) -> AppResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .find(|s| s.public_id == public_id)
            .cloned())
    }

    async fn get_by_gateway_id(&self, gateway_id: &str) -> AppResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .find(|s| s.gateway_id.as_deref() == Some(gateway_id))
            .cloned())
    }

    async fn list_by_customer(&self, customer_id: Uuid) -> AppResult<Vec<Subscription>> {
        let mut subscriptions: Vec<Subscription> = self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.customer_id == customer_id)
            .cloned()
            .collect();
        subscriptions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(subscriptions)
    }

    async fn create_with_item(
        &self,
        subscription: &Subscription,
        item: &SubscriptionItem,
    ) -> AppResult<Subscription> {
        self.insert(subscription.clone());
        self.items.create(item).await?;
        Ok(subscription.clone())
    }

    async fn update(&self, subscription: &Subscription) -> AppResult<Subscription> {
        if take_injected(&self.pending_conflicts) {
            return Err(AppError::ConcurrencyConflict);
        }
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let stored = subscriptions
            .get_mut(&subscription.id)
            .ok_or(AppError::NotFound)?;
        if stored.version != subscription.version {
            return Err(AppError::ConcurrencyConflict);
        }
        *stored = subscription.clone();
        stored.version += 1;
        Ok(stored.clone())
    }
}

// ============================================================================
// InMemoryInvoiceRepo (invoices and their items)
// ============================================================================

#[derive(Default)]
pub struct InMemoryInvoiceRepo {
    pub invoices: Mutex<HashMap<Uuid, Invoice>>,
    pub items: Mutex<HashMap<Uuid, InvoiceItem>>,
    pending_numbering_conflicts: AtomicUsize,
}

impl InMemoryInvoiceRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<Invoice> {
        self.invoices.lock().unwrap().get(&id).cloned()
    }

    pub fn inject_numbering_conflicts(&self, count: usize) {
        self.pending_numbering_conflicts
            .store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl InvoiceRepo for InMemoryInvoiceRepo {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Invoice>> {
        Ok(self.get(id))
    }

    async fn get_by_public_id(&self, public_id: Uuid) -> AppResult<Option<Invoice>> {
        Ok(self
            .invoices
            .lock()
            .unwrap()
            .values()
            .find(|i| i.public_id == public_id)
            .cloned())
    }

    async fn get_by_gateway_id(&self, gateway_id: &str) -> AppResult<Option<Invoice>> {
        Ok(self
            .invoices
            .lock()
            .unwrap()
            .values()
            .find(|i| i.gateway_id.as_deref() == Some(gateway_id))
            .cloned())
    }

    async fn list_by_customer(&self, customer_id: Uuid) -> AppResult<Vec<Invoice>> {
        let mut invoices: Vec<Invoice> = self
            .invoices
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.customer_id == customer_id)
            .cloned()
            .collect();
        invoices.sort_by(|a, b| b.sequence_number.cmp(&a.sequence_number));
        Ok(invoices)
    }

    async fn create_numbered(
        &self,
        invoice: &Invoice,
        numbering: &InvoiceNumbering,
    ) -> AppResult<Invoice> {
        if take_injected(&self.pending_numbering_conflicts) {
            return Err(AppError::ConcurrencyConflict);
        }
        // One lock across read-max and insert.
        let mut invoices = self.invoices.lock().unwrap();
        let last = invoices.values().map(|i| i.sequence_number).max();
        let mut numbered = invoice.clone();
        let sequence = numbering
            .next_sequence(last)
            .ok_or_else(|| AppError::Internal("Invoice number sequence exhausted".into()))?;
        numbered.assign_number(numbering, sequence);
        invoices.insert(numbered.id, numbered.clone());
        Ok(numbered)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: &[InvoiceStatus],
        to: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Invoice>> {
        let mut invoices = self.invoices.lock().unwrap();
        let invoice = invoices.get_mut(&id).ok_or(AppError::NotFound)?;
        Ok(invoice.transition(from, to, at).then(|| invoice.clone()))
    }

    async fn apply_item_change(&self, invoice_id: Uuid, change: &ItemChange) -> AppResult<Invoice> {
        // Both maps stay locked for the whole change, like the row lock.
        let mut invoices = self.invoices.lock().unwrap();
        let mut items = self.items.lock().unwrap();
        let invoice = invoices.get_mut(&invoice_id).ok_or(AppError::NotFound)?;
        if !invoice.status.accepts_item_changes() {
            return Err(frozen_invoice(invoice));
        }

        let mut staged = items.clone();
        let mut tax_cents = invoice.tax_cents;
        match change {
            ItemChange::Add(item) => {
                staged.insert(item.id, item.clone());
            }
            ItemChange::Update(item) => {
                match staged.get_mut(&item.id) {
                    Some(stored) if stored.invoice_id == invoice_id => *stored = item.clone(),
                    _ => return Err(AppError::NotFound),
                }
            }
            ItemChange::Remove(item_id) => {
                if staged.get(item_id).is_none_or(|i| i.invoice_id != invoice_id) {
                    return Err(AppError::NotFound);
                }
                staged.remove(item_id);
            }
            ItemChange::SetTax(tax) => tax_cents = *tax,
        }

        let amounts = staged
            .values()
            .filter(|i| i.invoice_id == invoice_id)
            .map(|i| i.amount_cents);
        let totals =
            InvoiceTotals::from_amounts(amounts, tax_cents).ok_or_else(totals_out_of_range)?;

        *items = staged;
        invoice.apply_totals(totals);
        invoice.updated_at = Utc::now();
        Ok(invoice.clone())
    }

    async fn recalculate_totals(&self, id: Uuid) -> AppResult<Invoice> {
        let amounts: Vec<i64> = self
            .items
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.invoice_id == id)
            .map(|i| i.amount_cents)
            .collect();
        let mut invoices = self.invoices.lock().unwrap();
        let invoice = invoices.get_mut(&id).ok_or(AppError::NotFound)?;
        let totals = InvoiceTotals::from_amounts(amounts, invoice.tax_cents)
            .ok_or_else(totals_out_of_range)?;
        invoice.apply_totals(totals);
        invoice.updated_at = Utc::now();
        Ok(invoice.clone())
    }
}

#[async_trait]
impl InvoiceItemRepo for InMemoryInvoiceRepo {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<InvoiceItem>> {
        Ok(self.items.lock().unwrap().get(&id).cloned())
    }

    async fn list_by_invoice(&self, invoice_id: Uuid) -> AppResult<Vec<InvoiceItem>> {
        let mut items: Vec<InvoiceItem> = self
            .items
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.invoice_id == invoice_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.created_at);
        Ok(items)
    }
}

// ============================================================================
// InMemoryUsageRecordRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryUsageRecordRepo {
    pub records: Mutex<HashMap<Uuid, UsageRecord>>,
}

impl InMemoryUsageRecordRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageRecordRepo for InMemoryUsageRecordRepo {
    async fn create(&self, record: &UsageRecord) -> AppResult<UsageRecord> {
        self.records.lock().unwrap().insert(record.id, record.clone());
        Ok(record.clone())
    }

    async fn get_by_public_id(&self, public_id: Uuid) -> AppResult<Option<UsageRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|r| r.public_id == public_id)
            .cloned())
    }

    async fn list_by_item(&self, subscription_item_id: Uuid) -> AppResult<Vec<UsageRecord>> {
        let mut records: Vec<UsageRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.subscription_item_id == subscription_item_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.timestamp, r.created_at));
        Ok(records)
    }

    async fn list_unreported(&self, subscription_item_id: Uuid) -> AppResult<Vec<UsageRecord>> {
        let mut records: Vec<UsageRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.subscription_item_id == subscription_item_id && !r.reported_to_gateway)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.timestamp, r.created_at));
        Ok(records)
    }

    async fn mark_reported(&self, id: Uuid) -> AppResult<Option<UsageRecord>> {
        let mut records = self.records.lock().unwrap();
        Ok(records.get_mut(&id).map(|record| {
            record.reported_to_gateway = true;
            record.clone()
        }))
    }
}

// ============================================================================
// InMemoryProcessedEventRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryProcessedEventRepo {
    /// event id -> (event type, outcome)
    pub events: Mutex<HashMap<String, (String, Option<String>)>>,
}

impl InMemoryProcessedEventRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn outcome(&self, event_id: &str) -> Option<String> {
        self.events
            .lock()
            .unwrap()
            .get(event_id)
            .and_then(|(_, outcome)| outcome.clone())
    }
}

#[async_trait]
impl ProcessedEventRepo for InMemoryProcessedEventRepo {
    async fn claim(
        &self,
        event_id: &str,
        event_type: &str,
        _received_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut events = self.events.lock().unwrap();
        if events.contains_key(event_id) {
            return Ok(false);
        }
        events.insert(event_id.to_string(), (event_type.to_string(), None));
        Ok(true)
    }

    async fn record_outcome(&self, event_id: &str, outcome: &str) -> AppResult<()> {
        if let Some(entry) = self.events.lock().unwrap().get_mut(event_id) {
            entry.1 = Some(outcome.to_string());
        }
        Ok(())
    }
}
