use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_events::{BillingEvent, BillingEventSink},
    domain::entities::{
        customer::Customer,
        invoice::{Invoice, InvoiceItem, InvoiceNumbering, InvoiceStatus},
    },
    validators::is_valid_currency,
};

/// The numbering lock makes conflicts impossible in practice; a unique-index
/// violation still gets a bounded number of fresh attempts.
const MAX_NUMBERING_ATTEMPTS: usize = 3;

const PAYABLE: &[InvoiceStatus] = &[
    InvoiceStatus::Draft,
    InvoiceStatus::Open,
    InvoiceStatus::Uncollectible,
];

// ============================================================================
// Inputs / Outputs
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct CreateInvoiceInput {
    pub customer_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub currency: Option<String>,
    /// Draft or open; defaults to draft.
    pub status: Option<InvoiceStatus>,
    pub tax_cents: i64,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub gateway_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AddInvoiceItemInput {
    pub description: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    /// Defaults to `quantity * unit_price_cents`.
    pub amount_cents: Option<i64>,
    pub subscription_id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub is_proration: bool,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateInvoiceItemInput {
    pub description: Option<String>,
    pub quantity: Option<i32>,
    pub unit_price_cents: Option<i64>,
    /// Explicit override; otherwise recomputed when quantity or price change.
    pub amount_cents: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDetails {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
}

/// A line-item mutation, applied together with the totals recomputation
/// while the invoice row is locked.
#[derive(Debug, Clone)]
pub enum ItemChange {
    Add(InvoiceItem),
    Update(InvoiceItem),
    Remove(Uuid),
    SetTax(i64),
}

#[derive(Debug, Clone)]
pub struct InvoiceTransition {
    pub invoice: Invoice,
    /// False when the invoice was already in the target status.
    pub changed: bool,
}

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait InvoiceRepo: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Invoice>>;
    async fn get_by_public_id(&self, public_id: Uuid) -> AppResult<Option<Invoice>>;
    async fn get_by_gateway_id(&self, gateway_id: &str) -> AppResult<Option<Invoice>>;
    /// Newest first.
    async fn list_by_customer(&self, customer_id: Uuid) -> AppResult<Vec<Invoice>>;
    /// Inside one exclusive critical section: read the highest allocated
    /// sequence, assign `numbering.next_sequence(last)`, insert, commit.
    async fn create_numbered(
        &self,
        invoice: &Invoice,
        numbering: &InvoiceNumbering,
    ) -> AppResult<Invoice>;
    /// Moves to `to` only if the stored status is in `from`. `None` when the
    /// condition did not hold.
    async fn transition_status(
        &self,
        id: Uuid,
        from: &[InvoiceStatus],
        to: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Invoice>>;
    /// Locks the invoice, rechecks that it still accepts item changes,
    /// applies `change` and recomputes totals, all in one transaction.
    /// Totals outside the `i64` range reject the whole change.
    async fn apply_item_change(&self, invoice_id: Uuid, change: &ItemChange) -> AppResult<Invoice>;
    /// Recomputes subtotal and total from the stored items in a single step.
    async fn recalculate_totals(&self, id: Uuid) -> AppResult<Invoice>;
}

#[async_trait]
pub trait InvoiceItemRepo: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<InvoiceItem>>;
    /// Oldest first.
    async fn list_by_invoice(&self, invoice_id: Uuid) -> AppResult<Vec<InvoiceItem>>;
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct LedgerUseCases {
    invoice_repo: Arc<dyn InvoiceRepo>,
    item_repo: Arc<dyn InvoiceItemRepo>,
    events: Arc<dyn BillingEventSink>,
    numbering: InvoiceNumbering,
    default_currency: String,
}

impl LedgerUseCases {
    pub fn new(
        invoice_repo: Arc<dyn InvoiceRepo>,
        item_repo: Arc<dyn InvoiceItemRepo>,
        events: Arc<dyn BillingEventSink>,
        numbering: InvoiceNumbering,
        default_currency: String,
    ) -> Self {
        Self {
            invoice_repo,
            item_repo,
            events,
            numbering,
            default_currency,
        }
    }

    #[instrument(skip(self, input), fields(customer_id = %input.customer_id))]
    pub async fn create_invoice(&self, input: CreateInvoiceInput) -> AppResult<Invoice> {
        let currency = input
            .currency
            .unwrap_or_else(|| self.default_currency.clone())
            .to_lowercase();
        if !is_valid_currency(&currency) {
            return Err(AppError::ValidationError(format!(
                "Invalid currency: {}",
                currency
            )));
        }
        if input.tax_cents < 0 {
            return Err(AppError::ValidationError("Tax cannot be negative".into()));
        }
        let status = input.status.unwrap_or(InvoiceStatus::Draft);
        if !matches!(status, InvoiceStatus::Draft | InvoiceStatus::Open) {
            return Err(AppError::ValidationError(format!(
                "Invoices cannot be created as {}",
                status
            )));
        }

        let mut invoice = Invoice::new(
            input.customer_id,
            input.subscription_id,
            currency,
            status,
            Utc::now(),
        );
        invoice.tax_cents = input.tax_cents;
        invoice.total_cents = input.tax_cents;
        invoice.due_date = input.due_date;
        invoice.notes = input.notes;
        invoice.gateway_id = input.gateway_id;

        for attempt in 1..=MAX_NUMBERING_ATTEMPTS {
            match self
                .invoice_repo
                .create_numbered(&invoice, &self.numbering)
                .await
            {
                Ok(created) => {
                    info!(
                        invoice_id = %created.id,
                        invoice_number = %created.invoice_number,
                        "Invoice created"
                    );
                    return Ok(created);
                }
                Err(AppError::ConcurrencyConflict) => {
                    warn!(attempt, "Invoice number collision, allocating again");
                }
                Err(err) => return Err(err),
            }
        }
        Err(AppError::Internal(
            "Could not allocate a unique invoice number".into(),
        ))
    }

    // ========================================================================
    // Line items
    // ========================================================================

    #[instrument(skip(self, input))]
    pub async fn add_item(
        &self,
        invoice_id: Uuid,
        input: AddInvoiceItemInput,
    ) -> AppResult<(InvoiceItem, Invoice)> {
        if input.description.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Item description is required".into(),
            ));
        }
        if input.quantity < 1 {
            return Err(AppError::ValidationError(
                "Quantity must be at least 1".into(),
            ));
        }
        let amount_cents = match input.amount_cents {
            Some(amount) => amount,
            None => checked_line_amount(input.quantity, input.unit_price_cents)?,
        };
        let invoice = self.editable_invoice(invoice_id).await?;

        let mut item = InvoiceItem::new(
            invoice.id,
            input.description,
            input.quantity,
            input.unit_price_cents,
            amount_cents,
            Utc::now(),
        );
        item.subscription_id = input.subscription_id;
        item.plan_id = input.plan_id;
        item.is_proration = input.is_proration;
        item.period_start = input.period_start;
        item.period_end = input.period_end;

        let invoice = self
            .invoice_repo
            .apply_item_change(invoice.id, &ItemChange::Add(item.clone()))
            .await?;
        Ok((item, invoice))
    }

    #[instrument(skip(self, input))]
    pub async fn update_item(
        &self,
        item_id: Uuid,
        input: UpdateInvoiceItemInput,
    ) -> AppResult<Invoice> {
        let mut item = self
            .item_repo
            .get_by_id(item_id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.editable_invoice(item.invoice_id).await?;

        if let Some(description) = input.description {
            if description.trim().is_empty() {
                return Err(AppError::ValidationError(
                    "Item description is required".into(),
                ));
            }
            item.description = description;
        }
        let pricing_changed = input.quantity.is_some() || input.unit_price_cents.is_some();
        if let Some(quantity) = input.quantity {
            if quantity < 1 {
                return Err(AppError::ValidationError(
                    "Quantity must be at least 1".into(),
                ));
            }
            item.quantity = quantity;
        }
        if let Some(unit_price_cents) = input.unit_price_cents {
            item.unit_price_cents = unit_price_cents;
        }
        item.amount_cents = match input.amount_cents {
            Some(amount) => amount,
            None if pricing_changed => checked_line_amount(item.quantity, item.unit_price_cents)?,
            None => item.amount_cents,
        };
        item.updated_at = Utc::now();

        self.invoice_repo
            .apply_item_change(item.invoice_id, &ItemChange::Update(item.clone()))
            .await
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, item_id: Uuid) -> AppResult<Invoice> {
        let item = self
            .item_repo
            .get_by_id(item_id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.editable_invoice(item.invoice_id).await?;
        self.invoice_repo
            .apply_item_change(item.invoice_id, &ItemChange::Remove(item.id))
            .await
    }

    #[instrument(skip(self))]
    pub async fn set_tax(&self, invoice_id: Uuid, tax_cents: i64) -> AppResult<Invoice> {
        if tax_cents < 0 {
            return Err(AppError::ValidationError("Tax cannot be negative".into()));
        }
        self.editable_invoice(invoice_id).await?;
        self.invoice_repo
            .apply_item_change(invoice_id, &ItemChange::SetTax(tax_cents))
            .await
    }

    /// Idempotent recomputation of subtotal and total.
    pub async fn calculate_totals(&self, invoice_id: Uuid) -> AppResult<Invoice> {
        self.invoice_repo.recalculate_totals(invoice_id).await
    }

    // ========================================================================
    // Status transitions
    // ========================================================================

    #[instrument(skip(self))]
    pub async fn finalize(&self, invoice_id: Uuid) -> AppResult<InvoiceTransition> {
        self.transition(invoice_id, &[InvoiceStatus::Draft], InvoiceStatus::Open)
            .await
    }

    /// Idempotent: an already paid invoice keeps its original `paid_at`.
    #[instrument(skip(self))]
    pub async fn mark_as_paid(&self, invoice_id: Uuid) -> AppResult<InvoiceTransition> {
        let transition = self
            .transition(invoice_id, PAYABLE, InvoiceStatus::Paid)
            .await?;
        if transition.changed {
            self.events
                .emit(BillingEvent::PaymentSucceeded {
                    invoice_id: transition.invoice.id,
                    subscription_id: transition.invoice.subscription_id,
                })
                .await;
        }
        Ok(transition)
    }

    /// `None` when no local invoice carries this gateway id.
    pub async fn mark_paid_by_gateway_id(
        &self,
        gateway_id: &str,
    ) -> AppResult<Option<InvoiceTransition>> {
        match self.invoice_repo.get_by_gateway_id(gateway_id).await? {
            Some(invoice) => self.mark_as_paid(invoice.id).await.map(Some),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn void(&self, invoice_id: Uuid) -> AppResult<InvoiceTransition> {
        self.transition(invoice_id, PAYABLE, InvoiceStatus::Void).await
    }

    #[instrument(skip(self))]
    pub async fn mark_uncollectible(&self, invoice_id: Uuid) -> AppResult<InvoiceTransition> {
        self.transition(
            invoice_id,
            &[InvoiceStatus::Open],
            InvoiceStatus::Uncollectible,
        )
        .await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn list_for_customer(&self, customer: &Customer) -> AppResult<Vec<Invoice>> {
        self.invoice_repo.list_by_customer(customer.id).await
    }

    pub async fn get_for_customer(
        &self,
        customer: &Customer,
        public_id: Uuid,
    ) -> AppResult<InvoiceDetails> {
        let invoice = self
            .invoice_repo
            .get_by_public_id(public_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if invoice.customer_id != customer.id {
            return Err(AppError::Forbidden);
        }
        let items = self.item_repo.list_by_invoice(invoice.id).await?;
        Ok(InvoiceDetails { invoice, items })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn load(&self, invoice_id: Uuid) -> AppResult<Invoice> {
        self.invoice_repo
            .get_by_id(invoice_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn editable_invoice(&self, invoice_id: Uuid) -> AppResult<Invoice> {
        let invoice = self.load(invoice_id).await?;
        if !invoice.status.accepts_item_changes() {
            return Err(frozen_invoice(&invoice));
        }
        Ok(invoice)
    }

    async fn transition(
        &self,
        invoice_id: Uuid,
        from: &[InvoiceStatus],
        to: InvoiceStatus,
    ) -> AppResult<InvoiceTransition> {
        let invoice = self.load(invoice_id).await?;
        if invoice.status == to {
            return Ok(InvoiceTransition {
                invoice,
                changed: false,
            });
        }
        if !from.contains(&invoice.status) {
            return Err(invalid_transition(&invoice, to));
        }

        match self
            .invoice_repo
            .transition_status(invoice_id, from, to, Utc::now())
            .await?
        {
            Some(invoice) => {
                info!(
                    invoice_id = %invoice.id,
                    invoice_number = %invoice.invoice_number,
                    status = %to,
                    "Invoice status changed"
                );
                Ok(InvoiceTransition {
                    invoice,
                    changed: true,
                })
            }
            // Another writer moved it first.
            None => {
                let current = self.load(invoice_id).await?;
                if current.status == to {
                    Ok(InvoiceTransition {
                        invoice: current,
                        changed: false,
                    })
                } else {
                    Err(invalid_transition(&current, to))
                }
            }
        }
    }
}

/// Rejection for item or tax changes on a paid, void or uncollectible invoice.
pub fn frozen_invoice(invoice: &Invoice) -> AppError {
    AppError::ValidationError(format!(
        "Invoice {} is {} and can no longer change",
        invoice.invoice_number, invoice.status
    ))
}

pub fn totals_out_of_range() -> AppError {
    AppError::ValidationError("Invoice totals exceed the supported range".into())
}

fn checked_line_amount(quantity: i32, unit_price_cents: i64) -> AppResult<i64> {
    InvoiceItem::line_amount(quantity, unit_price_cents).ok_or_else(|| {
        AppError::ValidationError("Item amount exceeds the supported range".into())
    })
}

fn invalid_transition(invoice: &Invoice, to: InvoiceStatus) -> AppError {
    AppError::ValidationError(format!(
        "Invoice {} cannot move from {} to {}",
        invoice.invoice_number, invoice.status, to
    ))
}
