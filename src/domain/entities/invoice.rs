use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invoice_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Open,
    Paid,
    Void,
    Uncollectible,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Open => "open",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
            InvoiceStatus::Uncollectible => "uncollectible",
        }
    }

    /// Line items may only change while the invoice is still payable.
    pub fn accepts_item_changes(&self) -> bool {
        !matches!(self, InvoiceStatus::Paid | InvoiceStatus::Void)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(InvoiceStatus::Draft),
            "open" => Ok(InvoiceStatus::Open),
            "paid" => Ok(InvoiceStatus::Paid),
            "void" => Ok(InvoiceStatus::Void),
            "uncollectible" => Ok(InvoiceStatus::Uncollectible),
            _ => Err(format!("Unknown invoice status: {}", s)),
        }
    }
}

// ============================================================================
// Numbering
// ============================================================================

/// Prefix and floor for human-readable invoice numbers.
#[derive(Debug, Clone)]
pub struct InvoiceNumbering {
    pub prefix: String,
    pub starting_number: i64,
}

impl Default for InvoiceNumbering {
    fn default() -> Self {
        Self {
            prefix: "INV-".to_string(),
            starting_number: 1000,
        }
    }
}

impl InvoiceNumbering {
    /// `max(last + 1, starting_number)`; the first invoice gets `starting_number`.
    /// `None` once the sequence is exhausted.
    pub fn next_sequence(&self, last: Option<i64>) -> Option<i64> {
        match last {
            Some(last) => last.checked_add(1).map(|next| next.max(self.starting_number)),
            None => Some(self.starting_number),
        }
    }

    pub fn format(&self, sequence: i64) -> String {
        format!("{}{}", self.prefix, sequence)
    }
}

// ============================================================================
// Totals
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
}

impl InvoiceTotals {
    /// `None` when the subtotal or total leaves the `i64` range.
    pub fn from_amounts(amounts: impl IntoIterator<Item = i64>, tax_cents: i64) -> Option<Self> {
        let subtotal: i128 = amounts.into_iter().map(i128::from).sum();
        let subtotal_cents = i64::try_from(subtotal).ok()?;
        Some(Self {
            subtotal_cents,
            tax_cents,
            total_cents: subtotal_cents.checked_add(tax_cents)?,
        })
    }
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Invoice {
    #[serde(skip)]
    pub id: Uuid,
    #[serde(rename = "id")]
    pub public_id: Uuid,
    #[serde(skip)]
    pub customer_id: Uuid,
    #[serde(skip)]
    pub subscription_id: Option<Uuid>,
    #[serde(skip)]
    pub gateway_id: Option<String>,
    pub invoice_number: String,
    #[serde(skip)]
    pub sequence_number: i64,
    pub status: InvoiceStatus,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub due_date: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub voided_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Unnumbered invoice; the ledger assigns the number when it is stored.
    pub fn new(
        customer_id: Uuid,
        subscription_id: Option<Uuid>,
        currency: String,
        status: InvoiceStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            public_id: Uuid::new_v4(),
            customer_id,
            subscription_id,
            gateway_id: None,
            invoice_number: String::new(),
            sequence_number: 0,
            status,
            subtotal_cents: 0,
            tax_cents: 0,
            total_cents: 0,
            currency,
            due_date: None,
            paid_at: None,
            voided_at: None,
            notes: None,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn assign_number(&mut self, numbering: &InvoiceNumbering, sequence: i64) {
        self.sequence_number = sequence;
        self.invoice_number = numbering.format(sequence);
    }

    pub fn apply_totals(&mut self, totals: InvoiceTotals) {
        self.subtotal_cents = totals.subtotal_cents;
        self.tax_cents = totals.tax_cents;
        self.total_cents = totals.total_cents;
    }

    pub fn is_paid(&self) -> bool {
        self.status == InvoiceStatus::Paid
    }

    pub fn is_void(&self) -> bool {
        self.status == InvoiceStatus::Void
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == InvoiceStatus::Open && self.due_date.is_some_and(|due| due < now)
    }

    /// Moves to `next` if the current status is one of `from`, stamping
    /// `paid_at`/`voided_at` as appropriate. Returns whether it changed.
    pub fn transition(
        &mut self,
        from: &[InvoiceStatus],
        next: InvoiceStatus,
        now: DateTime<Utc>,
    ) -> bool {
        if !from.contains(&self.status) {
            return false;
        }
        self.status = next;
        match next {
            InvoiceStatus::Paid => self.paid_at = Some(now),
            InvoiceStatus::Void => self.voided_at = Some(now),
            _ => {}
        }
        self.updated_at = now;
        true
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceItem {
    #[serde(skip)]
    pub id: Uuid,
    #[serde(rename = "id")]
    pub public_id: Uuid,
    #[serde(skip)]
    pub invoice_id: Uuid,
    #[serde(skip)]
    pub subscription_id: Option<Uuid>,
    #[serde(skip)]
    pub plan_id: Option<Uuid>,
    pub description: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub amount_cents: i64,
    pub is_proration: bool,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceItem {
    /// `quantity * unit_price_cents`, or `None` on overflow.
    pub fn line_amount(quantity: i32, unit_price_cents: i64) -> Option<i64> {
        i64::from(quantity).checked_mul(unit_price_cents)
    }

    pub fn new(
        invoice_id: Uuid,
        description: String,
        quantity: i32,
        unit_price_cents: i64,
        amount_cents: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            public_id: Uuid::new_v4(),
            invoice_id,
            subscription_id: None,
            plan_id: None,
            description,
            quantity,
            unit_price_cents,
            amount_cents,
            is_proration: false,
            period_start: None,
            period_end: None,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }
}
