use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::billing_ledger::{InvoiceItemRepo, InvoiceRepo, ItemChange, frozen_invoice},
    domain::entities::invoice::{Invoice, InvoiceItem, InvoiceNumbering, InvoiceStatus},
};

/// Advisory lock key serializing invoice number allocation.
const NUMBERING_LOCK_KEY: i64 = 0x1_1A70_1CE5;

// ============================================================================
// Invoices
// ============================================================================

fn row_to_invoice(row: sqlx::postgres::PgRow) -> Invoice {
    Invoice {
        id: row.get("id"),
        public_id: row.get("public_id"),
        customer_id: row.get("customer_id"),
        subscription_id: row.get("subscription_id"),
        gateway_id: row.get("gateway_id"),
        invoice_number: row.get("invoice_number"),
        sequence_number: row.get("sequence_number"),
        status: row.get("status"),
        subtotal_cents: row.get("subtotal_cents"),
        tax_cents: row.get("tax_cents"),
        total_cents: row.get("total_cents"),
        currency: row.get("currency"),
        due_date: row.get("due_date"),
        paid_at: row.get("paid_at"),
        voided_at: row.get("voided_at"),
        notes: row.get("notes"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const INVOICE_COLS: &str = r#"
    id, public_id, customer_id, subscription_id, gateway_id, invoice_number, sequence_number,
    status, subtotal_cents, tax_cents, total_cents, currency, due_date, paid_at, voided_at,
    notes, metadata, created_at, updated_at
"#;

#[async_trait]
impl InvoiceRepo for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Invoice>> {
        let row = sqlx::query(&format!("SELECT {} FROM invoices WHERE id = $1", INVOICE_COLS))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;
        Ok(row.map(row_to_invoice))
    }

    async fn get_by_public_id(&self, public_id: Uuid) -> AppResult<Option<Invoice>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM invoices WHERE public_id = $1",
            INVOICE_COLS
        ))
        .bind(public_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_invoice))
    }

    async fn get_by_gateway_id(&self, gateway_id: &str) -> AppResult<Option<Invoice>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM invoices WHERE gateway_id = $1",
            INVOICE_COLS
        ))
        .bind(gateway_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_invoice))
    }

    async fn list_by_customer(&self, customer_id: Uuid) -> AppResult<Vec<Invoice>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM invoices WHERE customer_id = $1 ORDER BY created_at DESC, sequence_number DESC",
            INVOICE_COLS
        ))
        .bind(customer_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_invoice).collect())
    }

    async fn create_numbered(
        &self,
        invoice: &Invoice,
        numbering: &InvoiceNumbering,
    ) -> AppResult<Invoice> {
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        // Held until commit; concurrent allocators queue here.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(NUMBERING_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;

        let last: Option<i64> = sqlx::query_scalar("SELECT MAX(sequence_number) FROM invoices")
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::from)?;

        let mut numbered = invoice.clone();
        let sequence = numbering
            .next_sequence(last)
            .ok_or_else(|| AppError::Internal("Invoice number sequence exhausted".into()))?;
        numbered.assign_number(numbering, sequence);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO invoices (
                id, public_id, customer_id, subscription_id, gateway_id, invoice_number,
                sequence_number, status, subtotal_cents, tax_cents, total_cents, currency,
                due_date, paid_at, voided_at, notes, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19)
            RETURNING {}
            "#,
            INVOICE_COLS
        ))
        .bind(numbered.id)
        .bind(numbered.public_id)
        .bind(numbered.customer_id)
        .bind(numbered.subscription_id)
        .bind(&numbered.gateway_id)
        .bind(&numbered.invoice_number)
        .bind(numbered.sequence_number)
        .bind(numbered.status)
        .bind(numbered.subtotal_cents)
        .bind(numbered.tax_cents)
        .bind(numbered.total_cents)
        .bind(&numbered.currency)
        .bind(numbered.due_date)
        .bind(numbered.paid_at)
        .bind(numbered.voided_at)
        .bind(&numbered.notes)
        .bind(&numbered.metadata)
        .bind(numbered.created_at)
        .bind(numbered.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::from)?;

        tx.commit().await.map_err(AppError::from)?;
        Ok(row_to_invoice(row))
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: &[InvoiceStatus],
        to: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Invoice>> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();

        let row = sqlx::query(&format!(
            r#"
            UPDATE invoices SET
                status = $3,
                paid_at = CASE WHEN $3 = 'paid'::invoice_status THEN $4 ELSE paid_at END,
                voided_at = CASE WHEN $3 = 'void'::invoice_status THEN $4 ELSE voided_at END,
                updated_at = $4
            WHERE id = $1 AND status::text = ANY($2)
            RETURNING {}
            "#,
            INVOICE_COLS
        ))
        .bind(id)
        .bind(&from)
        .bind(to)
        .bind(at)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_invoice))
    }

    async fn apply_item_change(&self, invoice_id: Uuid, change: &ItemChange) -> AppResult<Invoice> {
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        // Row lock held until commit; concurrent item writers and status
        // transitions on this invoice queue behind it.
        let locked = sqlx::query(&format!(
            "SELECT {} FROM invoices WHERE id = $1 FOR UPDATE",
            INVOICE_COLS
        ))
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from)?
        .map(row_to_invoice)
        .ok_or(AppError::NotFound)?;
        if !locked.status.accepts_item_changes() {
            return Err(frozen_invoice(&locked));
        }

        match change {
            ItemChange::Add(item) => insert_item(&mut tx, item).await?,
            ItemChange::Update(item) => update_item(&mut tx, invoice_id, item).await?,
            ItemChange::Remove(item_id) => delete_item(&mut tx, invoice_id, *item_id).await?,
            ItemChange::SetTax(tax_cents) => {
                sqlx::query("UPDATE invoices SET tax_cents = $2 WHERE id = $1")
                    .bind(invoice_id)
                    .bind(tax_cents)
                    .execute(&mut *tx)
                    .await
                    .map_err(AppError::from)?;
            }
        }

        let invoice = recalculate_in(&mut tx, invoice_id).await?;
        tx.commit().await.map_err(AppError::from)?;
        Ok(invoice)
    }

    async fn recalculate_totals(&self, id: Uuid) -> AppResult<Invoice> {
        let mut conn = self.pool().acquire().await.map_err(AppError::from)?;
        recalculate_in(&mut conn, id).await
    }
}

/// Range errors from the `BIGINT` casts surface as `ValidationError`.
async fn recalculate_in(conn: &mut PgConnection, id: Uuid) -> AppResult<Invoice> {
    let row = sqlx::query(&format!(
        r#"
        WITH sums AS (
            SELECT COALESCE(SUM(amount_cents), 0)::BIGINT AS subtotal
            FROM invoice_items WHERE invoice_id = $1
        )
        UPDATE invoices SET
            subtotal_cents = sums.subtotal,
            total_cents = sums.subtotal + invoices.tax_cents,
            updated_at = NOW()
        FROM sums
        WHERE invoices.id = $1
        RETURNING {}
        "#,
        INVOICE_COLS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(AppError::from)?
    .ok_or(AppError::NotFound)?;
    Ok(row_to_invoice(row))
}

// ============================================================================
// Invoice items
// ============================================================================

fn row_to_item(row: sqlx::postgres::PgRow) -> InvoiceItem {
    InvoiceItem {
        id: row.get("id"),
        public_id: row.get("public_id"),
        invoice_id: row.get("invoice_id"),
        subscription_id: row.get("subscription_id"),
        plan_id: row.get("plan_id"),
        description: row.get("description"),
        quantity: row.get("quantity"),
        unit_price_cents: row.get("unit_price_cents"),
        amount_cents: row.get("amount_cents"),
        is_proration: row.get("is_proration"),
        period_start: row.get("period_start"),
        period_end: row.get("period_end"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const ITEM_COLS: &str = r#"
    id, public_id, invoice_id, subscription_id, plan_id, description, quantity,
    unit_price_cents, amount_cents, is_proration, period_start, period_end, metadata,
    created_at, updated_at
"#;

#[async_trait]
impl InvoiceItemRepo for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<InvoiceItem>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM invoice_items WHERE id = $1",
            ITEM_COLS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_item))
    }

    async fn list_by_invoice(&self, invoice_id: Uuid) -> AppResult<Vec<InvoiceItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM invoice_items WHERE invoice_id = $1 ORDER BY created_at",
            ITEM_COLS
        ))
        .bind(invoice_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_item).collect())
    }
}

async fn insert_item(conn: &mut PgConnection, item: &InvoiceItem) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO invoice_items (
            id, public_id, invoice_id, subscription_id, plan_id, description, quantity,
            unit_price_cents, amount_cents, is_proration, period_start, period_end, metadata,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(item.id)
    .bind(item.public_id)
    .bind(item.invoice_id)
    .bind(item.subscription_id)
    .bind(item.plan_id)
    .bind(&item.description)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(item.amount_cents)
    .bind(item.is_proration)
    .bind(item.period_start)
    .bind(item.period_end)
    .bind(&item.metadata)
    .bind(item.created_at)
    .bind(item.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(AppError::from)?;
    Ok(())
}

async fn update_item(conn: &mut PgConnection, invoice_id: Uuid, item: &InvoiceItem) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE invoice_items SET
            description = $3, quantity = $4, unit_price_cents = $5, amount_cents = $6,
            updated_at = $7
        WHERE id = $1 AND invoice_id = $2
        "#,
    )
    .bind(item.id)
    .bind(invoice_id)
    .bind(&item.description)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(item.amount_cents)
    .bind(item.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(AppError::from)?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

async fn delete_item(conn: &mut PgConnection, invoice_id: Uuid, item_id: Uuid) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM invoice_items WHERE id = $1 AND invoice_id = $2")
        .bind(item_id)
        .bind(invoice_id)
        .execute(&mut *conn)
        .await
        .map_err(AppError::from)?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}
