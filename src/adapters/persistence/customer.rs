use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::customer::{CustomerRepo, PaymentMethodRepo},
    domain::entities::{
        customer::{Billable, Customer},
        payment_method::PaymentMethod,
    },
};

// ============================================================================
// Customers
// ============================================================================

fn row_to_customer(row: sqlx::postgres::PgRow) -> Customer {
    Customer {
        id: row.get("id"),
        public_id: row.get("public_id"),
        billable_type: row.get("billable_type"),
        billable_id: row.get("billable_id"),
        workspace_id: row.get("workspace_id"),
        gateway_id: row.get("gateway_id"),
        email: row.get("email"),
        name: row.get("name"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const CUSTOMER_COLS: &str = r#"
    id, public_id, billable_type, billable_id, workspace_id, gateway_id,
    email, name, metadata, created_at, updated_at
"#;

#[async_trait]
impl CustomerRepo for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM customers WHERE id = $1",
            CUSTOMER_COLS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_customer))
    }

    async fn get_by_public_id(&self, public_id: Uuid) -> AppResult<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM customers WHERE public_id = $1",
            CUSTOMER_COLS
        ))
        .bind(public_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_customer))
    }

    async fn get_by_billable(
        &self,
        billable: &Billable,
        workspace_id: Option<Uuid>,
    ) -> AppResult<Option<Customer>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM customers
            WHERE billable_type = $1 AND billable_id = $2
              AND workspace_id IS NOT DISTINCT FROM $3
            "#,
            CUSTOMER_COLS
        ))
        .bind(&billable.billable_type)
        .bind(&billable.billable_id)
        .bind(workspace_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_customer))
    }

    async fn insert_if_absent(&self, customer: &Customer) -> AppResult<Customer> {
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO customers (
                id, public_id, billable_type, billable_id, workspace_id, gateway_id,
                email, name, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT ON CONSTRAINT customers_billable_key DO NOTHING
            RETURNING {}
            "#,
            CUSTOMER_COLS
        ))
        .bind(customer.id)
        .bind(customer.public_id)
        .bind(&customer.billable_type)
        .bind(&customer.billable_id)
        .bind(customer.workspace_id)
        .bind(&customer.gateway_id)
        .bind(&customer.email)
        .bind(&customer.name)
        .bind(&customer.metadata)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        match inserted {
            Some(row) => Ok(row_to_customer(row)),
            // Lost the race to a concurrent insert; return the winner.
            None => self
                .get_by_billable(&customer.billable(), customer.workspace_id)
                .await?
                .ok_or(AppError::NotFound),
        }
    }
}

// ============================================================================
// Payment methods
// ============================================================================

fn row_to_payment_method(row: sqlx::postgres::PgRow) -> PaymentMethod {
    PaymentMethod {
        id: row.get("id"),
        public_id: row.get("public_id"),
        customer_id: row.get("customer_id"),
        gateway_id: row.get("gateway_id"),
        method_type: row.get("method_type"),
        brand: row.get("brand"),
        last_four: row.get("last_four"),
        exp_month: row.get("exp_month"),
        exp_year: row.get("exp_year"),
        is_default: row.get("is_default"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const PAYMENT_METHOD_COLS: &str = r#"
    id, public_id, customer_id, gateway_id, method_type, brand, last_four,
    exp_month, exp_year, is_default, metadata, created_at, updated_at
"#;

#[async_trait]
impl PaymentMethodRepo for PostgresPersistence {
    async fn create(&self, method: &PaymentMethod) -> AppResult<PaymentMethod> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO payment_methods (
                id, public_id, customer_id, gateway_id, method_type, brand, last_four,
                exp_month, exp_year, is_default, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, false, $10, $11, $12)
            RETURNING {}
            "#,
            PAYMENT_METHOD_COLS
        ))
        .bind(method.id)
        .bind(method.public_id)
        .bind(method.customer_id)
        .bind(&method.gateway_id)
        .bind(method.method_type)
        .bind(&method.brand)
        .bind(&method.last_four)
        .bind(method.exp_month)
        .bind(method.exp_year)
        .bind(&method.metadata)
        .bind(method.created_at)
        .bind(method.updated_at)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row_to_payment_method(row))
    }

    async fn get_by_public_id(&self, public_id: Uuid) -> AppResult<Option<PaymentMethod>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payment_methods WHERE public_id = $1",
            PAYMENT_METHOD_COLS
        ))
        .bind(public_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_payment_method))
    }

    async fn list_by_customer(&self, customer_id: Uuid) -> AppResult<Vec<PaymentMethod>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM payment_methods WHERE customer_id = $1 ORDER BY created_at",
            PAYMENT_METHOD_COLS
        ))
        .bind(customer_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_payment_method).collect())
    }

    async fn set_default(&self, customer_id: Uuid, method_id: Uuid) -> AppResult<PaymentMethod> {
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        sqlx::query(
            "UPDATE payment_methods SET is_default = false, updated_at = NOW() WHERE customer_id = $1 AND is_default AND id <> $2",
        )
        .bind(customer_id)
        .bind(method_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE payment_methods SET is_default = true, updated_at = NOW()
            WHERE id = $1 AND customer_id = $2
            RETURNING {}
            "#,
            PAYMENT_METHOD_COLS
        ))
        .bind(method_id)
        .bind(customer_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from)?
        .ok_or(AppError::NotFound)?;

        tx.commit().await.map_err(AppError::from)?;
        Ok(row_to_payment_method(row))
    }
}
