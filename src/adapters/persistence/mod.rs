use sqlx::PgPool;

use crate::app_error::AppError;

const MAX_JSON_LOG_LEN: usize = 200;

/// Constraints whose violation means a concurrent writer won a race.
const CONFLICT_CONSTRAINTS: &[&str] = &[
    "invoices_invoice_number_key",
    "invoices_sequence_number_key",
];

/// SQLSTATE `numeric_value_out_of_range`, raised by overflowing `BIGINT` math.
const NUMERIC_OUT_OF_RANGE: &str = "22003";

/// Parse JSON value to target type, logging warning on failure.
///
/// Handles NULL gracefully (returns default without logging).
/// Only logs warnings for actual parse failures (type mismatches, corruption).
pub fn parse_json_with_fallback<T: serde::de::DeserializeOwned + Default>(
    json: &serde_json::Value,
    field_name: &str,
    entity_type: &str,
    entity_id: &str,
) -> T {
    if json.is_null() {
        return T::default();
    }

    serde_json::from_value(json.clone()).unwrap_or_else(|err| {
        let raw_str = json.to_string();
        let truncated = if raw_str.len() > MAX_JSON_LOG_LEN {
            let cut = (0..=MAX_JSON_LOG_LEN)
                .rev()
                .find(|i| raw_str.is_char_boundary(*i))
                .unwrap_or(0);
            format!("{}...", &raw_str[..cut])
        } else {
            raw_str
        };

        tracing::warn!(
            field = field_name,
            entity_type = entity_type,
            entity_id = entity_id,
            raw_json = %truncated,
            error = %err,
            "Failed to parse JSON field, using default value"
        );
        T::default()
    })
}

pub mod customer;
pub mod invoice;
pub mod plan;
pub mod subscription;
pub mod usage_record;
pub mod webhook_event;

#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    pub fn new(pool: PgPool) -> Self {
        PostgresPersistence { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound,
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    if db_err
                        .constraint()
                        .is_some_and(|c| CONFLICT_CONSTRAINTS.contains(&c))
                    {
                        AppError::ConcurrencyConflict
                    } else {
                        AppError::ValidationError("A record with this value already exists".into())
                    }
                } else if db_err.is_foreign_key_violation() {
                    AppError::ValidationError("Referenced record not found".into())
                } else if db_err.is_check_violation() {
                    AppError::ValidationError("Value out of range".into())
                } else if db_err.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE) {
                    AppError::ValidationError("Amount exceeds the supported range".into())
                } else {
                    // Log the actual error for debugging, but don't expose details
                    tracing::error!(error = ?err, "Database error");
                    AppError::Database("Database operation failed".into())
                }
            }
            _ => {
                tracing::error!(error = ?err, "Database error");
                AppError::Database("Database operation failed".into())
            }
        }
    }
}
