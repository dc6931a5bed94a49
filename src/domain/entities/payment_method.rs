use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodType {
    Card,
    BankAccount,
}

impl PaymentMethodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethodType::Card => "card",
            PaymentMethodType::BankAccount => "bank_account",
        }
    }
}

impl FromStr for PaymentMethodType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(PaymentMethodType::Card),
            "bank_account" | "us_bank_account" | "sepa_debit" => Ok(PaymentMethodType::BankAccount),
            _ => Err(format!("Unknown payment method type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentMethod {
    #[serde(skip)]
    pub id: Uuid,
    #[serde(rename = "id")]
    pub public_id: Uuid,
    #[serde(skip)]
    pub customer_id: Uuid,
    #[serde(skip)]
    pub gateway_id: Option<String>,
    #[serde(rename = "type")]
    pub method_type: PaymentMethodType,
    pub brand: Option<String>,
    pub last_four: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
    pub is_default: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentMethod {
    pub fn new(
        customer_id: Uuid,
        method_type: PaymentMethodType,
        gateway_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            public_id: Uuid::new_v4(),
            customer_id,
            gateway_id,
            method_type,
            brand: None,
            last_four: None,
            exp_month: None,
            exp_year: None,
            is_default: false,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    /// A card expires after the last day of its expiry month.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (self.exp_year, self.exp_month) {
            (Some(year), Some(month)) => {
                (year, month as u32) < (now.year(), now.month())
            }
            _ => false,
        }
    }

    pub fn display_name(&self) -> String {
        match self.method_type {
            PaymentMethodType::Card => format!(
                "{} ending in {}",
                self.brand.as_deref().unwrap_or("Card"),
                self.last_four.as_deref().unwrap_or("****")
            ),
            PaymentMethodType::BankAccount => format!(
                "Bank account ending in {}",
                self.last_four.as_deref().unwrap_or("****")
            ),
        }
    }
}
