use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    app_error::AppResult,
    application::use_cases::billing_ledger::InvoiceDetails,
    domain::entities::{customer::Customer, invoice::Invoice},
};

/// GET /billing/invoices
async fn list_invoices(
    State(app_state): State<AppState>,
    Extension(customer): Extension<Customer>,
) -> AppResult<Json<Vec<Invoice>>> {
    let invoices = app_state.ledger.list_for_customer(&customer).await?;
    Ok(Json(invoices))
}

/// GET /billing/invoices/{id}
async fn get_invoice(
    State(app_state): State<AppState>,
    Extension(customer): Extension<Customer>,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<Json<InvoiceDetails>> {
    let details = app_state
        .ledger
        .get_for_customer(&customer, invoice_id)
        .await?;
    Ok(Json(details))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_invoices))
        .route("/{id}", get(get_invoice))
}
