use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{adapters::http::app_state::AppState, app_error::AppError};

/// Header carrying the customer's public id, set by the upstream
/// authentication layer.
pub const CUSTOMER_HEADER: &str = "x-billing-customer-id";

/// Resolves the calling customer and stores it in request extensions for
/// the owner-scoped routes.
pub async fn customer_auth(
    State(app_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let public_id = request
        .headers()
        .get(CUSTOMER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or(AppError::Unauthorized)?;

    let customer = app_state
        .customers
        .get_by_public_id(public_id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    tracing::debug!(customer_id = %customer.id, "Resolved billing customer");

    request.extensions_mut().insert(customer);
    Ok(next.run(request).await)
}
