//! Payment gateway webhook ingress.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};

use crate::{
    adapters::http::app_state::AppState,
    app_error::AppResult,
    application::use_cases::webhook::WebhookOutcome,
};

pub const SIGNATURE_HEADER: &str = "billing-signature";

/// POST /billing/webhook/gateway
///
/// Once the delivery is authenticated and parsed it is acknowledged, even
/// when the handler failed; handler failures go to the event sink instead.
async fn handle_gateway_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<impl IntoResponse> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = app_state.reconciler.handle(&body, signature).await?;

    if let WebhookOutcome::HandlerFailed(error) = &outcome {
        tracing::warn!(error = %error, "Webhook acknowledged despite handler failure");
    }

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "status": "success", "outcome": outcome.as_str() })),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", post(handle_gateway_webhook))
}
