use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    app_error::AppResult,
    application::use_cases::subscription::{SubscriptionDetails, SubscriptionOutcome},
    domain::entities::customer::Customer,
};

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionPayload {
    pub plan_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelQuery {
    #[serde(default)]
    pub immediately: bool,
}

/// GET /billing/subscriptions
async fn list_subscriptions(
    State(app_state): State<AppState>,
    Extension(customer): Extension<Customer>,
) -> AppResult<Json<Vec<SubscriptionDetails>>> {
    let subscriptions = app_state.subscriptions.list_for_customer(&customer).await?;
    Ok(Json(subscriptions))
}

/// POST /billing/subscriptions
async fn create_subscription(
    State(app_state): State<AppState>,
    Extension(customer): Extension<Customer>,
    Json(payload): Json<CreateSubscriptionPayload>,
) -> AppResult<impl IntoResponse> {
    let outcome = app_state
        .subscriptions
        .create(&customer, payload.plan_id, payload.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /billing/subscriptions/{id}
async fn get_subscription(
    State(app_state): State<AppState>,
    Extension(customer): Extension<Customer>,
    Path(subscription_id): Path<Uuid>,
) -> AppResult<Json<SubscriptionDetails>> {
    let details = app_state
        .subscriptions
        .get_for_customer(&customer, subscription_id)
        .await?;
    Ok(Json(details))
}

/// DELETE /billing/subscriptions/{id}?immediately=true
async fn cancel_subscription(
    State(app_state): State<AppState>,
    Extension(customer): Extension<Customer>,
    Path(subscription_id): Path<Uuid>,
    Query(query): Query<CancelQuery>,
) -> AppResult<Json<SubscriptionOutcome>> {
    let subscription = app_state
        .subscriptions
        .find_owned(&customer, subscription_id)
        .await?;
    let outcome = app_state
        .subscriptions
        .cancel(subscription.id, query.immediately)
        .await?;
    Ok(Json(outcome))
}

/// POST /billing/subscriptions/{id}/resume
async fn resume_subscription(
    State(app_state): State<AppState>,
    Extension(customer): Extension<Customer>,
    Path(subscription_id): Path<Uuid>,
) -> AppResult<Json<SubscriptionOutcome>> {
    let subscription = app_state
        .subscriptions
        .find_owned(&customer, subscription_id)
        .await?;
    let outcome = app_state.subscriptions.resume(subscription.id).await?;
    Ok(Json(outcome))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_subscriptions).post(create_subscription))
        .route("/{id}", get(get_subscription).delete(cancel_subscription))
        .route("/{id}/resume", post(resume_subscription))
}
