pub mod invoices;
pub mod plans;
pub mod subscriptions;
pub mod webhook;

use axum::{Router, middleware};

use crate::adapters::http::{app_state::AppState, middleware::customer_auth};

pub fn router(app_state: AppState) -> Router<AppState> {
    let owner_scoped = Router::new()
        .nest("/subscriptions", subscriptions::router())
        .nest("/invoices", invoices::router())
        .route_layer(middleware::from_fn_with_state(app_state, customer_auth));

    Router::new()
        .nest("/plans", plans::router())
        .nest("/webhook", webhook::router())
        .merge(owner_scoped)
}
