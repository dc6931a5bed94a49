use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{adapters::http::app_state::AppState, app_error::AppResult, domain::entities::plan::Plan};

/// GET /billing/plans
async fn list_plans(State(app_state): State<AppState>) -> AppResult<Json<Vec<Plan>>> {
    let plans = app_state.catalog.list_public_plans().await?;
    Ok(Json(plans))
}

/// GET /billing/plans/{id}
async fn get_plan(
    State(app_state): State<AppState>,
    Path(plan_id): Path<Uuid>,
) -> AppResult<Json<Plan>> {
    let plan = app_state.catalog.get_public_plan(plan_id).await?;
    Ok(Json(plan))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_plans))
        .route("/{id}", get(get_plan))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;

    use super::*;
    use crate::test_utils::{TestBillingBuilder, create_test_plan};

    fn server(plans: Vec<Plan>) -> TestServer {
        let billing = TestBillingBuilder::new().with_plans(plans).build();
        let app_state = billing.app_state();
        TestServer::new(router().with_state(app_state)).unwrap()
    }

    #[tokio::test]
    async fn lists_only_active_plans_in_sort_order() {
        let second = create_test_plan(|p| {
            p.slug = "pro".into();
            p.name = "Pro".into();
            p.sort_order = 2;
        });
        let first = create_test_plan(|p| {
            p.slug = "basic".into();
            p.sort_order = 1;
        });
        let hidden = create_test_plan(|p| {
            p.slug = "legacy".into();
            p.is_active = false;
        });
        let server = server(vec![second.clone(), first.clone(), hidden]);

        let response = server.get("/").await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let body: serde_json::Value = response.json();
        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].as_str().unwrap())
            .collect();
        assert_eq!(
            ids,
            vec![first.public_id.to_string(), second.public_id.to_string()]
        );
    }

    #[tokio::test]
    async fn plan_json_hides_internal_and_gateway_ids() {
        let plan = create_test_plan(|_| {});
        let server = server(vec![plan.clone()]);

        let response = server.get(&format!("/{}", plan.public_id)).await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let body: serde_json::Value = response.json();
        assert_eq!(body["id"], plan.public_id.to_string());
        assert!(body.get("gateway_price_id").is_none());
        assert!(!body.to_string().contains(&plan.id.to_string()));
    }

    #[tokio::test]
    async fn inactive_plan_is_not_found() {
        let plan = create_test_plan(|p| p.is_active = false);
        let server = server(vec![plan.clone()]);

        let response = server.get(&format!("/{}", plan.public_id)).await;

        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    }
}
