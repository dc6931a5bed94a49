use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        PaymentGatewayPort, RemoteSubscription, RemoteSubscriptionId, RemoteSubscriptionRequest,
    },
};

/// Stripe-compatible REST client behind `PaymentGatewayPort`.
#[derive(Clone)]
pub struct StripeGatewayClient {
    client: Client,
    secret_key: SecretString,
    api_base: String,
}

impl StripeGatewayClient {
    pub fn new(secret_key: SecretString, api_base: &Url, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            secret_key,
            api_base: api_base.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:", self.secret_key.expose_secret()));
        format!("Basic {}", encoded)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::GatewaySync(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Gateway API error");

            if let Ok(error) = serde_json::from_str::<StripeErrorResponse>(&body) {
                return Err(AppError::GatewaySync(
                    error.error.message.unwrap_or(error.error.error_type),
                ));
            }
            return Err(AppError::GatewaySync(format!("Gateway returned {}", status)));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(body = %body, error = %e, "Failed to parse gateway response");
            AppError::GatewaySync(format!("Failed to parse gateway response: {}", e))
        })
    }
}

/// Form fields for a subscription create call.
fn subscription_form(request: &RemoteSubscriptionRequest) -> AppResult<Vec<(String, String)>> {
    let mut params: Vec<(String, String)> = vec![(
        "metadata[subscription_id]".to_string(),
        request.subscription_id.to_string(),
    )];

    if let Some(customer) = &request.customer_gateway_id {
        params.push(("customer".to_string(), customer.clone()));
    }

    for (i, item) in request.items.iter().enumerate() {
        let price = item.price_id.as_ref().ok_or_else(|| {
            AppError::GatewaySync("Plan has no gateway price; sync the catalog first".into())
        })?;
        params.push((format!("items[{}][price]", i), price.clone()));
        params.push((format!("items[{}][quantity]", i), item.quantity.to_string()));
    }

    Ok(params)
}

#[async_trait]
impl PaymentGatewayPort for StripeGatewayClient {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn create_remote_subscription(
        &self,
        request: &RemoteSubscriptionRequest,
    ) -> AppResult<RemoteSubscription> {
        let params = subscription_form(request)?;

        let response = self
            .client
            .post(self.url("subscriptions"))
            .header("Authorization", self.auth_header())
            .header("Idempotency-Key", request.subscription_id.to_string())
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::GatewaySync(format!("Gateway request failed: {}", e)))?;

        let created: StripeSubscription = self.handle_response(response).await?;
        Ok(RemoteSubscription {
            id: RemoteSubscriptionId::new(created.id),
            status: created.status,
        })
    }

    async fn cancel_remote_subscription(
        &self,
        remote_id: &RemoteSubscriptionId,
        immediate: bool,
    ) -> AppResult<()> {
        let url = self.url(&format!("subscriptions/{}", remote_id));

        let request = if immediate {
            self.client.delete(url)
        } else {
            self.client
                .post(url)
                .form(&[("cancel_at_period_end", "true")])
        };

        let response = request
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| AppError::GatewaySync(format!("Gateway request failed: {}", e)))?;

        let _: StripeSubscription = self.handle_response(response).await?;
        Ok(())
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct StripeSubscription {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    #[serde(rename = "type")]
    error_type: String,
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::payment_gateway::RemoteSubscriptionItem;
    use uuid::Uuid;

    fn request(items: Vec<RemoteSubscriptionItem>) -> RemoteSubscriptionRequest {
        RemoteSubscriptionRequest {
            subscription_id: Uuid::new_v4(),
            customer_gateway_id: Some("cus_123".into()),
            items,
        }
    }

    #[test]
    fn form_lists_every_item_with_price_and_quantity() {
        let params = subscription_form(&request(vec![
            RemoteSubscriptionItem {
                price_id: Some("price_a".into()),
                quantity: 1,
            },
            RemoteSubscriptionItem {
                price_id: Some("price_b".into()),
                quantity: 3,
            },
        ]))
        .unwrap();

        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("customer"), Some("cus_123"));
        assert_eq!(get("items[0][price]"), Some("price_a"));
        assert_eq!(get("items[1][price]"), Some("price_b"));
        assert_eq!(get("items[1][quantity]"), Some("3"));
    }

    #[test]
    fn unsynced_plan_is_a_sync_failure() {
        let result = subscription_form(&request(vec![RemoteSubscriptionItem {
            price_id: None,
            quantity: 1,
        }]));
        assert!(matches!(result, Err(AppError::GatewaySync(_))));
    }

    #[test]
    fn api_base_trailing_slash_is_ignored() {
        let base = Url::parse("https://gateway.test/v1/").unwrap();
        let client =
            StripeGatewayClient::new(SecretString::from("sk_test_x"), &base, Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.url("subscriptions"), "https://gateway.test/v1/subscriptions");
    }

    #[test]
    fn error_body_message_is_surfaced() {
        let body = r#"{"error":{"type":"invalid_request_error","message":"No such price"}}"#;
        let parsed: StripeErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error.message.as_deref(), Some("No such price"));
    }
}
