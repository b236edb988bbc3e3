//! PayPal order creation
//!
//! Orders are created with a client-credentials token and returned to the
//! browser for approval. Nothing is persisted and capture happens outside
//! this service.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::http_client;
use crate::config::PaypalConfig;
use crate::error::{BillingError, BillingResult};
use crate::money::UsdCents;

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Link {
    rel: String,
    href: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    #[serde(default)]
    links: Vec<Link>,
}

/// A created PayPal order awaiting buyer approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaypalOrder {
    pub id: String,
    pub approve_url: Option<String>,
}

pub struct PaypalClient {
    http: reqwest::Client,
    config: PaypalConfig,
}

impl PaypalClient {
    pub fn new(config: PaypalConfig, timeout: Duration) -> BillingResult<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            config,
        })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    async fn access_token(&self) -> BillingResult<String> {
        let resp = self
            .http
            .post(format!("{}/v1/oauth2/token", self.base_url()))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(|e| BillingError::Paypal(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            tracing::error!(status, "PayPal token request rejected");
            return Err(BillingError::PaypalAuth(format!("HTTP {}", status)));
        }

        let token: AccessToken = resp
            .json()
            .await
            .map_err(|e| BillingError::PaypalAuth(e.to_string()))?;
        Ok(token.access_token)
    }

    /// Create a CAPTURE order for `amount`
    pub async fn create_order(
        &self,
        amount: UsdCents,
        currency: &str,
        description: &str,
    ) -> BillingResult<PaypalOrder> {
        let token = self.access_token().await?;

        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "amount": {
                    "currency_code": currency,
                    "value": format!("{}.{:02}", amount.0 / 100, amount.0 % 100),
                },
                "description": description,
            }],
            "application_context": {
                "return_url": self.config.return_url,
                "cancel_url": self.config.cancel_url,
            },
        });

        let resp = self
            .http
            .post(format!("{}/v2/checkout/orders", self.base_url()))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| BillingError::Paypal(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BillingError::Paypal(e.to_string()))?;

        if !status.is_success() {
            tracing::error!(status = status.as_u16(), body = %text, "PayPal order creation failed");
            return Err(BillingError::PaypalCreate(format!("HTTP {}", status.as_u16())));
        }

        let order: OrderResponse = serde_json::from_str(&text)
            .map_err(|e| BillingError::Paypal(format!("invalid order response: {}", e)))?;

        let approve_url = order
            .links
            .into_iter()
            .find(|link| link.rel == "approve")
            .map(|link| link.href);

        tracing::info!(paypal_order_id = %order.id, amount = %amount, "PayPal order created");

        Ok(PaypalOrder {
            id: order.id,
            approve_url,
        })
    }
}
