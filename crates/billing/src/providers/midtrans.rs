//! Midtrans Snap checkout

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

use super::{
    http_client, CheckoutRequest, CheckoutSession, PaymentGateway, ProviderUpdate, SnapStatus,
    WebhookRequest,
};
use crate::config::MidtransConfig;
use crate::error::{BillingError, BillingResult};
use crate::orders::Gateway;

#[derive(Debug, Deserialize)]
struct SnapTransaction {
    token: String,
    redirect_url: String,
}

pub struct MidtransGateway {
    http: reqwest::Client,
    config: MidtransConfig,
}

impl MidtransGateway {
    pub fn new(config: MidtransConfig, timeout: Duration) -> BillingResult<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            config,
        })
    }

    /// Browser-side key returned alongside the Snap token
    pub fn client_key(&self) -> &str {
        &self.config.client_key
    }

    pub fn is_production(&self) -> bool {
        self.config.is_production
    }

    fn ensure_configured(&self) -> BillingResult<()> {
        if self.config.is_configured() {
            Ok(())
        } else {
            tracing::error!("Midtrans server key missing");
            Err(BillingError::MidtransConfig)
        }
    }

    /// Hex SHA-512 over `order_id || status_code || gross_amount || server_key`
    fn signature_for(&self, order_id: &str, status_code: &str, gross_amount: &str) -> String {
        let mut hasher = Sha512::new();
        hasher.update(order_id.as_bytes());
        hasher.update(status_code.as_bytes());
        hasher.update(gross_amount.as_bytes());
        hasher.update(self.config.server_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn verify_signature(&self, body: &Value) -> bool {
        let field = |name: &str| body.get(name).and_then(Value::as_str).unwrap_or_default();
        let presented = field("signature_key");
        if presented.is_empty() {
            return false;
        }
        let expected = self.signature_for(field("order_id"), field("status_code"), field("gross_amount"));
        presented
            .to_lowercase()
            .as_bytes()
            .ct_eq(expected.as_bytes())
            .into()
    }
}

#[async_trait]
impl PaymentGateway for MidtransGateway {
    fn gateway(&self) -> Gateway {
        Gateway::Snap
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> BillingResult<CheckoutSession> {
        self.ensure_configured()?;

        let url = format!(
            "{}/snap/v1/transactions",
            self.config.snap_base_url.trim_end_matches('/')
        );
        let body = json!({
            "transaction_details": {
                "order_id": request.order_id,
                "gross_amount": request.amount.0,
            },
            "credit_card": { "secure": true },
            "customer_details": { "email": request.email },
        });

        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.config.server_key, Some(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| BillingError::Midtrans(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BillingError::Midtrans(e.to_string()))?;

        if !status.is_success() {
            tracing::error!(
                order_id = %request.order_id,
                status = status.as_u16(),
                body = %text,
                "Snap transaction creation failed"
            );
            return Err(BillingError::Midtrans(format!("HTTP {}", status.as_u16())));
        }

        let transaction: SnapTransaction = serde_json::from_str(&text)
            .map_err(|e| BillingError::Midtrans(format!("invalid snap response: {}", e)))?;

        tracing::info!(order_id = %request.order_id, amount = request.amount.0, "Snap transaction created");

        Ok(CheckoutSession {
            redirect_url: transaction.redirect_url,
            token: Some(transaction.token),
        })
    }

    async fn verify_webhook(&self, request: WebhookRequest<'_>) -> BillingResult<ProviderUpdate> {
        self.ensure_configured()?;

        let body: Value = serde_json::from_str(request.body)
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;

        let claimed_order_id = body.get("order_id").and_then(Value::as_str).unwrap_or_default();
        if !self.verify_signature(&body) {
            tracing::warn!(
                order_id = %claimed_order_id,
                "Rejected Midtrans notification with invalid signature"
            );
            return Err(BillingError::Unauthorized);
        }

        if claimed_order_id.is_empty() {
            return Err(BillingError::InvalidPayload("missing order_id".into()));
        }
        let order_id = claimed_order_id;

        // the notification only tells us to look; the status API is canonical
        self.fetch_status(order_id).await
    }

    async fn fetch_status(&self, order_id: &str) -> BillingResult<ProviderUpdate> {
        self.ensure_configured()?;

        let url = format!(
            "{}/v2/{}/status",
            self.config.api_base_url.trim_end_matches('/'),
            order_id
        );

        let resp = self
            .http
            .get(&url)
            .basic_auth(&self.config.server_key, Some(""))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| BillingError::Midtrans(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BillingError::Midtrans(e.to_string()))?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BillingError::OrderNotFound(order_id.to_string()));
        }
        if !status.is_success() {
            tracing::error!(order_id = %order_id, status = status.as_u16(), "Snap status query failed");
            return Err(BillingError::Midtrans(format!("HTTP {}", status.as_u16())));
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| BillingError::Midtrans(format!("invalid status response: {}", e)))?;

        // the status API reports unknown orders with HTTP 200 and a 404 body
        if body.get("status_code").and_then(Value::as_str) == Some("404") {
            return Err(BillingError::OrderNotFound(order_id.to_string()));
        }

        let snap = SnapStatus::from_json(&body)?;
        tracing::debug!(
            order_id = %snap.order_id,
            transaction_status = %snap.transaction_status,
            "Fetched Snap status"
        );
        Ok(ProviderUpdate::Snap(snap))
    }
}
