//! Xendit hosted invoices

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use super::{
    http_client, CheckoutRequest, CheckoutSession, InvoiceCallback, PaymentGateway, ProviderUpdate,
    WebhookRequest,
};
use crate::config::XenditConfig;
use crate::error::{BillingError, BillingResult};
use crate::orders::Gateway;

#[derive(Debug, Serialize)]
struct CreateInvoiceBody<'a> {
    external_id: &'a str,
    amount: i64,
    payer_email: &'a str,
    description: &'a str,
    should_send_email: bool,
}

#[derive(Debug, Deserialize)]
struct InvoiceResponse {
    invoice_url: String,
}

pub struct XenditGateway {
    http: reqwest::Client,
    config: XenditConfig,
}

impl XenditGateway {
    pub fn new(config: XenditConfig, timeout: Duration) -> BillingResult<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            config,
        })
    }

    /// Constant-time comparison against the configured callback token.
    /// An unset token rejects everything.
    fn token_matches(&self, presented: Option<&str>) -> bool {
        let expected = self.config.callback_token.as_bytes();
        match presented {
            Some(token) if !expected.is_empty() => token.as_bytes().ct_eq(expected).into(),
            _ => false,
        }
    }
}

#[async_trait]
impl PaymentGateway for XenditGateway {
    fn gateway(&self) -> Gateway {
        Gateway::Invoice
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> BillingResult<CheckoutSession> {
        let url = format!("{}/v2/invoices", self.config.base_url.trim_end_matches('/'));
        let body = CreateInvoiceBody {
            external_id: &request.order_id,
            amount: request.amount.0,
            payer_email: &request.email,
            description: &request.description,
            should_send_email: true,
        };

        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.config.secret_key, Some(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| BillingError::Xendit(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BillingError::Xendit(e.to_string()))?;

        if !status.is_success() {
            tracing::error!(
                order_id = %request.order_id,
                status = status.as_u16(),
                body = %text,
                "Xendit invoice creation failed"
            );
            return Err(BillingError::Xendit(format!("HTTP {}", status.as_u16())));
        }

        let invoice: InvoiceResponse = serde_json::from_str(&text)
            .map_err(|e| BillingError::Xendit(format!("invalid invoice response: {}", e)))?;

        tracing::info!(order_id = %request.order_id, amount = request.amount.0, "Xendit invoice created");

        Ok(CheckoutSession {
            redirect_url: invoice.invoice_url,
            token: None,
        })
    }

    async fn verify_webhook(&self, request: WebhookRequest<'_>) -> BillingResult<ProviderUpdate> {
        if !self.token_matches(request.callback_token) {
            tracing::warn!("Rejected Xendit callback with invalid token");
            return Err(BillingError::Unauthorized);
        }

        let body: serde_json::Value = serde_json::from_str(request.body)
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;

        Ok(ProviderUpdate::Invoice(InvoiceCallback::from_json(&body)))
    }

    async fn fetch_status(&self, _order_id: &str) -> BillingResult<ProviderUpdate> {
        // invoices reconcile from callbacks only
        Err(BillingError::Unsupported("xendit status polling"))
    }
}
