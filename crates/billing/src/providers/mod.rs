//! Payment provider clients
//!
//! Each hosted-checkout provider implements [`PaymentGateway`]: create a
//! checkout, authenticate an inbound callback, and (where the provider
//! supports it) fetch the canonical status of an order. Callbacks and status
//! documents are normalized into [`ProviderUpdate`] for the reconciler.

mod midtrans;
mod paypal;
mod xendit;

pub use midtrans::MidtransGateway;
pub use paypal::{PaypalClient, PaypalOrder};
pub use xendit::XenditGateway;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{BillingError, BillingResult};
use crate::money::Idr;
use crate::orders::{Gateway, OrderStatus};

/// Input for a hosted checkout
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub order_id: String,
    pub amount: Idr,
    pub email: String,
    pub description: String,
}

/// Where to send the payer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub redirect_url: String,
    /// Snap token for the embedded payment popup
    pub token: Option<String>,
}

/// An inbound provider callback before authentication
#[derive(Debug, Clone, Copy)]
pub struct WebhookRequest<'a> {
    /// `x-callback-token` header, when present
    pub callback_token: Option<&'a str>,
    pub body: &'a str,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn gateway(&self) -> Gateway;

    async fn create_checkout(&self, request: &CheckoutRequest) -> BillingResult<CheckoutSession>;

    /// Authenticate a callback and return the update it carries.
    /// Authentication failures return [`BillingError::Unauthorized`].
    async fn verify_webhook(&self, request: WebhookRequest<'_>) -> BillingResult<ProviderUpdate>;

    /// Query the provider for the current state of an order
    async fn fetch_status(&self, order_id: &str) -> BillingResult<ProviderUpdate>;
}

/// Invoice provider callback body. Fields may sit at the top level or under `data`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceCallback {
    pub event: String,
    pub status: String,
    pub external_id: Option<String>,
    pub invoice_id: Option<String>,
    pub amount: Option<Idr>,
    pub payer_email: Option<String>,
    pub payment_id: Option<String>,
    pub account_number: Option<String>,
    pub bank_code: Option<String>,
    pub merchant_code: Option<String>,
    pub transaction_timestamp: Option<String>,
}

impl InvoiceCallback {
    pub fn from_json(body: &Value) -> Self {
        let field = |name: &str| -> Option<&Value> {
            body.get(name)
                .filter(|v| !v.is_null())
                .or_else(|| body.get("data").and_then(|d| d.get(name)))
                .filter(|v| !v.is_null())
        };
        let text = |name: &str| -> Option<String> {
            field(name)
                .and_then(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
        };

        Self {
            event: text("event").unwrap_or_default(),
            status: text("status").unwrap_or_default(),
            external_id: text("external_id"),
            invoice_id: text("id"),
            amount: field("amount").and_then(Idr::from_json),
            payer_email: text("payer_email"),
            payment_id: text("payment_id"),
            account_number: text("account_number"),
            bank_code: text("bank_code"),
            merchant_code: text("merchant_code"),
            transaction_timestamp: text("transaction_timestamp"),
        }
    }

    pub fn classify(&self) -> OrderStatus {
        let event = self.event.to_lowercase();
        let status = self.status.to_uppercase();
        if event == "invoice.paid" || matches!(status.as_str(), "PAID" | "SETTLED" | "SUCCEEDED" | "SUCCESS") {
            OrderStatus::Paid
        } else if event == "invoice.expired" || status == "EXPIRED" {
            OrderStatus::Expired
        } else {
            OrderStatus::Pending
        }
    }
}

/// Snap transaction status document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapStatus {
    pub order_id: String,
    pub transaction_status: String,
    pub fraud_status: Option<String>,
    pub status_code: Option<String>,
    pub gross_amount: Option<Idr>,
    pub payment_type: Option<String>,
    pub transaction_id: Option<String>,
}

impl SnapStatus {
    pub fn from_json(body: &Value) -> BillingResult<Self> {
        let text = |name: &str| body.get(name).and_then(Value::as_str).map(str::to_string);
        let order_id = text("order_id")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BillingError::InvalidPayload("missing order_id".into()))?;

        Ok(Self {
            order_id,
            transaction_status: text("transaction_status").unwrap_or_default(),
            fraud_status: text("fraud_status"),
            status_code: text("status_code"),
            gross_amount: body.get("gross_amount").and_then(Idr::from_json),
            payment_type: text("payment_type"),
            transaction_id: text("transaction_id"),
        })
    }

    pub fn classify(&self) -> OrderStatus {
        let fraud = self.fraud_status.as_deref().unwrap_or_default();
        match self.transaction_status.as_str() {
            "capture" if fraud == "challenge" => OrderStatus::Challenge,
            "capture" if fraud == "accept" => OrderStatus::Paid,
            "settlement" => OrderStatus::Paid,
            "expire" => OrderStatus::Expired,
            "cancel" | "deny" => OrderStatus::Failed,
            _ => OrderStatus::Pending,
        }
    }
}

/// A provider-reported state for one order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderUpdate {
    Invoice(InvoiceCallback),
    Snap(SnapStatus),
}

impl ProviderUpdate {
    pub fn gateway(&self) -> Gateway {
        match self {
            ProviderUpdate::Invoice(_) => Gateway::Invoice,
            ProviderUpdate::Snap(_) => Gateway::Snap,
        }
    }

    /// Internal status the provider state maps to
    pub fn classify(&self) -> OrderStatus {
        match self {
            ProviderUpdate::Invoice(cb) => cb.classify(),
            ProviderUpdate::Snap(st) => st.classify(),
        }
    }

    pub fn order_id(&self) -> Option<&str> {
        match self {
            ProviderUpdate::Invoice(cb) => cb.external_id.as_deref().or(cb.invoice_id.as_deref()),
            ProviderUpdate::Snap(st) => Some(st.order_id.as_str()),
        }
    }

    pub fn amount(&self) -> Option<Idr> {
        match self {
            ProviderUpdate::Invoice(cb) => cb.amount,
            ProviderUpdate::Snap(st) => st.gross_amount,
        }
    }

    pub fn payer_email(&self) -> Option<&str> {
        match self {
            ProviderUpdate::Invoice(cb) => cb.payer_email.as_deref(),
            ProviderUpdate::Snap(_) => None,
        }
    }

    /// Raw provider status string
    pub fn provider_status(&self) -> &str {
        match self {
            ProviderUpdate::Invoice(cb) => &cb.status,
            ProviderUpdate::Snap(st) => &st.transaction_status,
        }
    }

    /// Event name for the webhook log
    pub fn event_name(&self) -> String {
        match self {
            ProviderUpdate::Invoice(cb) if !cb.event.is_empty() => cb.event.clone(),
            ProviderUpdate::Invoice(cb) if !cb.status.is_empty() => {
                format!("invoice.{}", cb.status.to_lowercase())
            }
            ProviderUpdate::Invoice(_) => "invoice.unknown".to_string(),
            ProviderUpdate::Snap(st) => format!("midtrans.{}", st.transaction_status),
        }
    }
}

pub(crate) fn http_client(timeout: Duration) -> BillingResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| BillingError::Internal(format!("failed to build HTTP client: {}", e)))
}
