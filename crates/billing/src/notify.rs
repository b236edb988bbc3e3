//! Best-effort payment audit lines posted to a chat webhook
//!
//! Delivery never fails the caller: errors are retried a couple of times
//! and then logged.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::error::BillingResult;
use crate::orders::OrderStatus;
use crate::providers::{http_client, InvoiceCallback, SnapStatus};

const MAX_RETRIES: usize = 2;
const MAX_RETRY_DELAY: Duration = Duration::from_secs(2);

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Posts `{"content": message}` to a Discord incoming webhook
pub struct DiscordNotifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> BillingResult<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            webhook_url: webhook_url.into(),
        })
    }

    async fn post_once(&self, message: &str) -> Result<(), String> {
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&json!({ "content": message }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(format!("HTTP {}: {}", status, body))
        }
    }
}

#[async_trait]
impl NotificationSink for DiscordNotifier {
    async fn notify(&self, message: &str) {
        let strategy = ExponentialBackoff::from_millis(100)
            .max_delay(MAX_RETRY_DELAY)
            .map(jitter)
            .take(MAX_RETRIES);

        match Retry::spawn(strategy, || self.post_once(message)).await {
            Ok(()) => tracing::debug!("Discord notification sent"),
            Err(e) => tracing::warn!(error = %e, "Discord notification failed"),
        }
    }
}

/// Used when no webhook URL is configured
pub struct NoopNotifier;

#[async_trait]
impl NotificationSink for NoopNotifier {
    async fn notify(&self, message: &str) {
        tracing::trace!(message = %message, "Notification dropped (no sink configured)");
    }
}

/// Multi-line summary of an invoice callback
pub fn invoice_message(cb: &InvoiceCallback) -> String {
    let dash = |v: Option<&str>| v.unwrap_or("-").to_string();
    let amount = cb.amount.unwrap_or_default();

    let mut lines = vec![
        format!("Xendit Invoice: {}", dash(cb.invoice_id.as_deref())),
        format!(
            "External ID: {}",
            dash(cb.external_id.as_deref().or(cb.invoice_id.as_deref()))
        ),
        format!("Status: {}", if cb.status.is_empty() { "-" } else { &cb.status }),
        format!("Amount: {}", amount),
        format!("Payer: {}", dash(cb.payer_email.as_deref())),
    ];

    let optional = [
        ("Payment ID", &cb.payment_id),
        ("VA Account", &cb.account_number),
        ("Bank", &cb.bank_code),
        ("Merchant", &cb.merchant_code),
        ("Timestamp", &cb.transaction_timestamp),
    ];
    lines.extend(
        optional
            .into_iter()
            .filter_map(|(label, value)| value.as_ref().map(|v| format!("{}: {}", label, v))),
    );

    lines.join("\n")
}

/// One-line summary of a Snap status update
pub fn snap_message(st: &SnapStatus, status: OrderStatus) -> String {
    format!(
        "Midtrans Update: {} - {} ({})",
        st.order_id,
        status.as_str(),
        st.transaction_status
    )
}
