//! Raw provider callback log for forensic replay

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;

use crate::store::BillingStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookLogEntry {
    pub event: String,
    /// Callback body exactly as received
    pub payload: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub struct WebhookLog {
    store: Arc<dyn BillingStore>,
}

impl WebhookLog {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Append a callback. Failures are logged and swallowed so that
    /// reconciliation always proceeds.
    pub async fn record(&self, event: &str, payload: &str) {
        let entry = WebhookLogEntry {
            event: event.to_string(),
            payload: payload.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };

        if let Err(e) = self.store.append_webhook_log(&entry).await {
            tracing::warn!(
                event = %event,
                payload_len = payload.len(),
                error = %e,
                "Failed to persist webhook log entry"
            );
        }
    }
}
