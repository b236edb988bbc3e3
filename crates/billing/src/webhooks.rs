//! Provider webhook handling
//!
//! Authenticates inbound callbacks, appends them to the webhook log and hands
//! the normalized update to the reconciler. Status polls use the same
//! reconciliation path, so a poll and a webhook racing for one order resolve
//! to a single transition.

use std::sync::Arc;

use crate::error::BillingResult;
use crate::orders::Gateway;
use crate::providers::{PaymentGateway, WebhookRequest};
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::webhook_log::WebhookLog;

pub struct WebhookHandler {
    invoice: Arc<dyn PaymentGateway>,
    snap: Arc<dyn PaymentGateway>,
    log: WebhookLog,
    reconciler: Arc<Reconciler>,
}

impl WebhookHandler {
    pub fn new(
        invoice: Arc<dyn PaymentGateway>,
        snap: Arc<dyn PaymentGateway>,
        log: WebhookLog,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            invoice,
            snap,
            log,
            reconciler,
        }
    }

    fn gateway(&self, gateway: Gateway) -> &dyn PaymentGateway {
        match gateway {
            Gateway::Invoice => self.invoice.as_ref(),
            Gateway::Snap => self.snap.as_ref(),
        }
    }

    /// Invoice callback authenticated by the `x-callback-token` header
    pub async fn handle_xendit(
        &self,
        callback_token: Option<&str>,
        body: &str,
    ) -> BillingResult<ReconcileOutcome> {
        self.handle(
            Gateway::Invoice,
            WebhookRequest {
                callback_token,
                body,
            },
        )
        .await
    }

    /// Snap notification authenticated by its body signature
    pub async fn handle_midtrans(&self, body: &str) -> BillingResult<ReconcileOutcome> {
        self.handle(
            Gateway::Snap,
            WebhookRequest {
                callback_token: None,
                body,
            },
        )
        .await
    }

    async fn handle(&self, gateway: Gateway, request: WebhookRequest<'_>) -> BillingResult<ReconcileOutcome> {
        // rejected callbacks never reach the log
        let update = self.gateway(gateway).verify_webhook(request).await?;

        self.log.record(&update.event_name(), request.body).await;

        let outcome = self.reconciler.reconcile(&update).await?;
        tracing::info!(
            gateway = gateway.display_name(),
            order_id = ?outcome.order_id,
            action = outcome.action.as_str(),
            "Webhook processed"
        );
        Ok(outcome)
    }

    /// Fetch the provider's current status for `order_id` and reconcile it
    pub async fn poll(&self, gateway: Gateway, order_id: &str) -> BillingResult<ReconcileOutcome> {
        let update = self.gateway(gateway).fetch_status(order_id).await?;
        self.reconciler.reconcile(&update).await
    }
}
