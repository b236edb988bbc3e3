// Billing crate clippy configuration
#![allow(clippy::result_large_err)] // BillingError carries provider messages
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Trading Journal Billing Module
//!
//! Subscription and payment lifecycle for the journal backend.
//!
//! ## Features
//!
//! - **Pricing**: Per-plan USD/IDR price book, seeded with defaults
//! - **Coupons**: Percent or amount-off codes with single use per user
//! - **Checkout**: Xendit invoices, Midtrans Snap and PayPal orders
//! - **Reconciliation**: Idempotent webhook and status-poll processing
//! - **Subscriptions**: Role grants and calendar-month expiry extension
//! - **Audit**: Raw webhook log, rescue reviews and chat notifications
//! - **Invariants**: Read-only consistency checks

pub mod checkout;
pub mod config;
pub mod coupons;
pub mod error;
pub mod invariants;
pub mod money;
pub mod notify;
pub mod orders;
pub mod plan;
pub mod pricing;
pub mod providers;
pub mod reconciler;
pub mod store;
pub mod subscriptions;
pub mod user;
pub mod webhook_log;
pub mod webhooks;


// Checkout
pub use checkout::{CheckoutInput, CheckoutOrder, CheckoutService, PaypalInput};

// Config
pub use config::{BillingConfig, MidtransConfig, PaypalConfig, StaticCode, XenditConfig};

// Coupons
pub use coupons::{Coupon, CouponStore, CouponSummary, CouponUsage, NewCoupon, Quote};

// Error
pub use error::{BillingError, BillingResult};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Money
pub use money::{Idr, UsdCents, AMOUNT_TOLERANCE_IDR, IDR_PER_USD};

// Notifications
pub use notify::{DiscordNotifier, NoopNotifier, NotificationSink};

// Orders
pub use orders::{Gateway, OrderStatus, PaymentLog};

// Plans and pricing
pub use plan::Plan;
pub use pricing::{PriceBook, Pricing, PricingUpdate};

// Providers
pub use providers::{
    CheckoutSession, MidtransGateway, PaymentGateway, PaypalClient, PaypalOrder, ProviderUpdate,
    XenditGateway,
};

// Reconciliation
pub use reconciler::{ReconcileAction, ReconcileOutcome, Reconciler, RescueReview, SweepReport};

// Storage
pub use store::{BillingStore, InMemoryBillingStore, PgBillingStore};

// Subscriptions
pub use subscriptions::SubscriptionMutator;

// Users
pub use user::{Role, RoleSet, UserAccount};

// Webhooks
pub use webhook_log::{WebhookLog, WebhookLogEntry};
pub use webhooks::WebhookHandler;

use std::sync::Arc;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub store: Arc<dyn BillingStore>,
    pub prices: Arc<PriceBook>,
    pub coupons: Arc<CouponStore>,
    pub checkout: CheckoutService,
    pub reconciler: Arc<Reconciler>,
    pub webhooks: WebhookHandler,
    pub invariants: InvariantChecker,
    snap: Arc<dyn PaymentGateway>,
}

impl BillingService {
    /// Create a billing service talking to the configured providers
    pub fn new(store: Arc<dyn BillingStore>, config: &BillingConfig) -> BillingResult<Self> {
        let invoice: Arc<dyn PaymentGateway> =
            Arc::new(XenditGateway::new(config.xendit.clone(), config.provider_timeout)?);
        let snap: Arc<dyn PaymentGateway> =
            Arc::new(MidtransGateway::new(config.midtrans.clone(), config.provider_timeout)?);

        let notifier: Arc<dyn NotificationSink> = match &config.discord_webhook_url {
            Some(url) => Arc::new(DiscordNotifier::new(url.clone(), config.provider_timeout)?),
            None => {
                tracing::info!("DISCORD_WEBHOOK_URL not set - payment notifications disabled");
                Arc::new(NoopNotifier)
            }
        };

        Self::with_gateways(store, config, invoice, snap, notifier)
    }

    /// Create a billing service with explicit gateways and notification sink
    pub fn with_gateways(
        store: Arc<dyn BillingStore>,
        config: &BillingConfig,
        invoice: Arc<dyn PaymentGateway>,
        snap: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationSink>,
    ) -> BillingResult<Self> {
        let paypal = Arc::new(PaypalClient::new(config.paypal.clone(), config.provider_timeout)?);

        let prices = Arc::new(PriceBook::new(store.clone()));
        let coupons = Arc::new(CouponStore::new(
            store.clone(),
            prices.clone(),
            config.static_codes.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(store.clone(), notifier, prices.clone()));

        Ok(Self {
            checkout: CheckoutService::new(
                store.clone(),
                coupons.clone(),
                invoice.clone(),
                snap.clone(),
                paypal,
            ),
            webhooks: WebhookHandler::new(
                invoice,
                snap.clone(),
                WebhookLog::new(store.clone()),
                reconciler.clone(),
            ),
            invariants: InvariantChecker::new(store.clone()),
            store,
            prices,
            coupons,
            reconciler,
            snap,
        })
    }

    /// Re-poll every PENDING Snap order
    pub async fn sweep_pending_snap(&self) -> BillingResult<SweepReport> {
        self.reconciler.sweep_pending(self.snap.as_ref()).await
    }
}
