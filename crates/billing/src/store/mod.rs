//! Billing persistence
//!
//! Every billing service talks to a [`BillingStore`]. Production uses
//! [`PgBillingStore`]; tests and local runs use [`InMemoryBillingStore`].
//!
//! Order state changes go through [`BillingStore::transition_order`], which
//! locks the order row and its owner, hands both to a pure decision function
//! and writes the resulting effects atomically. Two concurrent callbacks for
//! the same order are therefore serialized and the second one observes the
//! first one's writes.

mod memory;
mod postgres;

pub use memory::InMemoryBillingStore;
pub use postgres::PgBillingStore;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::coupons::{Coupon, CouponSummary, CouponUsage};
use crate::error::BillingResult;
use crate::money::Idr;
use crate::orders::{OrderStatus, PaymentLog};
use crate::plan::Plan;
use crate::pricing::Pricing;
use crate::reconciler::{ReconcileAction, RescueReview};
use crate::user::{Role, RoleSet, UserAccount};
use crate::webhook_log::WebhookLogEntry;

/// New role set and expiry for an order's owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserUpdate {
    pub roles: RoleSet,
    pub subscription_expires_at: Option<OffsetDateTime>,
}

/// Writes decided for one locked order row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderEffects {
    pub action: ReconcileAction,
    pub status: Option<OrderStatus>,
    pub amount: Option<Idr>,
    pub user: Option<UserUpdate>,
    /// Record a usage of the order's coupon for its owner
    pub record_coupon_usage: bool,
}

impl OrderEffects {
    /// Leave the row untouched
    pub fn none(action: ReconcileAction) -> Self {
        Self {
            action,
            status: None,
            amount: None,
            user: None,
            record_coupon_usage: false,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.status.is_none() && self.amount.is_none() && self.user.is_none() && !self.record_coupon_usage
    }
}

/// Row and owner before and after a transition
#[derive(Debug, Clone)]
pub struct AppliedTransition {
    pub before: PaymentLog,
    pub after: PaymentLog,
    pub user_before: Option<UserAccount>,
    pub user_after: Option<UserAccount>,
    pub effects: OrderEffects,
    /// False when the usage already existed or the coupon is gone
    pub coupon_usage_recorded: bool,
}

/// Pure decision over a locked order row and its owner
pub type DecideFn<'a> = dyn Fn(&PaymentLog, Option<&UserAccount>) -> OrderEffects + Send + Sync + 'a;

#[async_trait]
pub trait BillingStore: Send + Sync {
    // Pricing

    /// Insert default rows for plans that have none. Existing rows are kept.
    async fn seed_pricing(&self, defaults: &[Pricing]) -> BillingResult<()>;
    async fn list_pricing(&self) -> BillingResult<Vec<Pricing>>;
    async fn find_pricing(&self, plan: Plan) -> BillingResult<Option<Pricing>>;
    async fn upsert_pricing(&self, rows: &[Pricing]) -> BillingResult<()>;
    /// Set every row's current prices to its original prices
    async fn reset_pricing(&self) -> BillingResult<()>;

    // Coupons

    async fn find_coupon(&self, code: &str) -> BillingResult<Option<Coupon>>;
    /// Delete any coupon with the same code (and its usages), then insert
    async fn replace_coupon(&self, coupon: &Coupon) -> BillingResult<()>;
    /// Returns whether a coupon was deleted
    async fn delete_coupon(&self, code: &str) -> BillingResult<bool>;
    /// Coupons with `expires_at > now`, newest first
    async fn list_active_coupons(&self, now: OffsetDateTime) -> BillingResult<Vec<CouponSummary>>;
    async fn find_active_usage(
        &self,
        code: &str,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> BillingResult<Option<CouponUsage>>;
    /// Returns false when a usage for `(code, user)` already exists
    async fn insert_coupon_usage(&self, usage: &CouponUsage) -> BillingResult<bool>;
    async fn list_coupon_usages(&self) -> BillingResult<Vec<CouponUsage>>;

    // Orders

    async fn insert_order(&self, order: &PaymentLog) -> BillingResult<()>;
    /// Returns false when the order id is already taken
    async fn insert_order_if_absent(&self, order: &PaymentLog) -> BillingResult<bool>;
    /// Insert a checkout's PENDING order unless its owner already holds a
    /// PENDING, CHALLENGE or PAID order carrying the same stored coupon
    /// created since that coupon was (re)created. Returns false when blocked.
    /// Checkouts carrying the same coupon are serialized.
    async fn insert_checkout_order(&self, order: &PaymentLog) -> BillingResult<bool>;
    /// Remove a PENDING order whose provider checkout could not be created
    async fn discard_pending_order(&self, order_id: &str) -> BillingResult<()>;
    async fn find_order(&self, order_id: &str) -> BillingResult<Option<PaymentLog>>;
    async fn list_orders_by_status(&self, status: OrderStatus) -> BillingResult<Vec<PaymentLog>>;
    /// Non-PAID orders created after `since`
    async fn list_unpaid_orders_since(&self, since: OffsetDateTime) -> BillingResult<Vec<PaymentLog>>;
    /// Lock the order and its owner, decide, and apply the effects atomically.
    /// Returns `None` when the order does not exist.
    async fn transition_order(
        &self,
        order_id: &str,
        decide: &DecideFn<'_>,
    ) -> BillingResult<Option<AppliedTransition>>;

    // Users

    async fn find_user(&self, id: Uuid) -> BillingResult<Option<UserAccount>>;
    async fn find_user_by_email(&self, email: &str) -> BillingResult<Option<UserAccount>>;
    async fn list_users_with_role(&self, role: Role) -> BillingResult<Vec<UserAccount>>;

    // Audit trails

    async fn append_webhook_log(&self, entry: &WebhookLogEntry) -> BillingResult<()>;
    async fn insert_rescue_review(&self, review: &RescueReview) -> BillingResult<()>;
    async fn list_rescue_reviews(&self) -> BillingResult<Vec<RescueReview>>;
}
