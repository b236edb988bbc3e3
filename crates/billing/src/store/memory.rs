//! In-memory billing store
//!
//! All state sits behind one async mutex, so every operation (including
//! `transition_order`) is serialized exactly like a row-locked transaction.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{AppliedTransition, BillingStore, DecideFn};
use crate::coupons::{Coupon, CouponSummary, CouponUsage};
use crate::error::{BillingError, BillingResult};
use crate::orders::{OrderStatus, PaymentLog};
use crate::plan::Plan;
use crate::pricing::Pricing;
use crate::reconciler::RescueReview;
use crate::user::{Role, UserAccount};
use crate::webhook_log::WebhookLogEntry;

#[derive(Default)]
struct Inner {
    pricing: BTreeMap<Plan, Pricing>,
    coupons: HashMap<String, Coupon>,
    usages: Vec<CouponUsage>,
    orders: HashMap<String, PaymentLog>,
    users: HashMap<Uuid, UserAccount>,
    webhook_logs: Vec<WebhookLogEntry>,
    rescue_reviews: Vec<RescueReview>,
}

#[derive(Default)]
pub struct InMemoryBillingStore {
    inner: Mutex<Inner>,
    fail_webhook_logs: AtomicBool,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user
    pub async fn insert_user(&self, user: UserAccount) {
        self.inner.lock().await.users.insert(user.id, user);
    }

    pub async fn user(&self, id: Uuid) -> Option<UserAccount> {
        self.inner.lock().await.users.get(&id).cloned()
    }

    pub async fn order(&self, order_id: &str) -> Option<PaymentLog> {
        self.inner.lock().await.orders.get(order_id).cloned()
    }

    pub async fn webhook_logs(&self) -> Vec<WebhookLogEntry> {
        self.inner.lock().await.webhook_logs.clone()
    }

    /// Make `append_webhook_log` fail, to exercise best-effort logging
    pub fn set_fail_webhook_logs(&self, fail: bool) {
        self.fail_webhook_logs.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn seed_pricing(&self, defaults: &[Pricing]) -> BillingResult<()> {
        let mut inner = self.inner.lock().await;
        for row in defaults {
            inner.pricing.entry(row.plan).or_insert(*row);
        }
        Ok(())
    }

    async fn list_pricing(&self) -> BillingResult<Vec<Pricing>> {
        Ok(self.inner.lock().await.pricing.values().copied().collect())
    }

    async fn find_pricing(&self, plan: Plan) -> BillingResult<Option<Pricing>> {
        Ok(self.inner.lock().await.pricing.get(&plan).copied())
    }

    async fn upsert_pricing(&self, rows: &[Pricing]) -> BillingResult<()> {
        let mut inner = self.inner.lock().await;
        for row in rows {
            inner.pricing.insert(row.plan, *row);
        }
        Ok(())
    }

    async fn reset_pricing(&self) -> BillingResult<()> {
        let mut inner = self.inner.lock().await;
        for row in inner.pricing.values_mut() {
            row.current_usd = row.original_usd;
            row.current_idr = row.original_idr;
        }
        Ok(())
    }

    async fn find_coupon(&self, code: &str) -> BillingResult<Option<Coupon>> {
        Ok(self.inner.lock().await.coupons.get(code).cloned())
    }

    async fn replace_coupon(&self, coupon: &Coupon) -> BillingResult<()> {
        let mut inner = self.inner.lock().await;
        inner.usages.retain(|u| u.code != coupon.code);
        inner.coupons.insert(coupon.code.clone(), coupon.clone());
        Ok(())
    }

    async fn delete_coupon(&self, code: &str) -> BillingResult<bool> {
        let mut inner = self.inner.lock().await;
        inner.usages.retain(|u| u.code != code);
        Ok(inner.coupons.remove(code).is_some())
    }

    async fn list_active_coupons(&self, now: OffsetDateTime) -> BillingResult<Vec<CouponSummary>> {
        let inner = self.inner.lock().await;
        let mut list: Vec<CouponSummary> = inner
            .coupons
            .values()
            .filter(|c| c.is_active(now))
            .map(|c| CouponSummary {
                coupon: c.clone(),
                usage_count: inner
                    .usages
                    .iter()
                    .filter(|u| u.code == c.code && u.expires_at > now)
                    .count() as i64,
            })
            .collect();
        list.sort_by(|a, b| b.coupon.created_at.cmp(&a.coupon.created_at));
        Ok(list)
    }

    async fn find_active_usage(
        &self,
        code: &str,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> BillingResult<Option<CouponUsage>> {
        Ok(self
            .inner
            .lock()
            .await
            .usages
            .iter()
            .find(|u| u.code == code && u.user_id == user_id && u.expires_at > now)
            .cloned())
    }

    async fn insert_coupon_usage(&self, usage: &CouponUsage) -> BillingResult<bool> {
        let mut inner = self.inner.lock().await;
        if !inner.coupons.contains_key(&usage.code) {
            return Err(BillingError::InvalidCode);
        }
        if inner
            .usages
            .iter()
            .any(|u| u.code == usage.code && u.user_id == usage.user_id)
        {
            return Ok(false);
        }
        inner.usages.push(usage.clone());
        Ok(true)
    }

    async fn list_coupon_usages(&self) -> BillingResult<Vec<CouponUsage>> {
        Ok(self.inner.lock().await.usages.clone())
    }

    async fn insert_order(&self, order: &PaymentLog) -> BillingResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.orders.contains_key(&order.order_id) {
            return Err(BillingError::Database(format!(
                "duplicate order id {}",
                order.order_id
            )));
        }
        inner.orders.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn insert_order_if_absent(&self, order: &PaymentLog) -> BillingResult<bool> {
        let mut inner = self.inner.lock().await;
        if inner.orders.contains_key(&order.order_id) {
            return Ok(false);
        }
        inner.orders.insert(order.order_id.clone(), order.clone());
        Ok(true)
    }

    async fn insert_checkout_order(&self, order: &PaymentLog) -> BillingResult<bool> {
        let mut inner = self.inner.lock().await;
        if inner.orders.contains_key(&order.order_id) {
            return Err(BillingError::Database(format!(
                "duplicate order id {}",
                order.order_id
            )));
        }

        let coupon_since = order
            .coupon_code
            .as_deref()
            .and_then(|code| inner.coupons.get(code))
            .map(|coupon| coupon.created_at);
        if let Some(since) = coupon_since {
            let held = inner.orders.values().any(|o| {
                o.user_id == order.user_id
                    && o.coupon_code == order.coupon_code
                    && o.status.holds_coupon()
                    && o.created_at >= since
            });
            if held {
                return Ok(false);
            }
        }

        inner.orders.insert(order.order_id.clone(), order.clone());
        Ok(true)
    }

    async fn discard_pending_order(&self, order_id: &str) -> BillingResult<()> {
        let mut inner = self.inner.lock().await;
        if inner
            .orders
            .get(order_id)
            .is_some_and(|o| o.status == OrderStatus::Pending)
        {
            inner.orders.remove(order_id);
        }
        Ok(())
    }

    async fn find_order(&self, order_id: &str) -> BillingResult<Option<PaymentLog>> {
        Ok(self.inner.lock().await.orders.get(order_id).cloned())
    }

    async fn list_orders_by_status(&self, status: OrderStatus) -> BillingResult<Vec<PaymentLog>> {
        let inner = self.inner.lock().await;
        let mut list: Vec<PaymentLog> = inner
            .orders
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(list)
    }

    async fn list_unpaid_orders_since(&self, since: OffsetDateTime) -> BillingResult<Vec<PaymentLog>> {
        let inner = self.inner.lock().await;
        let mut list: Vec<PaymentLog> = inner
            .orders
            .values()
            .filter(|o| o.status != OrderStatus::Paid && o.created_at > since)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(list)
    }

    async fn transition_order(
        &self,
        order_id: &str,
        decide: &DecideFn<'_>,
    ) -> BillingResult<Option<AppliedTransition>> {
        let mut inner = self.inner.lock().await;

        let Some(before) = inner.orders.get(order_id).cloned() else {
            return Ok(None);
        };
        let user_before = inner.users.get(&before.user_id).cloned();

        let effects = decide(&before, user_before.as_ref());

        let mut after = before.clone();
        if let Some(status) = effects.status {
            after.status = status;
        }
        if let Some(amount) = effects.amount {
            after.amount = amount;
        }

        let mut user_after = user_before.clone();
        if let (Some(update), Some(user)) = (&effects.user, user_after.as_mut()) {
            user.roles = update.roles.clone();
            user.subscription_expires_at = update.subscription_expires_at;
        }

        let mut coupon_usage_recorded = false;
        if effects.record_coupon_usage {
            if let Some(code) = &before.coupon_code {
                let expires_at = inner.coupons.get(code).map(|c| c.expires_at);
                let exists = inner
                    .usages
                    .iter()
                    .any(|u| &u.code == code && u.user_id == before.user_id);
                if let (Some(expires_at), false) = (expires_at, exists) {
                    inner.usages.push(CouponUsage {
                        code: code.clone(),
                        user_id: before.user_id,
                        expires_at,
                    });
                    coupon_usage_recorded = true;
                }
            }
        }

        inner.orders.insert(after.order_id.clone(), after.clone());
        if let Some(user) = &user_after {
            inner.users.insert(user.id, user.clone());
        }

        Ok(Some(AppliedTransition {
            before,
            after,
            user_before,
            user_after,
            effects,
            coupon_usage_recorded,
        }))
    }

    async fn find_user(&self, id: Uuid) -> BillingResult<Option<UserAccount>> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> BillingResult<Option<UserAccount>> {
        Ok(self
            .inner
            .lock()
            .await
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_users_with_role(&self, role: Role) -> BillingResult<Vec<UserAccount>> {
        Ok(self
            .inner
            .lock()
            .await
            .users
            .values()
            .filter(|u| u.roles.contains(role))
            .cloned()
            .collect())
    }

    async fn append_webhook_log(&self, entry: &WebhookLogEntry) -> BillingResult<()> {
        if self.fail_webhook_logs.load(Ordering::SeqCst) {
            return Err(BillingError::Database("webhook_logs unavailable".into()));
        }
        self.inner.lock().await.webhook_logs.push(entry.clone());
        Ok(())
    }

    async fn insert_rescue_review(&self, review: &RescueReview) -> BillingResult<()> {
        self.inner.lock().await.rescue_reviews.push(review.clone());
        Ok(())
    }

    async fn list_rescue_reviews(&self) -> BillingResult<Vec<RescueReview>> {
        Ok(self.inner.lock().await.rescue_reviews.clone())
    }
}
