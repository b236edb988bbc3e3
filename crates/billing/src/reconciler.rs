//! Order reconciliation
//!
//! Maps a provider-reported state onto the internal order state machine.
//! Webhooks, on-demand polls and the pending sweep all land here, so every
//! path applies the same rules:
//!
//! - PAID is absorbing and is granted at most once per order.
//! - A PAID transition requires the reported amount to match the stored one
//!   within [`AMOUNT_TOLERANCE_IDR`](crate::money::AMOUNT_TOLERANCE_IDR).
//! - An order that is already PAID but whose owner lost the paid role gets
//!   the role back without touching expiry or coupon usage.
//!
//! The decision for one order runs inside [`BillingStore::transition_order`],
//! so concurrent deliveries for the same order are serialized.

use std::sync::Arc;

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::config::RESCUE_WINDOW_HOURS;
use crate::error::BillingResult;
use crate::money::Idr;
use crate::notify::{invoice_message, snap_message, NotificationSink};
use crate::orders::{decode_plan_from_order_id, Gateway, OrderStatus, PaymentLog};
use crate::plan::Plan;
use crate::pricing::PriceBook;
use crate::providers::{PaymentGateway, ProviderUpdate};
use crate::store::{AppliedTransition, BillingStore, OrderEffects, UserUpdate};
use crate::subscriptions::SubscriptionMutator;
use crate::user::UserAccount;

/// What reconciliation did with one update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    /// First PAID transition; roles and expiry updated
    Granted,
    /// Order was already PAID; missing role re-granted
    Recovered,
    /// Non-PAID status or amount written
    StatusUpdated,
    Unchanged,
    /// PAID rejected by the amount gate
    AmountMismatch,
    OrderMissing,
    /// Fuzzy rescue found more than one candidate
    RescueAmbiguous,
}

impl ReconcileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileAction::Granted => "granted",
            ReconcileAction::Recovered => "recovered",
            ReconcileAction::StatusUpdated => "status_updated",
            ReconcileAction::Unchanged => "unchanged",
            ReconcileAction::AmountMismatch => "amount_mismatch",
            ReconcileAction::OrderMissing => "order_missing",
            ReconcileAction::RescueAmbiguous => "rescue_ambiguous",
        }
    }

    /// Whether the order or its owner was written
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            ReconcileAction::Granted | ReconcileAction::Recovered | ReconcileAction::StatusUpdated
        )
    }
}

/// Audit record of one fuzzy-rescue attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RescueReview {
    pub id: Uuid,
    pub amount: Idr,
    pub candidate_order_ids: Vec<String>,
    pub adopted_order_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub order_id: Option<String>,
    /// Internal status the provider state maps to
    pub classified: OrderStatus,
    /// Stored status after reconciliation, when the order exists
    pub order_status: Option<OrderStatus>,
    pub provider_status: String,
    pub action: ReconcileAction,
    pub user_id: Option<Uuid>,
}

/// Counters from one pending sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Decide the writes for one locked order.
///
/// `plan_hint` is used only when neither the row nor its id names a plan.
pub fn decide_effects(
    order: &PaymentLog,
    owner: Option<&UserAccount>,
    target: OrderStatus,
    reported: Option<Idr>,
    plan_hint: Option<Plan>,
    now: OffsetDateTime,
) -> OrderEffects {
    if target == OrderStatus::Paid {
        let amount_ok = reported.is_some_and(|amount| order.amount.within_tolerance(amount));
        if !amount_ok {
            return OrderEffects::none(ReconcileAction::AmountMismatch);
        }

        let plan = order.effective_plan().or(plan_hint);

        if order.status == OrderStatus::Paid {
            return match owner {
                Some(user) if !user.roles.has_paid_role() => {
                    let change = SubscriptionMutator::recover(&user.roles, plan);
                    OrderEffects {
                        user: Some(UserUpdate {
                            roles: change.roles,
                            subscription_expires_at: user.subscription_expires_at,
                        }),
                        ..OrderEffects::none(ReconcileAction::Recovered)
                    }
                }
                _ => OrderEffects::none(ReconcileAction::Unchanged),
            };
        }

        let user = owner.map(|user| {
            let grant = SubscriptionMutator::apply(&user.roles, user.subscription_expires_at, plan, now);
            UserUpdate {
                roles: grant.roles,
                subscription_expires_at: grant.expires_at,
            }
        });

        return OrderEffects {
            status: Some(OrderStatus::Paid),
            user,
            record_coupon_usage: order.coupon_code.is_some(),
            ..OrderEffects::none(ReconcileAction::Granted)
        };
    }

    let refreshed_amount = reported.filter(|amount| amount.0 > 0 && *amount != order.amount);

    if order.status.can_transition_to(target) {
        OrderEffects {
            status: Some(target),
            amount: refreshed_amount,
            ..OrderEffects::none(ReconcileAction::StatusUpdated)
        }
    } else if order.status == target && !target.is_terminal() && refreshed_amount.is_some() {
        OrderEffects {
            amount: refreshed_amount,
            ..OrderEffects::none(ReconcileAction::StatusUpdated)
        }
    } else {
        OrderEffects::none(ReconcileAction::Unchanged)
    }
}

pub struct Reconciler {
    store: Arc<dyn BillingStore>,
    notifier: Arc<dyn NotificationSink>,
    prices: Arc<PriceBook>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn BillingStore>,
        notifier: Arc<dyn NotificationSink>,
        prices: Arc<PriceBook>,
    ) -> Self {
        Self {
            store,
            notifier,
            prices,
        }
    }

    /// Apply one provider update
    pub async fn reconcile(&self, update: &ProviderUpdate) -> BillingResult<ReconcileOutcome> {
        let now = OffsetDateTime::now_utc();
        let target = update.classify();

        tracing::info!(
            gateway = %update.gateway().display_name(),
            order_id = ?update.order_id(),
            provider_status = %update.provider_status(),
            classified = %target,
            "Reconciling provider update"
        );

        if let Some(order_id) = update.order_id() {
            if let Some(applied) = self.transition(order_id, update, None, now).await? {
                return Ok(self.finish(update, applied).await);
            }

            if let Some(applied) = self.adopt_for_payer(order_id, update, now).await? {
                return Ok(self.finish(update, applied).await);
            }
        }

        // Snap updates always carry one of our own ids, so only invoice
        // callbacks go through the amount heuristic.
        if update.gateway() == Gateway::Invoice {
            if let Some(amount) = update.amount() {
                return self.rescue(update, amount, now).await;
            }
        }

        tracing::warn!(order_id = ?update.order_id(), "No order matches provider update");
        Ok(self.outcome(update, ReconcileAction::OrderMissing))
    }

    /// Re-poll every PENDING order of `gateway` and reconcile the result.
    /// One failing order does not stop the sweep.
    pub async fn sweep_pending(&self, gateway: &dyn PaymentGateway) -> BillingResult<SweepReport> {
        let pending = self.store.list_orders_by_status(OrderStatus::Pending).await?;
        let mut report = SweepReport::default();

        for order in pending
            .iter()
            .filter(|o| Gateway::from_order_id(&o.order_id) == Some(gateway.gateway()))
        {
            report.checked += 1;

            let result = match gateway.fetch_status(&order.order_id).await {
                Ok(update) => self.reconcile(&update).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(outcome) => {
                    if outcome.action.is_change() {
                        report.updated += 1;
                    }
                    tracing::info!(
                        order_id = %order.order_id,
                        action = outcome.action.as_str(),
                        "Swept pending order"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(order_id = %order.order_id, error = %e, "Failed to sweep pending order");
                }
            }
        }

        tracing::info!(
            checked = report.checked,
            updated = report.updated,
            failed = report.failed,
            "Pending sweep finished"
        );
        Ok(report)
    }

    async fn transition(
        &self,
        order_id: &str,
        update: &ProviderUpdate,
        plan_hint: Option<Plan>,
        now: OffsetDateTime,
    ) -> BillingResult<Option<AppliedTransition>> {
        let target = update.classify();
        let reported = update.amount();
        let decide = move |order: &PaymentLog, owner: Option<&UserAccount>| {
            decide_effects(order, owner, target, reported, plan_hint, now)
        };
        self.store.transition_order(order_id, &decide).await
    }

    /// Create the missing order for a payer we know by email, then transition it
    async fn adopt_for_payer(
        &self,
        order_id: &str,
        update: &ProviderUpdate,
        now: OffsetDateTime,
    ) -> BillingResult<Option<AppliedTransition>> {
        let Some(email) = update.payer_email() else {
            return Ok(None);
        };
        let Some(user) = self.store.find_user_by_email(email).await? else {
            return Ok(None);
        };

        let order = PaymentLog::pending(
            order_id,
            user.id,
            decode_plan_from_order_id(order_id),
            update.amount().unwrap_or_default(),
            None,
        );
        if self.store.insert_order_if_absent(&order).await? {
            tracing::info!(order_id = %order_id, user_id = %user.id, "Created order from provider callback");
        }

        self.transition(order_id, update, None, now).await
    }

    /// Match an unknown callback to a recent unpaid order by amount.
    /// Only a single candidate is adopted; every attempt is recorded for review.
    async fn rescue(
        &self,
        update: &ProviderUpdate,
        amount: Idr,
        now: OffsetDateTime,
    ) -> BillingResult<ReconcileOutcome> {
        let since = now - Duration::hours(RESCUE_WINDOW_HOURS);
        let candidates: Vec<PaymentLog> = self
            .store
            .list_unpaid_orders_since(since)
            .await?
            .into_iter()
            .filter(|o| o.amount.within_tolerance(amount))
            .collect();

        let adopted = match candidates.as_slice() {
            [only] => Some(only),
            _ => None,
        };

        let review = RescueReview {
            id: Uuid::new_v4(),
            amount,
            candidate_order_ids: candidates.iter().map(|o| o.order_id.clone()).collect(),
            adopted_order_id: adopted.map(|o| o.order_id.clone()),
            created_at: now,
        };
        tracing::warn!(
            review_id = %review.id,
            amount = amount.0,
            candidates = ?review.candidate_order_ids,
            adopted = ?review.adopted_order_id,
            "Fuzzy rescue for callback without a known order"
        );
        if let Err(e) = self.store.insert_rescue_review(&review).await {
            tracing::warn!(review_id = %review.id, error = %e, "Failed to persist rescue review");
        }

        let Some(order) = adopted else {
            let action = if candidates.len() > 1 {
                ReconcileAction::RescueAmbiguous
            } else {
                ReconcileAction::OrderMissing
            };
            return Ok(self.outcome(update, action));
        };

        let plan_hint = match order.effective_plan() {
            Some(_) => None,
            None => self.nearest_plan(amount).await?,
        };

        match self.transition(&order.order_id, update, plan_hint, now).await? {
            Some(applied) => Ok(self.finish(update, applied).await),
            None => Ok(self.outcome(update, ReconcileAction::OrderMissing)),
        }
    }

    /// Plan whose current IDR price is closest to `amount`
    async fn nearest_plan(&self, amount: Idr) -> BillingResult<Option<Plan>> {
        let prices = self.prices.list().await?;
        Ok(prices
            .into_iter()
            .min_by_key(|p| p.current_idr.abs_diff(amount))
            .map(|p| p.plan))
    }

    async fn finish(&self, update: &ProviderUpdate, applied: AppliedTransition) -> ReconcileOutcome {
        let order_id = applied.after.order_id.as_str();
        let action = applied.effects.action;

        match action {
            ReconcileAction::Granted => {
                let user = applied.user_after.as_ref();
                tracing::info!(
                    order_id = %order_id,
                    user_id = %applied.after.user_id,
                    plan = ?applied.after.effective_plan(),
                    roles = ?user.map(|u| u.roles.to_names()),
                    expires_at = ?user.and_then(|u| u.subscription_expires_at),
                    "Order paid; subscription granted"
                );
                if applied.user_before.is_none() {
                    tracing::error!(
                        order_id = %order_id,
                        user_id = %applied.after.user_id,
                        "Paid order has no owner account; no roles granted"
                    );
                }
                if applied.effects.record_coupon_usage && !applied.coupon_usage_recorded {
                    tracing::warn!(
                        order_id = %order_id,
                        coupon_code = ?applied.after.coupon_code,
                        "Coupon usage not recorded (already used or coupon removed)"
                    );
                }
            }
            ReconcileAction::Recovered => tracing::warn!(
                order_id = %order_id,
                user_id = %applied.after.user_id,
                "Re-granted missing role for paid order"
            ),
            ReconcileAction::AmountMismatch => tracing::error!(
                order_id = %order_id,
                expected = applied.before.amount.0,
                reported = ?update.amount().map(|a| a.0),
                "Amount mismatch; PAID transition rejected"
            ),
            ReconcileAction::StatusUpdated => tracing::info!(
                order_id = %order_id,
                from = %applied.before.status,
                to = %applied.after.status,
                "Order status updated"
            ),
            _ => tracing::debug!(order_id = %order_id, status = %applied.after.status, "Order unchanged"),
        }

        if action.is_change() || action == ReconcileAction::AmountMismatch {
            let message = match update {
                ProviderUpdate::Invoice(cb) => invoice_message(cb),
                ProviderUpdate::Snap(st) => snap_message(st, update.classify()),
            };
            self.notifier.notify(&message).await;
        }

        ReconcileOutcome {
            order_id: Some(applied.after.order_id.clone()),
            classified: update.classify(),
            order_status: Some(applied.after.status),
            provider_status: update.provider_status().to_string(),
            action,
            user_id: Some(applied.after.user_id),
        }
    }

    /// Outcome for an update that matched no stored order
    fn outcome(&self, update: &ProviderUpdate, action: ReconcileAction) -> ReconcileOutcome {
        ReconcileOutcome {
            order_id: update.order_id().map(str::to_string),
            classified: update.classify(),
            order_status: None,
            provider_status: update.provider_status().to_string(),
            action,
            user_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use crate::providers::{InvoiceCallback, SnapStatus};
    use crate::store::InMemoryBillingStore;
    use crate::user::Role;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-03-10 12:00 UTC);

    fn order(status: OrderStatus, amount: i64) -> PaymentLog {
        PaymentLog {
            status,
            ..PaymentLog::pending("invoice-monthly-1-1", Uuid::new_v4(), Some(Plan::Monthly), Idr(amount), None)
        }
    }

    #[test]
    fn test_paid_requires_matching_amount() {
        let o = order(OrderStatus::Pending, 30_000);
        let user = UserAccount::new("u@example.com");

        let rejected = decide_effects(&o, Some(&user), OrderStatus::Paid, Some(Idr(5_000)), None, NOW);
        assert_eq!(rejected.action, ReconcileAction::AmountMismatch);
        assert!(rejected.is_noop());

        let missing = decide_effects(&o, Some(&user), OrderStatus::Paid, None, None, NOW);
        assert_eq!(missing.action, ReconcileAction::AmountMismatch);

        let within = decide_effects(&o, Some(&user), OrderStatus::Paid, Some(Idr(31_000)), None, NOW);
        assert_eq!(within.action, ReconcileAction::Granted);
    }

    #[test]
    fn test_recovery_keeps_expiry() {
        let o = order(OrderStatus::Paid, 30_000);
        let expiry = Some(datetime!(2025-04-10 12:00 UTC));
        let user = UserAccount::new("u@example.com")
            .with_roles([Role::Whitelist])
            .with_expiry(expiry);

        let effects = decide_effects(&o, Some(&user), OrderStatus::Paid, Some(Idr(30_000)), None, NOW);
        assert_eq!(effects.action, ReconcileAction::Recovered);
        assert_eq!(effects.status, None);
        assert!(!effects.record_coupon_usage);

        let update = effects.user.unwrap();
        assert!(update.roles.contains(Role::Trader));
        assert!(!update.roles.contains(Role::Whitelist));
        assert_eq!(update.subscription_expires_at, expiry);
    }

    #[test]
    fn test_paid_row_with_role_is_unchanged() {
        let o = order(OrderStatus::Paid, 30_000);
        let user = UserAccount::new("u@example.com").with_roles([Role::Trader]);
        let effects = decide_effects(&o, Some(&user), OrderStatus::Paid, Some(Idr(30_000)), None, NOW);
        assert_eq!(effects.action, ReconcileAction::Unchanged);
        assert!(effects.is_noop());
    }

    #[test]
    fn test_terminal_rows_ignore_non_paid_updates() {
        let expired = order(OrderStatus::Expired, 30_000);
        let effects = decide_effects(&expired, None, OrderStatus::Failed, None, None, NOW);
        assert_eq!(effects.action, ReconcileAction::Unchanged);

        let paid = order(OrderStatus::Paid, 30_000);
        let effects = decide_effects(&paid, None, OrderStatus::Expired, None, None, NOW);
        assert!(effects.is_noop());
    }

    #[test]
    fn test_late_settlement_on_expired_row_is_granted() {
        let expired = order(OrderStatus::Expired, 30_000);
        let user = UserAccount::new("u@example.com");
        let effects = decide_effects(&expired, Some(&user), OrderStatus::Paid, Some(Idr(30_000)), None, NOW);
        assert_eq!(effects.action, ReconcileAction::Granted);
        assert_eq!(effects.status, Some(OrderStatus::Paid));
    }

    #[test]
    fn test_pending_refreshes_amount() {
        let pending = order(OrderStatus::Pending, 30_000);
        let effects = decide_effects(&pending, None, OrderStatus::Pending, Some(Idr(30_500)), None, NOW);
        assert_eq!(effects.action, ReconcileAction::StatusUpdated);
        assert_eq!(effects.status, None);
        assert_eq!(effects.amount, Some(Idr(30_500)));

        let same = decide_effects(&pending, None, OrderStatus::Pending, Some(Idr(30_000)), None, NOW);
        assert_eq!(same.action, ReconcileAction::Unchanged);
    }

    #[test]
    fn test_plan_hint_only_fills_missing_plan() {
        let mut o = order(OrderStatus::Pending, 1_200_000);
        o.plan = None;
        o.order_id = "external-ref".into();
        let user = UserAccount::new("u@example.com").with_expiry(Some(datetime!(2025-05-01 0:00 UTC)));

        let effects = decide_effects(&o, Some(&user), OrderStatus::Paid, Some(Idr(1_200_000)), Some(Plan::Pro), NOW);
        assert_eq!(effects.user.unwrap().subscription_expires_at, None);
    }

    fn reconciler() -> (Arc<InMemoryBillingStore>, Arc<RecordingNotifier>, Reconciler) {
        let store = Arc::new(InMemoryBillingStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let prices = Arc::new(PriceBook::new(store.clone()));
        let reconciler = Reconciler::new(store.clone(), notifier.clone(), prices);
        (store, notifier, reconciler)
    }

    fn invoice(external_id: Option<&str>, status: &str, amount: i64) -> ProviderUpdate {
        ProviderUpdate::Invoice(InvoiceCallback {
            status: status.into(),
            external_id: external_id.map(str::to_string),
            amount: Some(Idr(amount)),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_unknown_payer_email_creates_order() {
        let (store, _, reconciler) = reconciler();
        let user = UserAccount::new("payer@example.com");
        store.insert_user(user.clone()).await;

        let update = ProviderUpdate::Invoice(InvoiceCallback {
            status: "PAID".into(),
            external_id: Some("invoice-quarterly-1-1".into()),
            amount: Some(Idr(75_000)),
            payer_email: Some("payer@example.com".into()),
            ..Default::default()
        });

        let outcome = reconciler.reconcile(&update).await.unwrap();
        assert_eq!(outcome.action, ReconcileAction::Granted);

        let stored = store.order("invoice-quarterly-1-1").await.unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);
        assert_eq!(stored.plan, Some(Plan::Quarterly));
        assert!(store.user(user.id).await.unwrap().roles.contains(Role::Trader));
    }

    #[tokio::test]
    async fn test_rescue_adopts_single_candidate() {
        let (store, notifier, reconciler) = reconciler();
        let user = UserAccount::new("u@example.com");
        store.insert_user(user.clone()).await;
        let mut o = PaymentLog::pending("invoice-yearly-5-5", user.id, None, Idr(270_000), None);
        o.order_id = "legacy-ref".into();
        store.insert_order(&o).await.unwrap();

        let outcome = reconciler
            .reconcile(&invoice(Some("unknown-ext"), "PAID", 270_500))
            .await
            .unwrap();

        assert_eq!(outcome.action, ReconcileAction::Granted);
        assert_eq!(outcome.order_id.as_deref(), Some("legacy-ref"));

        // no plan on the row: nearest price is yearly
        let expiry = store.user(user.id).await.unwrap().subscription_expires_at.unwrap();
        assert!(expiry > OffsetDateTime::now_utc() + Duration::days(360));

        let reviews = store.list_rescue_reviews().await.unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].adopted_order_id.as_deref(), Some("legacy-ref"));
        assert_eq!(notifier.messages().await.len(), 1);
    }

    #[tokio::test]
    async fn test_rescue_without_candidates_is_recorded() {
        let (store, notifier, reconciler) = reconciler();
        let outcome = reconciler.reconcile(&invoice(None, "PAID", 99_000)).await.unwrap();

        assert_eq!(outcome.action, ReconcileAction::OrderMissing);
        let reviews = store.list_rescue_reviews().await.unwrap();
        assert_eq!(reviews.len(), 1);
        assert!(reviews[0].candidate_order_ids.is_empty());
        assert!(notifier.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_payer_email_falls_back_to_rescue() {
        let (store, _, reconciler) = reconciler();
        let user = UserAccount::new("u@example.com");
        store.insert_user(user.clone()).await;
        let o = PaymentLog::pending("invoice-monthly-7-7", user.id, Some(Plan::Monthly), Idr(30_000), None);
        store.insert_order(&o).await.unwrap();

        let update = ProviderUpdate::Invoice(InvoiceCallback {
            status: "PAID".into(),
            external_id: Some("unknown-ext".into()),
            amount: Some(Idr(30_000)),
            payer_email: Some("stranger@example.com".into()),
            ..Default::default()
        });

        let outcome = reconciler.reconcile(&update).await.unwrap();
        assert_eq!(outcome.action, ReconcileAction::Granted);
        assert_eq!(outcome.order_id.as_deref(), Some("invoice-monthly-7-7"));
        assert!(store.order("unknown-ext").await.is_none());
        assert_eq!(store.list_rescue_reviews().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_snap_order_is_not_rescued() {
        let (store, _, reconciler) = reconciler();
        let update = ProviderUpdate::Snap(SnapStatus {
            order_id: "midtrans-monthly-1-1".into(),
            transaction_status: "settlement".into(),
            gross_amount: Some(Idr(30_000)),
            ..Default::default()
        });

        let outcome = reconciler.reconcile(&update).await.unwrap();
        assert_eq!(outcome.action, ReconcileAction::OrderMissing);
        assert!(store.list_rescue_reviews().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_amount_mismatch_notifies_without_writing() {
        let (store, notifier, reconciler) = reconciler();
        let user = UserAccount::new("u@example.com");
        store.insert_user(user.clone()).await;
        let o = PaymentLog::pending("invoice-monthly-2-2", user.id, Some(Plan::Monthly), Idr(30_000), None);
        store.insert_order(&o).await.unwrap();

        let outcome = reconciler
            .reconcile(&invoice(Some("invoice-monthly-2-2"), "PAID", 5_000))
            .await
            .unwrap();

        assert_eq!(outcome.action, ReconcileAction::AmountMismatch);
        assert_eq!(outcome.order_status, Some(OrderStatus::Pending));
        assert_eq!(store.order("invoice-monthly-2-2").await.unwrap().status, OrderStatus::Pending);
        assert_eq!(notifier.messages().await.len(), 1);
    }
}
