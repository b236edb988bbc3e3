//! Postgres billing store

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{AppliedTransition, BillingStore, DecideFn};
use crate::coupons::{Coupon, CouponSummary, CouponUsage};
use crate::error::{BillingError, BillingResult};
use crate::money::{Idr, UsdCents};
use crate::orders::{OrderStatus, PaymentLog};
use crate::plan::Plan;
use crate::pricing::Pricing;
use crate::reconciler::RescueReview;
use crate::user::{Role, RoleSet, UserAccount};
use crate::webhook_log::WebhookLogEntry;

#[derive(Debug, sqlx::FromRow)]
struct PricingRow {
    plan: String,
    current_usd_cents: i64,
    original_usd_cents: i64,
    current_idr: i64,
    original_idr: i64,
}

impl PricingRow {
    fn into_pricing(self) -> Option<Pricing> {
        let Some(plan) = Plan::parse(&self.plan) else {
            tracing::warn!(plan = %self.plan, "Skipping pricing row for unknown plan");
            return None;
        };
        Some(Pricing {
            plan,
            current_usd: UsdCents(self.current_usd_cents),
            original_usd: UsdCents(self.original_usd_cents),
            current_idr: Idr(self.current_idr),
            original_idr: Idr(self.original_idr),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CouponRow {
    code: String,
    percent: Option<f64>,
    amount_off_cents: Option<i64>,
    duration_days: i32,
    expires_at: OffsetDateTime,
    created_at: OffsetDateTime,
}

impl From<CouponRow> for Coupon {
    fn from(row: CouponRow) -> Self {
        Coupon {
            code: row.code,
            percent: row.percent,
            amount_off: row.amount_off_cents.map(UsdCents),
            duration_days: row.duration_days,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CouponSummaryRow {
    #[sqlx(flatten)]
    coupon: CouponRow,
    usage_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct CouponUsageRow {
    code: String,
    user_id: Uuid,
    expires_at: OffsetDateTime,
}

impl From<CouponUsageRow> for CouponUsage {
    fn from(row: CouponUsageRow) -> Self {
        CouponUsage {
            code: row.code,
            user_id: row.user_id,
            expires_at: row.expires_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentLogRow {
    order_id: String,
    user_id: Uuid,
    plan: Option<String>,
    amount: i64,
    coupon_code: Option<String>,
    status: String,
    created_at: OffsetDateTime,
}

impl TryFrom<PaymentLogRow> for PaymentLog {
    type Error = BillingError;

    fn try_from(row: PaymentLogRow) -> Result<Self, Self::Error> {
        let status = OrderStatus::parse(&row.status).ok_or_else(|| {
            BillingError::Database(format!(
                "order {} has unknown status '{}'",
                row.order_id, row.status
            ))
        })?;
        Ok(PaymentLog {
            plan: row.plan.as_deref().and_then(Plan::parse),
            order_id: row.order_id,
            user_id: row.user_id,
            amount: Idr(row.amount),
            coupon_code: row.coupon_code,
            status,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    roles: Vec<String>,
    subscription_expires_at: Option<OffsetDateTime>,
}

impl From<UserRow> for UserAccount {
    fn from(row: UserRow) -> Self {
        UserAccount {
            id: row.id,
            email: row.email,
            roles: RoleSet::from_names(&row.roles),
            subscription_expires_at: row.subscription_expires_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RescueReviewRow {
    id: Uuid,
    amount: i64,
    candidate_order_ids: Vec<String>,
    adopted_order_id: Option<String>,
    created_at: OffsetDateTime,
}

impl From<RescueReviewRow> for RescueReview {
    fn from(row: RescueReviewRow) -> Self {
        RescueReview {
            id: row.id,
            amount: Idr(row.amount),
            candidate_order_ids: row.candidate_order_ids,
            adopted_order_id: row.adopted_order_id,
            created_at: row.created_at,
        }
    }
}

fn orders_from_rows(rows: Vec<PaymentLogRow>) -> BillingResult<Vec<PaymentLog>> {
    rows.into_iter().map(PaymentLog::try_from).collect()
}

const ORDER_COLUMNS: &str = "order_id, user_id, plan, amount, coupon_code, status, created_at";
const USER_COLUMNS: &str = "id, email, roles, subscription_expires_at";
const COUPON_COLUMNS: &str = "code, percent, amount_off_cents, duration_days, expires_at, created_at";

/// Billing store backed by the shared Postgres schema
#[derive(Clone)]
pub struct PgBillingStore {
    pool: PgPool,
}

impl PgBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BillingStore for PgBillingStore {
    async fn seed_pricing(&self, defaults: &[Pricing]) -> BillingResult<()> {
        for row in defaults {
            sqlx::query(
                r#"
                INSERT INTO pricing (plan, current_usd_cents, original_usd_cents, current_idr, original_idr)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (plan) DO NOTHING
                "#,
            )
            .bind(row.plan.as_str())
            .bind(row.current_usd.0)
            .bind(row.original_usd.0)
            .bind(row.current_idr.0)
            .bind(row.original_idr.0)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn list_pricing(&self) -> BillingResult<Vec<Pricing>> {
        let rows: Vec<PricingRow> = sqlx::query_as(
            "SELECT plan, current_usd_cents, original_usd_cents, current_idr, original_idr FROM pricing",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().filter_map(PricingRow::into_pricing).collect())
    }

    async fn find_pricing(&self, plan: Plan) -> BillingResult<Option<Pricing>> {
        let row: Option<PricingRow> = sqlx::query_as(
            "SELECT plan, current_usd_cents, original_usd_cents, current_idr, original_idr FROM pricing WHERE plan = $1",
        )
        .bind(plan.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.and_then(PricingRow::into_pricing))
    }

    async fn upsert_pricing(&self, rows: &[Pricing]) -> BillingResult<()> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO pricing (plan, current_usd_cents, original_usd_cents, current_idr, original_idr)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (plan) DO UPDATE SET
                    current_usd_cents = EXCLUDED.current_usd_cents,
                    original_usd_cents = EXCLUDED.original_usd_cents,
                    current_idr = EXCLUDED.current_idr,
                    original_idr = EXCLUDED.original_idr
                "#,
            )
            .bind(row.plan.as_str())
            .bind(row.current_usd.0)
            .bind(row.original_usd.0)
            .bind(row.current_idr.0)
            .bind(row.original_idr.0)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn reset_pricing(&self) -> BillingResult<()> {
        sqlx::query(
            "UPDATE pricing SET current_usd_cents = original_usd_cents, current_idr = original_idr",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_coupon(&self, code: &str) -> BillingResult<Option<Coupon>> {
        let row: Option<CouponRow> =
            sqlx::query_as(&format!("SELECT {} FROM coupons WHERE code = $1", COUPON_COLUMNS))
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Coupon::from))
    }

    async fn replace_coupon(&self, coupon: &Coupon) -> BillingResult<()> {
        let mut tx = self.pool.begin().await?;

        // usages go with the old row via ON DELETE CASCADE
        sqlx::query("DELETE FROM coupons WHERE code = $1")
            .bind(&coupon.code)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO coupons (code, percent, amount_off_cents, duration_days, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&coupon.code)
        .bind(coupon.percent)
        .bind(coupon.amount_off.map(|c| c.0))
        .bind(coupon.duration_days)
        .bind(coupon.expires_at)
        .bind(coupon.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_coupon(&self, code: &str) -> BillingResult<bool> {
        let result = sqlx::query("DELETE FROM coupons WHERE code = $1")
            .bind(code)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_active_coupons(&self, now: OffsetDateTime) -> BillingResult<Vec<CouponSummary>> {
        let rows: Vec<CouponSummaryRow> = sqlx::query_as(
            r#"
            SELECT c.code, c.percent, c.amount_off_cents, c.duration_days, c.expires_at, c.created_at,
                   COUNT(u.id) FILTER (WHERE u.expires_at > $1) AS usage_count
            FROM coupons c
            LEFT JOIN coupon_usages u ON u.code = c.code
            WHERE c.expires_at > $1
            GROUP BY c.code
            ORDER BY c.created_at DESC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CouponSummary {
                coupon: row.coupon.into(),
                usage_count: row.usage_count,
            })
            .collect())
    }

    async fn find_active_usage(
        &self,
        code: &str,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> BillingResult<Option<CouponUsage>> {
        let row: Option<CouponUsageRow> = sqlx::query_as(
            "SELECT code, user_id, expires_at FROM coupon_usages WHERE code = $1 AND user_id = $2 AND expires_at > $3",
        )
        .bind(code)
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CouponUsage::from))
    }

    async fn insert_coupon_usage(&self, usage: &CouponUsage) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO coupon_usages (code, user_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (code, user_id) DO NOTHING
            "#,
        )
        .bind(&usage.code)
        .bind(usage.user_id)
        .bind(usage.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_coupon_usages(&self) -> BillingResult<Vec<CouponUsage>> {
        let rows: Vec<CouponUsageRow> =
            sqlx::query_as("SELECT code, user_id, expires_at FROM coupon_usages ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(CouponUsage::from).collect())
    }

    async fn insert_order(&self, order: &PaymentLog) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_logs (order_id, user_id, plan, amount, coupon_code, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&order.order_id)
        .bind(order.user_id)
        .bind(order.plan.map(|p| p.as_str()))
        .bind(order.amount.0)
        .bind(&order.coupon_code)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_order_if_absent(&self, order: &PaymentLog) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_logs (order_id, user_id, plan, amount, coupon_code, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(&order.order_id)
        .bind(order.user_id)
        .bind(order.plan.map(|p| p.as_str()))
        .bind(order.amount.0)
        .bind(&order.coupon_code)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_checkout_order(&self, order: &PaymentLog) -> BillingResult<bool> {
        let mut tx = self.pool.begin().await?;

        if let Some(code) = &order.coupon_code {
            // the coupon row lock serializes checkouts carrying this code
            let since: Option<OffsetDateTime> =
                sqlx::query_scalar("SELECT created_at FROM coupons WHERE code = $1 FOR UPDATE")
                    .bind(code)
                    .fetch_optional(&mut *tx)
                    .await?;

            if let Some(since) = since {
                let held: bool = sqlx::query_scalar(
                    r#"
                    SELECT EXISTS (
                        SELECT 1 FROM payment_logs
                        WHERE user_id = $1 AND coupon_code = $2 AND created_at >= $3
                          AND status IN ('PENDING', 'CHALLENGE', 'PAID')
                    )
                    "#,
                )
                .bind(order.user_id)
                .bind(code)
                .bind(since)
                .fetch_one(&mut *tx)
                .await?;
                if held {
                    tx.rollback().await?;
                    return Ok(false);
                }
            }
        }

        sqlx::query(
            r#"
            INSERT INTO payment_logs (order_id, user_id, plan, amount, coupon_code, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&order.order_id)
        .bind(order.user_id)
        .bind(order.plan.map(|p| p.as_str()))
        .bind(order.amount.0)
        .bind(&order.coupon_code)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn discard_pending_order(&self, order_id: &str) -> BillingResult<()> {
        sqlx::query("DELETE FROM payment_logs WHERE order_id = $1 AND status = 'PENDING'")
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_order(&self, order_id: &str) -> BillingResult<Option<PaymentLog>> {
        let row: Option<PaymentLogRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_logs WHERE order_id = $1",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PaymentLog::try_from).transpose()
    }

    async fn list_orders_by_status(&self, status: OrderStatus) -> BillingResult<Vec<PaymentLog>> {
        let rows: Vec<PaymentLogRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_logs WHERE status = $1 ORDER BY created_at",
            ORDER_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        orders_from_rows(rows)
    }

    async fn list_unpaid_orders_since(&self, since: OffsetDateTime) -> BillingResult<Vec<PaymentLog>> {
        let rows: Vec<PaymentLogRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_logs WHERE status <> 'PAID' AND created_at > $1 ORDER BY created_at",
            ORDER_COLUMNS
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        orders_from_rows(rows)
    }

    async fn transition_order(
        &self,
        order_id: &str,
        decide: &DecideFn<'_>,
    ) -> BillingResult<Option<AppliedTransition>> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes every callback and poll for this order
        let row: Option<PaymentLogRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_logs WHERE order_id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let before = PaymentLog::try_from(row)?;

        let user_before: Option<UserAccount> = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(before.user_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(UserAccount::from);

        let effects = decide(&before, user_before.as_ref());

        if effects.is_noop() {
            tx.rollback().await?;
            return Ok(Some(AppliedTransition {
                after: before.clone(),
                before,
                user_after: user_before.clone(),
                user_before,
                effects,
                coupon_usage_recorded: false,
            }));
        }

        let mut after = before.clone();
        if let Some(status) = effects.status {
            after.status = status;
        }
        if let Some(amount) = effects.amount {
            after.amount = amount;
        }
        sqlx::query("UPDATE payment_logs SET status = $1, amount = $2 WHERE order_id = $3")
            .bind(after.status.as_str())
            .bind(after.amount.0)
            .bind(&after.order_id)
            .execute(&mut *tx)
            .await?;

        let mut user_after = user_before.clone();
        if let (Some(update), Some(user)) = (&effects.user, user_after.as_mut()) {
            user.roles = update.roles.clone();
            user.subscription_expires_at = update.subscription_expires_at;
            sqlx::query("UPDATE users SET roles = $1, subscription_expires_at = $2 WHERE id = $3")
                .bind(user.roles.to_names())
                .bind(user.subscription_expires_at)
                .bind(user.id)
                .execute(&mut *tx)
                .await?;
        }

        let mut coupon_usage_recorded = false;
        if effects.record_coupon_usage {
            if let Some(code) = &before.coupon_code {
                // usage inherits the coupon's expiry; nothing is written if the coupon is gone
                let result = sqlx::query(
                    r#"
                    INSERT INTO coupon_usages (code, user_id, expires_at)
                    SELECT code, $2, expires_at FROM coupons WHERE code = $1
                    ON CONFLICT (code, user_id) DO NOTHING
                    "#,
                )
                .bind(code)
                .bind(before.user_id)
                .execute(&mut *tx)
                .await?;
                coupon_usage_recorded = result.rows_affected() > 0;
            }
        }

        tx.commit().await.map_err(|e| {
            tracing::error!(order_id = %order_id, error = %e, "Failed to commit order transition");
            BillingError::Database(e.to_string())
        })?;

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
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(UserAccount::from))
    }

    async fn find_user_by_email(&self, email: &str) -> BillingResult<Option<UserAccount>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE lower(email) = lower($1)",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserAccount::from))
    }

    async fn list_users_with_role(&self, role: Role) -> BillingResult<Vec<UserAccount>> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE EXISTS (SELECT 1 FROM unnest(roles) r WHERE lower(r) = lower($1))",
            USER_COLUMNS
        ))
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(UserAccount::from).collect())
    }

    async fn append_webhook_log(&self, entry: &WebhookLogEntry) -> BillingResult<()> {
        sqlx::query("INSERT INTO webhook_logs (event, payload, created_at) VALUES ($1, $2, $3)")
            .bind(&entry.event)
            .bind(&entry.payload)
            .bind(entry.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_rescue_review(&self, review: &RescueReview) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO rescue_reviews (id, amount, candidate_order_ids, adopted_order_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(review.id)
        .bind(review.amount.0)
        .bind(&review.candidate_order_ids)
        .bind(&review.adopted_order_id)
        .bind(review.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_rescue_reviews(&self) -> BillingResult<Vec<RescueReview>> {
        let rows: Vec<RescueReviewRow> = sqlx::query_as(
            "SELECT id, amount, candidate_order_ids, adopted_order_id, created_at FROM rescue_reviews ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RescueReview::from).collect())
    }
}
