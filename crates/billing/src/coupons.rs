//! Discount codes
//!
//! Stored coupons carry either a percent or a USD amount off, live for a
//! fixed number of days and may be used once per user while active. Codes
//! from `REDEEM_CODES` act as a fallback when no stored coupon exists.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::config::StaticCode;
use crate::error::{BillingError, BillingResult};
use crate::money::{Idr, UsdCents};
use crate::plan::Plan;
use crate::pricing::PriceBook;
use crate::store::BillingStore;
use crate::user::RoleSet;

pub const MIN_PERCENT: f64 = 1.0;
pub const MAX_PERCENT: f64 = 20.0;
pub const MIN_DURATION_DAYS: i64 = 1;
pub const MAX_DURATION_DAYS: i64 = 14;
/// Largest USD amount off a coupon may carry
pub const MAX_AMOUNT_OFF_USD: f64 = 1_000.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub code: String,
    pub percent: Option<f64>,
    pub amount_off: Option<UsdCents>,
    pub duration_days: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Coupon {
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.expires_at > now
    }

    pub fn discount(&self) -> Discount {
        Discount {
            percent: self.percent,
            amount_off: self.amount_off,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponUsage {
    pub code: String,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// An active coupon with the number of active usages
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponSummary {
    #[serde(flatten)]
    pub coupon: Coupon,
    pub usage_count: i64,
}

/// Discount rule. Percent is applied first, then the USD amount off.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Discount {
    pub percent: Option<f64>,
    pub amount_off: Option<UsdCents>,
}

impl From<StaticCode> for Discount {
    fn from(code: StaticCode) -> Self {
        Self {
            percent: code.percent,
            amount_off: code.amount_off,
        }
    }
}

impl Discount {
    fn percent_factor(&self) -> f64 {
        match self.percent {
            Some(pct) if pct > 0.0 => 1.0 - pct / 100.0,
            _ => 1.0,
        }
    }

    /// Discounted USD price, clamped at zero and rounded to the cent
    pub fn apply_usd(&self, price: UsdCents) -> UsdCents {
        let mut cents = (price.0 as f64 * self.percent_factor()).max(0.0);
        if let Some(off) = self.amount_off.filter(|off| off.0 > 0) {
            cents = (cents - off.0 as f64).max(0.0);
        }
        UsdCents(cents.round() as i64)
    }

    /// Discounted IDR price. The USD amount off converts at the fixed rate.
    pub fn apply_idr(&self, price: Idr) -> Idr {
        let mut rupiah = (price.0 as f64 * self.percent_factor()).max(0.0);
        if let Some(off) = self.amount_off.filter(|off| off.0 > 0) {
            rupiah = (rupiah - off.to_idr().0 as f64).max(0.0);
        }
        Idr(rupiah.round() as i64)
    }
}

/// Result of validating a code against a plan's USD price
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub ok: bool,
    pub percent: f64,
    pub amount_off: UsdCents,
    #[serde(rename = "final")]
    pub final_price: UsdCents,
}

/// Charge amount for an IDR checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdrQuote {
    pub amount: Idr,
    /// Normalized code that was applied, if any
    pub coupon_code: Option<String>,
}

/// Request body for creating a coupon
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCoupon {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub percent: Option<f64>,
    #[serde(default)]
    pub amount_off: Option<f64>,
    #[serde(default)]
    pub duration_days: Option<i64>,
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

impl NewCoupon {
    /// Validate and build the coupon row
    pub fn into_coupon(self, now: OffsetDateTime) -> BillingResult<Coupon> {
        let code = normalize_code(self.code.as_deref().unwrap_or_default());
        if code.is_empty() {
            return Err(BillingError::InvalidCode);
        }

        if let Some(pct) = self.percent {
            if !pct.is_finite() || !(MIN_PERCENT..=MAX_PERCENT).contains(&pct) {
                return Err(BillingError::InvalidPercent);
            }
        }

        let amount_off = match self.amount_off {
            Some(off) if !off.is_finite() || off <= 0.0 || off > MAX_AMOUNT_OFF_USD => {
                return Err(BillingError::InvalidAmountOff)
            }
            Some(off) => match UsdCents::from_dollars(off) {
                Some(cents) if cents.0 > 0 => Some(cents),
                _ => return Err(BillingError::InvalidAmountOff),
            },
            None => None,
        };

        let days = self.duration_days.unwrap_or(0);
        if !(MIN_DURATION_DAYS..=MAX_DURATION_DAYS).contains(&days) {
            return Err(BillingError::InvalidDuration);
        }

        match (self.percent, amount_off) {
            (None, None) => return Err(BillingError::MissingFields),
            (Some(_), Some(_)) => {
                return Err(BillingError::InvalidPayload(
                    "percent and amountOff are mutually exclusive".into(),
                ))
            }
            _ => {}
        }

        Ok(Coupon {
            code,
            percent: self.percent,
            amount_off,
            duration_days: days as i32,
            expires_at: now + Duration::days(days),
            created_at: now,
        })
    }
}

pub struct CouponStore {
    store: Arc<dyn BillingStore>,
    prices: Arc<PriceBook>,
    static_codes: HashMap<String, StaticCode>,
}

impl CouponStore {
    pub fn new(
        store: Arc<dyn BillingStore>,
        prices: Arc<PriceBook>,
        static_codes: HashMap<String, StaticCode>,
    ) -> Self {
        Self {
            store,
            prices,
            static_codes,
        }
    }

    /// Look up the discount for a code on behalf of a user.
    ///
    /// A stored coupon takes precedence over a static code with the same
    /// name, even when the stored one has expired.
    async fn resolve(&self, user_id: Uuid, key: &str, now: OffsetDateTime) -> BillingResult<Discount> {
        if key.is_empty() {
            return Err(BillingError::InvalidCode);
        }

        if let Some(coupon) = self.store.find_coupon(key).await? {
            if !coupon.is_active(now) {
                return Err(BillingError::InvalidCode);
            }
            if self.store.find_active_usage(key, user_id, now).await?.is_some() {
                return Err(BillingError::AlreadyUsed);
            }
            return Ok(coupon.discount());
        }

        self.static_codes
            .get(key)
            .map(|code| Discount::from(*code))
            .ok_or(BillingError::InvalidCode)
    }

    /// Quote a code against the plan's current USD price
    pub async fn quote(&self, user_id: Uuid, plan: Plan, code: &str) -> BillingResult<Quote> {
        let key = normalize_code(code);
        let discount = self.resolve(user_id, &key, OffsetDateTime::now_utc()).await?;
        let price = self.prices.current_usd(plan).await?;

        Ok(Quote {
            ok: true,
            percent: discount.percent.unwrap_or(0.0),
            amount_off: discount.amount_off.unwrap_or(UsdCents::ZERO),
            final_price: discount.apply_usd(price),
        })
    }

    /// USD charge for a plan with an optional code
    pub async fn price_usd(&self, user_id: Uuid, plan: Plan, code: Option<&str>) -> BillingResult<UsdCents> {
        let price = self.prices.current_usd(plan).await?;
        match code.map(normalize_code).filter(|c| !c.is_empty()) {
            Some(key) => {
                let discount = self.resolve(user_id, &key, OffsetDateTime::now_utc()).await?;
                Ok(discount.apply_usd(price))
            }
            None => Ok(price),
        }
    }

    /// IDR charge for a plan with an optional code
    pub async fn price_idr(&self, user_id: Uuid, plan: Plan, code: Option<&str>) -> BillingResult<IdrQuote> {
        let price = self.prices.current_idr(plan).await?;
        match code.map(normalize_code).filter(|c| !c.is_empty()) {
            Some(key) => {
                let discount = self.resolve(user_id, &key, OffsetDateTime::now_utc()).await?;
                Ok(IdrQuote {
                    amount: discount.apply_idr(price),
                    coupon_code: Some(key),
                })
            }
            None => Ok(IdrQuote {
                amount: price,
                coupon_code: None,
            }),
        }
    }

    /// Create a coupon, replacing any existing one with the same code along
    /// with its usages. Developer or Creator only.
    pub async fn upsert(&self, actor: &RoleSet, input: NewCoupon) -> BillingResult<Coupon> {
        if !actor.can_manage_coupons() {
            return Err(BillingError::Forbidden);
        }
        let coupon = input.into_coupon(OffsetDateTime::now_utc())?;
        self.store.replace_coupon(&coupon).await?;

        tracing::info!(
            code = %coupon.code,
            percent = ?coupon.percent,
            amount_off = ?coupon.amount_off,
            duration_days = coupon.duration_days,
            "Coupon created"
        );
        Ok(coupon)
    }

    /// Delete a coupon and its usages. Deleting a missing code succeeds.
    pub async fn delete(&self, actor: &RoleSet, code: &str) -> BillingResult<()> {
        if !actor.can_manage_coupons() {
            return Err(BillingError::Forbidden);
        }
        let key = normalize_code(code);
        if key.is_empty() {
            return Err(BillingError::InvalidCode);
        }
        let deleted = self.store.delete_coupon(&key).await?;
        tracing::info!(code = %key, deleted, "Coupon delete requested");
        Ok(())
    }

    /// Active coupons with their active usage counts
    pub async fn list(&self, actor: &RoleSet) -> BillingResult<Vec<CouponSummary>> {
        if !actor.can_manage_coupons() {
            return Err(BillingError::Forbidden);
        }
        self.store.list_active_coupons(OffsetDateTime::now_utc()).await
    }
}
