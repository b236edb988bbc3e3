//! Price book
//!
//! Authoritative plan prices in USD and IDR. Missing rows are seeded from the
//! built-in defaults before the first operation completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BillingError, BillingResult};
use crate::money::{Idr, UsdCents};
use crate::plan::Plan;
use crate::store::BillingStore;
use crate::user::RoleSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    pub plan: Plan,
    pub current_usd: UsdCents,
    pub original_usd: UsdCents,
    pub current_idr: Idr,
    pub original_idr: Idr,
}

impl Pricing {
    pub fn default_for(plan: Plan) -> Self {
        Self {
            plan,
            current_usd: plan.default_usd(),
            original_usd: plan.default_usd(),
            current_idr: plan.default_idr(),
            original_idr: plan.default_idr(),
        }
    }

    pub fn defaults() -> Vec<Pricing> {
        Plan::ALL.into_iter().map(Pricing::default_for).collect()
    }
}

/// One item of a bulk price update. Omitted amounts keep their stored value.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingUpdate {
    pub plan: String,
    #[serde(default)]
    pub current_usd: Option<UsdCents>,
    #[serde(default)]
    pub original_usd: Option<UsdCents>,
    #[serde(default)]
    pub current_idr: Option<Idr>,
    #[serde(default)]
    pub original_idr: Option<Idr>,
}

pub struct PriceBook {
    store: Arc<dyn BillingStore>,
    seeded: AtomicBool,
}

impl PriceBook {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self {
            store,
            seeded: AtomicBool::new(false),
        }
    }

    async fn ensure_seeded(&self) -> BillingResult<()> {
        if self.seeded.load(Ordering::Acquire) {
            return Ok(());
        }
        self.store.seed_pricing(&Pricing::defaults()).await?;
        self.seeded.store(true, Ordering::Release);
        Ok(())
    }

    /// All plan prices in plan order
    pub async fn list(&self) -> BillingResult<Vec<Pricing>> {
        self.ensure_seeded().await?;
        let mut rows = self.store.list_pricing().await?;
        rows.sort_by_key(|row| row.plan);
        Ok(rows)
    }

    pub async fn get(&self, plan: Plan) -> BillingResult<Pricing> {
        self.ensure_seeded().await?;
        Ok(self
            .store
            .find_pricing(plan)
            .await?
            .unwrap_or_else(|| Pricing::default_for(plan)))
    }

    /// Current USD price, or the built-in default when the stored one is zero
    pub async fn current_usd(&self, plan: Plan) -> BillingResult<UsdCents> {
        let row = self.get(plan).await?;
        Ok(if row.current_usd > UsdCents::ZERO {
            row.current_usd
        } else {
            plan.default_usd()
        })
    }

    /// Current IDR price, or the built-in default when the stored one is zero
    pub async fn current_idr(&self, plan: Plan) -> BillingResult<Idr> {
        let row = self.get(plan).await?;
        Ok(if row.current_idr > Idr::ZERO {
            row.current_idr
        } else {
            plan.default_idr()
        })
    }

    /// Upsert prices. Developer only.
    pub async fn update_many(
        &self,
        actor: &RoleSet,
        items: Vec<PricingUpdate>,
    ) -> BillingResult<Vec<Pricing>> {
        if !actor.is_developer() {
            return Err(BillingError::Forbidden);
        }
        if items.is_empty() {
            return Err(BillingError::InvalidPayload("items must not be empty".into()));
        }

        self.ensure_seeded().await?;

        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let plan = Plan::parse(&item.plan)
                .ok_or_else(|| BillingError::InvalidPayload(format!("unknown plan '{}'", item.plan)))?;
            let existing = self
                .store
                .find_pricing(plan)
                .await?
                .unwrap_or_else(|| Pricing::default_for(plan));
            rows.push(Pricing {
                plan,
                current_usd: item.current_usd.unwrap_or(existing.current_usd),
                original_usd: item.original_usd.unwrap_or(existing.original_usd),
                current_idr: item.current_idr.unwrap_or(existing.current_idr),
                original_idr: item.original_idr.unwrap_or(existing.original_idr),
            });
        }

        self.store.upsert_pricing(&rows).await?;
        tracing::info!(plans = rows.len(), "Pricing updated");

        self.list().await
    }

    /// Set each plan's current prices back to the originals. Developer only.
    pub async fn reset_current_to_original(&self, actor: &RoleSet) -> BillingResult<Vec<Pricing>> {
        if !actor.is_developer() {
            return Err(BillingError::Forbidden);
        }
        self.ensure_seeded().await?;
        self.store.reset_pricing().await?;
        tracing::info!("Pricing reset to original values");
        self.list().await
    }
}
