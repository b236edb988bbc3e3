//! Billing invariants
//!
//! Read-only consistency checks over orders, users and coupons. They can be
//! run after a webhook replay or a manual fix to confirm the subscription
//! state still agrees with the payment history.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;
use crate::orders::{OrderStatus, PaymentLog};
use crate::plan::Plan;
use crate::store::BillingStore;
use crate::user::{Role, UserAccount};

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    pub user_ids: Vec<Uuid>,
    pub order_ids: Vec<String>,
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    pub severity: ViolationSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViolationSeverity {
    /// A customer paid and does not have access, or was charged twice
    Critical,
    High,
    Medium,
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize)]
pub struct InvariantCheckSummary {
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

const CHECKS: [&str; 4] = [
    "paid_orders_have_role",
    "whitelist_demoted",
    "lifetime_has_no_expiry",
    "coupon_single_use",
];

pub struct InvariantChecker {
    store: Arc<dyn BillingStore>,
}

impl InvariantChecker {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        for name in CHECKS {
            violations.extend(self.run_check(name).await?);
        }

        let checks_run = CHECKS.len();
        let checks_failed = violations
            .iter()
            .map(|v| v.invariant.as_str())
            .collect::<HashSet<_>>()
            .len();

        if !violations.is_empty() {
            tracing::warn!(
                violations = violations.len(),
                checks_failed,
                "Billing invariant violations found"
            );
        }

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed: checks_run - checks_failed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Run a single invariant check by name
    pub async fn run_check(&self, name: &str) -> BillingResult<Vec<InvariantViolation>> {
        match name {
            "paid_orders_have_role" => self.check_paid_orders_have_role().await,
            "whitelist_demoted" => self.check_whitelist_demoted().await,
            "lifetime_has_no_expiry" => self.check_lifetime_has_no_expiry().await,
            "coupon_single_use" => self.check_coupon_single_use().await,
            _ => Ok(vec![]),
        }
    }

    pub fn available_checks() -> Vec<&'static str> {
        CHECKS.to_vec()
    }

    /// PAID orders grouped by owner, with the owner loaded
    async fn paid_orders_by_owner(&self) -> BillingResult<Vec<(UserAccount, Vec<PaymentLog>)>> {
        let mut grouped: BTreeMap<Uuid, Vec<PaymentLog>> = BTreeMap::new();
        for order in self.store.list_orders_by_status(OrderStatus::Paid).await? {
            grouped.entry(order.user_id).or_default().push(order);
        }

        let mut owners = Vec::with_capacity(grouped.len());
        for (user_id, orders) in grouped {
            if let Some(user) = self.store.find_user(user_id).await? {
                owners.push((user, orders));
            }
        }
        Ok(owners)
    }

    /// Invariant 1: every PAID order's owner holds Trader or Creator.
    /// Violations are candidates for the recovery path.
    async fn check_paid_orders_have_role(&self) -> BillingResult<Vec<InvariantViolation>> {
        Ok(self
            .paid_orders_by_owner()
            .await?
            .into_iter()
            .filter(|(user, _)| !user.roles.has_paid_role())
            .map(|(user, orders)| InvariantViolation {
                invariant: "paid_orders_have_role".to_string(),
                user_ids: vec![user.id],
                order_ids: orders.iter().map(|o| o.order_id.clone()).collect(),
                description: format!(
                    "User {} has {} paid order(s) but neither Trader nor Creator",
                    user.email,
                    orders.len()
                ),
                context: serde_json::json!({ "roles": user.roles.to_names() }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 2: Whitelist never coexists with a paid role
    async fn check_whitelist_demoted(&self) -> BillingResult<Vec<InvariantViolation>> {
        Ok(self
            .store
            .list_users_with_role(Role::Whitelist)
            .await?
            .into_iter()
            .filter(|user| user.roles.has_paid_role())
            .map(|user| InvariantViolation {
                invariant: "whitelist_demoted".to_string(),
                user_ids: vec![user.id],
                order_ids: vec![],
                description: format!("User {} holds Whitelist together with a paid role", user.email),
                context: serde_json::json!({ "roles": user.roles.to_names() }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// Invariant 3: a PAID lifetime order leaves the owner without expiry
    async fn check_lifetime_has_no_expiry(&self) -> BillingResult<Vec<InvariantViolation>> {
        Ok(self
            .paid_orders_by_owner()
            .await?
            .into_iter()
            .filter_map(|(user, orders)| {
                let expiry = user.subscription_expires_at?;
                let lifetime: Vec<&PaymentLog> = orders
                    .iter()
                    .filter(|o| o.effective_plan().is_some_and(|p: Plan| p.is_lifetime()))
                    .collect();
                if lifetime.is_empty() {
                    return None;
                }
                Some(InvariantViolation {
                    invariant: "lifetime_has_no_expiry".to_string(),
                    user_ids: vec![user.id],
                    order_ids: lifetime.iter().map(|o| o.order_id.clone()).collect(),
                    description: format!(
                        "User {} paid for a lifetime plan but expires at {}",
                        user.email, expiry
                    ),
                    context: serde_json::json!({ "expires_at": expiry.unix_timestamp() }),
                    severity: ViolationSeverity::High,
                })
            })
            .collect())
    }

    /// Invariant 4: a still-existing coupon was charged at most once per user
    async fn check_coupon_single_use(&self) -> BillingResult<Vec<InvariantViolation>> {
        let mut by_pair: HashMap<(String, Uuid), Vec<String>> = HashMap::new();
        for order in self.store.list_orders_by_status(OrderStatus::Paid).await? {
            if let Some(code) = order.coupon_code {
                by_pair.entry((code, order.user_id)).or_default().push(order.order_id);
            }
        }

        let mut violations = Vec::new();
        for ((code, user_id), order_ids) in by_pair {
            if order_ids.len() < 2 || self.store.find_coupon(&code).await?.is_none() {
                continue;
            }
            violations.push(InvariantViolation {
                invariant: "coupon_single_use".to_string(),
                user_ids: vec![user_id],
                description: format!(
                    "Coupon {} was charged {} times for the same user",
                    code,
                    order_ids.len()
                ),
                context: serde_json::json!({ "code": code }),
                order_ids,
                severity: ViolationSeverity::High,
            });
        }
        Ok(violations)
    }
}
