//! Payment log records and order identifiers
//!
//! A `PaymentLog` is one checkout attempt. Its id encodes the provider and
//! the plan: `invoice-<plan>-<unixMillis>-<rand>` or `midtrans-<plan>-<unixMillis>-<rand>`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::money::Idr;
use crate::plan::Plan;

/// Internal order state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Challenge,
    Paid,
    Expired,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Challenge => "CHALLENGE",
            OrderStatus::Paid => "PAID",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OrderStatus::Pending),
            "CHALLENGE" => Some(OrderStatus::Challenge),
            "PAID" => Some(OrderStatus::Paid),
            "EXPIRED" => Some(OrderStatus::Expired),
            "FAILED" => Some(OrderStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Expired | OrderStatus::Failed
        )
    }

    /// Whether an order in this status still claims the coupon it carries
    pub fn holds_coupon(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Challenge | OrderStatus::Paid
        )
    }

    /// Whether a row in this status may move to `next`.
    ///
    /// PAID is absorbing. EXPIRED and FAILED only accept PAID (a late
    /// settlement). CHALLENGE accepts any terminal. PENDING accepts anything
    /// other than itself.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self, next) {
            (OrderStatus::Paid, _) => false,
            (OrderStatus::Expired | OrderStatus::Failed, OrderStatus::Paid) => true,
            (OrderStatus::Expired | OrderStatus::Failed, _) => false,
            (OrderStatus::Challenge, next) => next.is_terminal(),
            (OrderStatus::Pending, next) => next != OrderStatus::Pending,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which hosted checkout produced an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gateway {
    /// Xendit hosted invoice
    Invoice,
    /// Midtrans Snap
    Snap,
}

impl Gateway {
    pub fn order_prefix(&self) -> &'static str {
        match self {
            Gateway::Invoice => "invoice",
            Gateway::Snap => "midtrans",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Gateway::Invoice => "Xendit",
            Gateway::Snap => "Midtrans",
        }
    }

    pub fn from_order_id(order_id: &str) -> Option<Self> {
        let (prefix, _) = order_id.split_once('-')?;
        match prefix {
            "invoice" => Some(Gateway::Invoice),
            "midtrans" => Some(Gateway::Snap),
            _ => None,
        }
    }
}

/// Durable record of one checkout attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLog {
    pub order_id: String,
    pub user_id: Uuid,
    pub plan: Option<Plan>,
    pub amount: Idr,
    pub coupon_code: Option<String>,
    pub status: OrderStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl PaymentLog {
    pub fn pending(
        order_id: impl Into<String>,
        user_id: Uuid,
        plan: Option<Plan>,
        amount: Idr,
        coupon_code: Option<String>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            user_id,
            plan,
            amount,
            coupon_code,
            status: OrderStatus::Pending,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Stored plan, falling back to the plan encoded in the order id
    pub fn effective_plan(&self) -> Option<Plan> {
        self.plan.or_else(|| decode_plan_from_order_id(&self.order_id))
    }
}

/// Build a fresh order id for a gateway and plan
pub fn generate_order_id(gateway: Gateway, plan: Plan) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let suffix: u32 = rand::rng().random_range(0..1000);
    format!("{}-{}-{}-{}", gateway.order_prefix(), plan.slug(), millis, suffix)
}

/// Whether `order_id` matches `^(invoice|midtrans)-[a-z0-9]+-[0-9]+-[0-9]+$`
pub fn is_valid_order_id(order_id: &str) -> bool {
    let parts: Vec<&str> = order_id.split('-').collect();
    if parts.len() != 4 {
        return false;
    }
    let numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    matches!(parts[0], "invoice" | "midtrans")
        && !parts[1].is_empty()
        && parts[1]
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && numeric(parts[2])
        && numeric(parts[3])
}

/// Recover the plan from an order id prefix `^(invoice|midtrans)-([a-z0-9]+)-`
pub fn decode_plan_from_order_id(order_id: &str) -> Option<Plan> {
    let rest = order_id
        .strip_prefix("invoice-")
        .or_else(|| order_id.strip_prefix("midtrans-"))?;
    let (slug, _) = rest.split_once('-')?;
    if slug.is_empty()
        || !slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return None;
    }
    // aliases such as "lifetime" resolve through Plan::parse
    Plan::ALL
        .into_iter()
        .find(|p| p.slug() == slug)
        .or_else(|| Plan::parse(slug))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_match_grammar() {
        for plan in Plan::ALL {
            let id = generate_order_id(Gateway::Snap, plan);
            assert!(is_valid_order_id(&id), "bad id {}", id);
            assert!(id.starts_with("midtrans-"));
            assert_eq!(decode_plan_from_order_id(&id), Some(plan));
        }
        let id = generate_order_id(Gateway::Invoice, Plan::SixMonths);
        assert!(id.starts_with("invoice-6months-"));
    }

    #[test]
    fn test_order_id_grammar_rejects_malformed() {
        assert!(is_valid_order_id("invoice-monthly-1700000000000-42"));
        assert!(!is_valid_order_id("paypal-monthly-1700000000000-42"));
        assert!(!is_valid_order_id("invoice-Monthly-1700000000000-42"));
        assert!(!is_valid_order_id("invoice-monthly-17000x-42"));
        assert!(!is_valid_order_id("invoice-monthly-1700000000000"));
    }

    #[test]
    fn test_decode_plan() {
        assert_eq!(
            decode_plan_from_order_id("midtrans-yearly-1-2"),
            Some(Plan::Yearly)
        );
        assert_eq!(
            decode_plan_from_order_id("invoice-lifetime-1-2"),
            Some(Plan::Pro)
        );
        assert_eq!(decode_plan_from_order_id("invoice-weekly-1-2"), None);
        assert_eq!(decode_plan_from_order_id("order-123"), None);
    }

    #[test]
    fn test_gateway_from_order_id() {
        assert_eq!(
            Gateway::from_order_id("midtrans-pro-1-2"),
            Some(Gateway::Snap)
        );
        assert_eq!(
            Gateway::from_order_id("invoice-pro-1-2"),
            Some(Gateway::Invoice)
        );
        assert_eq!(Gateway::from_order_id("random"), None);
    }

    #[test]
    fn test_paid_is_absorbing() {
        for next in [
            OrderStatus::Pending,
            OrderStatus::Challenge,
            OrderStatus::Expired,
            OrderStatus::Failed,
            OrderStatus::Paid,
        ] {
            assert!(!OrderStatus::Paid.can_transition_to(next));
        }
    }

    #[test]
    fn test_terminal_rows_only_accept_late_payment() {
        assert!(OrderStatus::Expired.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Failed.can_transition_to(OrderStatus::Paid));
        assert!(!OrderStatus::Expired.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Failed.can_transition_to(OrderStatus::Expired));
    }

    #[test]
    fn test_challenge_moves_only_to_terminal() {
        assert!(OrderStatus::Challenge.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Challenge.can_transition_to(OrderStatus::Failed));
        assert!(!OrderStatus::Challenge.can_transition_to(OrderStatus::Pending));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Challenge));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn test_status_parse_round_trip() {
        for s in ["PENDING", "CHALLENGE", "PAID", "EXPIRED", "FAILED"] {
            assert_eq!(OrderStatus::parse(s).map(|st| st.as_str()), Some(s));
        }
        assert_eq!(OrderStatus::parse("paid"), None);
    }
}
