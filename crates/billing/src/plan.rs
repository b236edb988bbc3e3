//! Subscription plans

use serde::{Deserialize, Serialize};

use crate::money::{Idr, UsdCents};

/// Closed set of purchasable plans
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Plan {
    #[serde(rename = "monthly")]
    Monthly,
    #[serde(rename = "quarterly")]
    Quarterly,
    #[serde(rename = "6months")]
    SixMonths,
    #[serde(rename = "yearly")]
    Yearly,
    #[serde(rename = "pro")]
    Pro,
    #[serde(rename = "creator")]
    Creator,
}

impl Plan {
    pub const ALL: [Plan; 6] = [
        Plan::Monthly,
        Plan::Quarterly,
        Plan::SixMonths,
        Plan::Yearly,
        Plan::Pro,
        Plan::Creator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Monthly => "monthly",
            Plan::Quarterly => "quarterly",
            Plan::SixMonths => "6months",
            Plan::Yearly => "yearly",
            Plan::Pro => "pro",
            Plan::Creator => "creator",
        }
    }

    /// Parse a plan name case-insensitively. `lifetime` is an alias of `pro`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "monthly" => Some(Plan::Monthly),
            "quarterly" => Some(Plan::Quarterly),
            "6months" => Some(Plan::SixMonths),
            "yearly" => Some(Plan::Yearly),
            "pro" | "lifetime" => Some(Plan::Pro),
            "creator" => Some(Plan::Creator),
            _ => None,
        }
    }

    /// Lifetime plans never expire
    pub fn is_lifetime(&self) -> bool {
        matches!(self, Plan::Pro | Plan::Creator)
    }

    /// Calendar months added by a time-boxed plan
    pub fn months(&self) -> Option<u32> {
        match self {
            Plan::Monthly => Some(1),
            Plan::Quarterly => Some(3),
            Plan::SixMonths => Some(6),
            Plan::Yearly => Some(12),
            Plan::Pro | Plan::Creator => None,
        }
    }

    /// Built-in USD list price used to seed the price book
    pub fn default_usd(&self) -> UsdCents {
        match self {
            Plan::Monthly => UsdCents(200),
            Plan::Quarterly => UsdCents(500),
            Plan::SixMonths => UsdCents(900),
            Plan::Yearly => UsdCents(1_800),
            Plan::Pro => UsdCents(8_000),
            Plan::Creator => UsdCents(20_000),
        }
    }

    /// Built-in IDR list price used to seed the price book
    pub fn default_idr(&self) -> Idr {
        match self {
            Plan::Monthly => Idr(30_000),
            Plan::Quarterly => Idr(75_000),
            Plan::SixMonths => Idr(140_000),
            Plan::Yearly => Idr(270_000),
            Plan::Pro => Idr(1_200_000),
            Plan::Creator => Idr(3_000_000),
        }
    }

    /// Lowercased plan name stripped of non-alphanumerics, as embedded in order ids
    pub fn slug(&self) -> String {
        slugify(self.as_str())
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Plan::parse(s).ok_or_else(|| format!("unknown plan '{}'", s))
    }
}

pub(crate) fn slugify(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_every_plan() {
        for plan in Plan::ALL {
            assert_eq!(Plan::parse(plan.as_str()), Some(plan));
        }
        assert_eq!(Plan::parse(" Yearly "), Some(Plan::Yearly));
        assert_eq!(Plan::parse("lifetime"), Some(Plan::Pro));
        assert_eq!(Plan::parse("weekly"), None);
    }

    #[test]
    fn test_lifetime_plans() {
        assert!(Plan::Pro.is_lifetime());
        assert!(Plan::Creator.is_lifetime());
        assert!(!Plan::Yearly.is_lifetime());
        assert_eq!(Plan::Pro.months(), None);
        assert_eq!(Plan::SixMonths.months(), Some(6));
    }

    #[test]
    fn test_slug_strips_non_alphanumerics() {
        assert_eq!(Plan::SixMonths.slug(), "6months");
        assert_eq!(slugify("Six-Months!"), "sixmonths");
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&Plan::SixMonths).unwrap();
        assert_eq!(json, "\"6months\"");
        let plan: Plan = serde_json::from_str("\"creator\"").unwrap();
        assert_eq!(plan, Plan::Creator);
    }
}
