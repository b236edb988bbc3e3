//! Money types
//!
//! USD is held as integer cents and IDR as whole rupiah. JSON renders USD as a
//! decimal number (`16.2`) and IDR as an integer, which is what the web client
//! and the payment providers exchange.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Fixed display/charge conversion rate used for USD-denominated discounts on IDR charges
pub const IDR_PER_USD: i64 = 15_000;

/// Slack permitted between a stored order amount and a provider-reported amount
pub const AMOUNT_TOLERANCE_IDR: i64 = 1_000;

/// US dollars in cents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UsdCents(pub i64);

/// Indonesian rupiah (no minor unit in practice)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Idr(pub i64);

impl UsdCents {
    pub const ZERO: UsdCents = UsdCents(0);

    /// Convert a decimal dollar amount, rounding to the nearest cent.
    /// Returns `None` for negative or non-finite input.
    pub fn from_dollars(dollars: f64) -> Option<Self> {
        if !dollars.is_finite() || dollars < 0.0 {
            return None;
        }
        Some(UsdCents((dollars * 100.0).round() as i64))
    }

    pub fn as_dollars(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Convert at the fixed [`IDR_PER_USD`] rate, saturating at `i64::MAX`
    pub fn to_idr(self) -> Idr {
        Idr(self.0.saturating_mul(IDR_PER_USD) / 100)
    }
}

impl Idr {
    pub const ZERO: Idr = Idr(0);

    /// Parse a provider amount which may arrive as `30000`, `30000.0` or `"30000.00"`
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let n = match value {
            serde_json::Value::Number(n) => n.as_f64()?,
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        if !n.is_finite() || n < 0.0 {
            return None;
        }
        Some(Idr(n.round() as i64))
    }

    pub fn abs_diff(self, other: Idr) -> i64 {
        (self.0 - other.0).abs()
    }

    /// Whether two amounts agree within [`AMOUNT_TOLERANCE_IDR`]
    pub fn within_tolerance(self, other: Idr) -> bool {
        self == other || self.abs_diff(other) <= AMOUNT_TOLERANCE_IDR
    }
}

impl std::fmt::Display for UsdCents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl std::fmt::Display for Idr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Rp 1.200.000
        let digits = self.0.abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(c);
        }
        if self.0 < 0 {
            write!(f, "Rp -{}", grouped)
        } else {
            write!(f, "Rp {}", grouped)
        }
    }
}

impl Serialize for UsdCents {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_dollars())
    }
}

impl<'de> Deserialize<'de> for UsdCents {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let dollars = match &value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        dollars
            .and_then(UsdCents::from_dollars)
            .ok_or_else(|| de::Error::custom(format!("invalid USD amount: {}", value)))
    }
}

impl Serialize for Idr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for Idr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Idr::from_json(&value)
            .ok_or_else(|| de::Error::custom(format!("invalid IDR amount: {}", value)))
    }
}
