//! Billing configuration
//!
//! Loaded once at startup and shared read-only by every billing service.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::money::UsdCents;

/// Minimum IDR charge accepted by the invoice provider
pub const XENDIT_MIN_AMOUNT_IDR: i64 = 10_000;

/// Minimum IDR charge accepted by the Snap provider
pub const MIDTRANS_MIN_AMOUNT_IDR: i64 = 1_000;

/// How far back fuzzy rescue looks for a matching order
pub const RESCUE_WINDOW_HOURS: i64 = 48;

const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct XenditConfig {
    pub secret_key: String,
    pub callback_token: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct MidtransConfig {
    pub server_key: String,
    pub client_key: String,
    pub is_production: bool,
    pub snap_base_url: String,
    pub api_base_url: String,
}

impl MidtransConfig {
    pub fn new(server_key: impl Into<String>, client_key: impl Into<String>, is_production: bool) -> Self {
        let (snap, api) = if is_production {
            ("https://app.midtrans.com", "https://api.midtrans.com")
        } else {
            ("https://app.sandbox.midtrans.com", "https://api.sandbox.midtrans.com")
        };
        Self {
            server_key: server_key.into(),
            client_key: client_key.into(),
            is_production,
            snap_base_url: snap.to_string(),
            api_base_url: api.to_string(),
        }
    }

    /// The server key signs every Snap call; the client key is only
    /// handed to the browser popup.
    pub fn is_configured(&self) -> bool {
        !self.server_key.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PaypalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub return_url: String,
    pub cancel_url: String,
}

/// A promotional code supplied through `REDEEM_CODES`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticCode {
    #[serde(default)]
    pub percent: Option<f64>,
    #[serde(default)]
    pub amount_off: Option<UsdCents>,
}

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub xendit: XenditConfig,
    pub midtrans: MidtransConfig,
    pub paypal: PaypalConfig,
    pub discord_webhook_url: Option<String>,
    /// Uppercased code -> discount
    pub static_codes: HashMap<String, StaticCode>,
    pub provider_timeout: Duration,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            xendit: XenditConfig {
                secret_key: String::new(),
                callback_token: String::new(),
                base_url: "https://api.xendit.co".to_string(),
            },
            midtrans: MidtransConfig::new("", "", false),
            paypal: PaypalConfig {
                client_id: String::new(),
                client_secret: String::new(),
                base_url: "https://api-m.sandbox.paypal.com".to_string(),
                return_url: "http://localhost:3000/paypal/success".to_string(),
                cancel_url: "http://localhost:3000/paypal/cancel".to_string(),
            },
            discord_webhook_url: None,
            static_codes: HashMap::new(),
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
        }
    }
}

impl BillingConfig {
    /// Build configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let is_production = std::env::var("MIDTRANS_IS_PRODUCTION")
            .map(|v| v == "true")
            .unwrap_or(false);
        let mut midtrans = MidtransConfig::new(
            std::env::var("MIDTRANS_SERVER_KEY").unwrap_or_default(),
            std::env::var("MIDTRANS_CLIENT_KEY").unwrap_or_default(),
            is_production,
        );
        if let Ok(url) = std::env::var("MIDTRANS_SNAP_BASE_URL") {
            midtrans.snap_base_url = url;
        }
        if let Ok(url) = std::env::var("MIDTRANS_API_BASE_URL") {
            midtrans.api_base_url = url;
        }
        if !midtrans.is_configured() {
            tracing::warn!("MIDTRANS_SERVER_KEY not set - Snap checkout disabled");
        }

        let xendit = XenditConfig {
            secret_key: std::env::var("XENDIT_SECRET_KEY").unwrap_or_default(),
            callback_token: std::env::var("XENDIT_CALLBACK_TOKEN").unwrap_or_default(),
            base_url: std::env::var("XENDIT_BASE_URL").unwrap_or(defaults.xendit.base_url),
        };
        if xendit.callback_token.is_empty() {
            tracing::warn!("XENDIT_CALLBACK_TOKEN not set - all Xendit callbacks will be rejected");
        }

        let paypal = PaypalConfig {
            client_id: std::env::var("PAYPAL_CLIENT_ID").unwrap_or_default(),
            client_secret: std::env::var("PAYPAL_CLIENT_SECRET").unwrap_or_default(),
            base_url: std::env::var("PAYPAL_BASE_URL").unwrap_or(defaults.paypal.base_url),
            return_url: std::env::var("PAYPAL_RETURN_URL").unwrap_or(defaults.paypal.return_url),
            cancel_url: std::env::var("PAYPAL_CANCEL_URL").unwrap_or(defaults.paypal.cancel_url),
        };

        let static_codes = std::env::var("REDEEM_CODES")
            .ok()
            .map(|raw| parse_static_codes(&raw))
            .unwrap_or_default();

        let provider_timeout = std::env::var("PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.provider_timeout);

        Self {
            xendit,
            midtrans,
            paypal,
            discord_webhook_url: std::env::var("DISCORD_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            static_codes,
            provider_timeout,
        }
    }

    pub fn static_code(&self, code: &str) -> Option<StaticCode> {
        self.static_codes.get(&code.trim().to_uppercase()).copied()
    }
}

/// Parse the `REDEEM_CODES` JSON map. Malformed input yields no codes.
pub fn parse_static_codes(raw: &str) -> HashMap<String, StaticCode> {
    match serde_json::from_str::<HashMap<String, StaticCode>>(raw) {
        Ok(codes) => codes
            .into_iter()
            .map(|(code, discount)| (code.trim().to_uppercase(), discount))
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed REDEEM_CODES");
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_static_codes_uppercases_keys() {
        let codes = parse_static_codes(r#"{"launch":{"percent":10},"FIVE":{"amountOff":5}}"#);
        assert_eq!(codes.len(), 2);
        assert_eq!(codes["LAUNCH"].percent, Some(10.0));
        assert_eq!(codes["FIVE"].amount_off, Some(UsdCents(500)));
    }

    #[test]
    fn test_parse_static_codes_rejects_garbage() {
        assert!(parse_static_codes("not json").is_empty());
    }

    #[test]
    fn test_midtrans_urls_follow_environment() {
        let sandbox = MidtransConfig::new("sk", "ck", false);
        assert!(sandbox.snap_base_url.contains("sandbox"));
        let prod = MidtransConfig::new("sk", "ck", true);
        assert_eq!(prod.api_base_url, "https://api.midtrans.com");
        assert!(!MidtransConfig::new("", "ck", true).is_configured());
    }

    #[test]
    #[serial]
    fn test_from_env_reads_overrides() {
        std::env::set_var("MIDTRANS_IS_PRODUCTION", "true");
        std::env::set_var("PROVIDER_TIMEOUT_SECS", "3");
        std::env::set_var("REDEEM_CODES", r#"{"promo":{"percent":5}}"#);

        let config = BillingConfig::from_env();
        assert!(config.midtrans.is_production);
        assert_eq!(config.provider_timeout, Duration::from_secs(3));
        assert!(config.static_code("Promo").is_some());

        std::env::remove_var("MIDTRANS_IS_PRODUCTION");
        std::env::remove_var("PROVIDER_TIMEOUT_SECS");
        std::env::remove_var("REDEEM_CODES");
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        std::env::remove_var("MIDTRANS_IS_PRODUCTION");
        std::env::remove_var("PROVIDER_TIMEOUT_SECS");
        std::env::remove_var("REDEEM_CODES");

        let config = BillingConfig::from_env();
        assert!(!config.midtrans.is_production);
        assert_eq!(config.provider_timeout, Duration::from_secs(10));
        assert!(config.static_codes.is_empty());
    }
}
