//! Server configuration loaded from the environment

use journal_billing::BillingConfig;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:4000";
const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub jwt_secret: String,
    /// CORS origins; empty allows any origin
    pub allowed_origins: Vec<String>,
    pub billing: BillingConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!("JWT_SECRET not set - using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .map(|raw| parse_origins(&raw))
            .unwrap_or_default();

        Ok(Self {
            database_url,
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string()),
            jwt_secret,
            allowed_origins,
            billing: BillingConfig::from_env(),
        })
    }

    /// Configuration for tests and local tooling with no providers configured
    pub fn for_tests() -> Self {
        Self {
            database_url: String::new(),
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            jwt_secret: "test-jwt-secret".to_string(),
            allowed_origins: Vec::new(),
            billing: BillingConfig::default(),
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}
