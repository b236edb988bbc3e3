//! Application state

use std::sync::Arc;

use journal_billing::{BillingResult, BillingService, BillingStore};

use crate::{
    auth::{AuthState, JwtManager},
    config::Config,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub billing: Arc<BillingService>,
    pub jwt_manager: JwtManager,
}

impl AppState {
    pub fn new(store: Arc<dyn BillingStore>, config: Config) -> BillingResult<Self> {
        let billing = BillingService::new(store, &config.billing)?;
        tracing::info!(
            midtrans_production = config.billing.midtrans.is_production,
            static_codes = config.billing.static_codes.len(),
            "Billing service initialized"
        );
        Ok(Self::with_billing(billing, config))
    }

    /// Build state around an already-wired billing service
    pub fn with_billing(billing: BillingService, config: Config) -> Self {
        Self {
            jwt_manager: JwtManager::new(&config.jwt_secret),
            config: Arc::new(config),
            billing: Arc::new(billing),
        }
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
            store: self.billing.store.clone(),
        }
    }
}
