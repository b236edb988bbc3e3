//! Price book routes

use axum::{extract::State, Extension, Json};
use journal_billing::{Pricing, PricingUpdate};
use serde::Deserialize;

use super::ApiJson;
use crate::{
    auth::AuthUser,
    error::{ApiResult, SubsystemContext},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct UpdatePricingRequest {
    #[serde(default)]
    pub items: Vec<PricingUpdate>,
}

/// GET /pricing
pub async fn list_pricing(State(state): State<AppState>) -> ApiResult<Json<Vec<Pricing>>> {
    let prices = state.billing.prices.list().await.subsystem("pricing")?;
    Ok(Json(prices))
}

/// PATCH /pricing (Developer)
pub async fn update_pricing(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(body): ApiJson<UpdatePricingRequest>,
) -> ApiResult<Json<Vec<Pricing>>> {
    let prices = state
        .billing
        .prices
        .update_many(&user.roles, body.items)
        .await
        .subsystem("pricing")?;

    tracing::info!(user_id = %user.user_id, "Pricing updated");
    Ok(Json(prices))
}

/// POST /pricing/reset (Developer)
pub async fn reset_pricing(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Pricing>>> {
    let prices = state
        .billing
        .prices
        .reset_current_to_original(&user.roles)
        .await
        .subsystem("pricing")?;

    tracing::info!(user_id = %user.user_id, "Pricing reset to original");
    Ok(Json(prices))
}
