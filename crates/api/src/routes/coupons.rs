//! Coupon management and redeem validation

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use journal_billing::{BillingError, Coupon, CouponSummary, NewCoupon, Plan, Quote};
use serde::Deserialize;
use serde_json::{json, Value};

use super::ApiJson;
use crate::{
    auth::AuthUser,
    error::{ApiResult, SubsystemContext},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// POST /redeem/validate
pub async fn validate_redeem(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    ApiJson(body): ApiJson<RedeemRequest>,
) -> ApiResult<Json<Quote>> {
    let Some(Extension(user)) = user else {
        return Err(BillingError::LoginRequired.into());
    };

    let plan = body.plan.as_deref().map(str::trim).filter(|p| !p.is_empty());
    let code = body.code.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let (Some(plan), Some(code)) = (plan, code) else {
        return Err(BillingError::MissingFields.into());
    };
    let plan = Plan::parse(plan)
        .ok_or_else(|| BillingError::InvalidPayload(format!("unknown plan '{}'", plan)))?;

    let quote = state
        .billing
        .coupons
        .quote(user.user_id, plan, code)
        .await
        .subsystem("coupons")?;
    Ok(Json(quote))
}

/// GET /coupons (Developer or Creator)
pub async fn list_coupons(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<CouponSummary>>> {
    let coupons = state.billing.coupons.list(&user.roles).await.subsystem("coupons")?;
    Ok(Json(coupons))
}

/// POST /coupons (Developer or Creator)
pub async fn create_coupon(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(body): ApiJson<NewCoupon>,
) -> ApiResult<Json<Coupon>> {
    let coupon = state
        .billing
        .coupons
        .upsert(&user.roles, body)
        .await
        .subsystem("coupons")?;
    Ok(Json(coupon))
}

/// DELETE /coupons/{code} (Developer or Creator)
pub async fn delete_coupon(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(code): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .billing
        .coupons
        .delete(&user.roles, &code)
        .await
        .subsystem("coupons")?;
    Ok(Json(json!({ "ok": true })))
}
