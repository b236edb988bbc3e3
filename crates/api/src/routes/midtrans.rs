//! Midtrans Snap routes

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use journal_billing::{orders::is_valid_order_id, BillingError, CheckoutInput, Gateway, ReconcileOutcome};
use serde_json::{json, Value};

use super::ApiJson;
use crate::{
    auth::AuthUser,
    error::{ApiResult, SubsystemContext},
    state::AppState,
};

/// POST /midtrans/create
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(input): ApiJson<CheckoutInput>,
) -> ApiResult<Json<Value>> {
    let created = state
        .billing
        .checkout
        .create(Gateway::Snap, user.user_id, &input)
        .await
        .subsystem("checkout")?;

    let midtrans = &state.config.billing.midtrans;
    Ok(Json(json!({
        "redirect_url": created.session.redirect_url,
        "token": created.session.token,
        "order_id": created.order.order_id,
        "clientKey": midtrans.client_key,
        "isProduction": midtrans.is_production,
    })))
}

/// POST /midtrans/webhook
pub async fn webhook(State(state): State<AppState>, body: String) -> ApiResult<Json<Value>> {
    let outcome = state
        .billing
        .webhooks
        .handle_midtrans(&body)
        .await
        .subsystem("webhook")?;

    Ok(Json(json!({ "ok": true, "action": outcome.action })))
}

async fn poll(state: &AppState, order_id: &str) -> ApiResult<ReconcileOutcome> {
    if !is_valid_order_id(order_id) {
        return Err(BillingError::InvalidPayload(format!("malformed order id '{}'", order_id)).into());
    }
    state
        .billing
        .webhooks
        .poll(Gateway::Snap, order_id)
        .await
        .subsystem("status")
}

/// GET /midtrans/status/{order_id}
pub async fn status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(order_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let outcome = poll(&state, &order_id).await?;
    tracing::debug!(user_id = %user.user_id, order_id = %order_id, action = outcome.action.as_str(), "Status polled");

    let status = outcome.order_status.unwrap_or(outcome.classified);
    Ok(Json(json!({ "status": status })))
}

/// GET /midtrans/check/{order_id}
pub async fn check(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(order_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let outcome = poll(&state, &order_id).await?;
    tracing::debug!(user_id = %user.user_id, order_id = %order_id, action = outcome.action.as_str(), "Status checked");

    let status = outcome.order_status.unwrap_or(outcome.classified);
    Ok(Json(json!({
        "ok": true,
        "status": status,
        "midtransStatus": outcome.provider_status,
    })))
}
