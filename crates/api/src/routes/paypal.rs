//! PayPal routes

use axum::{extract::State, Extension, Json};
use journal_billing::{PaypalInput, PaypalOrder};
use serde_json::{json, Value};

use super::ApiJson;
use crate::{
    auth::AuthUser,
    error::{ApiResult, SubsystemContext},
    state::AppState,
};

/// POST /paypal/create
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(input): ApiJson<PaypalInput>,
) -> ApiResult<Json<PaypalOrder>> {
    let order = state
        .billing
        .checkout
        .create_paypal(user.user_id, &input)
        .await
        .subsystem("paypal")?;

    tracing::info!(user_id = %user.user_id, paypal_order_id = %order.id, "PayPal order created");
    Ok(Json(order))
}

/// POST /paypal/webhook. Acknowledged only; PayPal events change no state.
pub async fn webhook(body: String) -> Json<Value> {
    tracing::info!(bytes = body.len(), "PayPal webhook received");
    Json(json!({ "ok": true }))
}
