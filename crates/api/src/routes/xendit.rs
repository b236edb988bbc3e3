//! Xendit invoice routes

use axum::{extract::State, http::HeaderMap, Extension, Json};
use journal_billing::{CheckoutInput, Gateway};
use serde_json::{json, Value};

use super::ApiJson;
use crate::{
    auth::AuthUser,
    error::{ApiResult, SubsystemContext},
    state::AppState,
};

const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

/// POST /xendit/create
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(input): ApiJson<CheckoutInput>,
) -> ApiResult<Json<Value>> {
    let created = state
        .billing
        .checkout
        .create(Gateway::Invoice, user.user_id, &input)
        .await
        .subsystem("checkout")?;

    Ok(Json(json!({
        "invoice_url": created.session.redirect_url,
        "order_id": created.order.order_id,
    })))
}

/// POST /xendit/webhook and POST /api/webhook/xendit
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<Value>> {
    let token = headers
        .get(CALLBACK_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state
        .billing
        .webhooks
        .handle_xendit(token, &body)
        .await
        .subsystem("webhook")?;

    Ok(Json(json!({ "ok": true, "action": outcome.action })))
}
