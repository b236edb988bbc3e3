//! HTTP routes

mod admin;
mod coupons;
mod midtrans;
mod paypal;
mod pricing;
mod xendit;

#[cfg(test)]
mod tests;

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use journal_billing::BillingError;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::{
    auth::{optional_auth, require_auth},
    error::ApiError,
    state::AppState,
};

/// JSON body extractor whose rejections render as `invalid_payload`
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Billing(BillingError::InvalidPayload(rejection.body_text()))
    }
}

pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    let public = Router::new()
        .route("/health", get(health))
        .route("/pricing", get(pricing::list_pricing))
        .route("/xendit/webhook", post(xendit::webhook))
        .route("/api/webhook/xendit", post(xendit::webhook))
        .route("/midtrans/webhook", post(midtrans::webhook))
        .route("/paypal/webhook", post(paypal::webhook));

    let redeem = Router::new()
        .route("/redeem/validate", post(coupons::validate_redeem))
        .route_layer(middleware::from_fn_with_state(auth_state.clone(), optional_auth));

    let protected = Router::new()
        .route("/pricing", axum::routing::patch(pricing::update_pricing))
        .route("/pricing/reset", post(pricing::reset_pricing))
        .route("/coupons", get(coupons::list_coupons).post(coupons::create_coupon))
        .route("/coupons/{code}", delete(coupons::delete_coupon))
        .route("/xendit/create", post(xendit::create))
        .route("/midtrans/create", post(midtrans::create))
        .route("/midtrans/status/{order_id}", get(midtrans::status))
        .route("/midtrans/check/{order_id}", get(midtrans::check))
        .route("/paypal/create", post(paypal::create))
        .route("/billing/invariants", get(admin::invariants))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth));

    Router::new()
        .merge(public)
        .merge(redeem)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
