//! Operator routes

use axum::{extract::State, Extension, Json};
use journal_billing::{BillingError, InvariantCheckSummary};

use crate::{
    auth::AuthUser,
    error::{ApiResult, SubsystemContext},
    state::AppState,
};

/// GET /billing/invariants (Developer)
pub async fn invariants(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<InvariantCheckSummary>> {
    if !user.roles.is_developer() {
        return Err(BillingError::Forbidden.into());
    }

    let summary = state
        .billing
        .invariants
        .run_all_checks()
        .await
        .subsystem("invariants")?;
    Ok(Json(summary))
}
