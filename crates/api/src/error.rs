//! API error responses
//!
//! Every error is rendered as `{"error": "<kind>"}`. Validation and auth
//! failures keep the billing kind; store failures are reported under the
//! subsystem that hit them (`pricing_failed`, `webhook_failed`, ...).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use journal_billing::BillingError;
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Billing(#[from] BillingError),
    #[error("{subsystem} failed: {source}")]
    Subsystem {
        subsystem: &'static str,
        #[source]
        source: BillingError,
    },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Billing(e) => billing_status(e),
            ApiError::Subsystem { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> String {
        match self {
            ApiError::Billing(e) => e.kind().to_string(),
            ApiError::Subsystem { subsystem, .. } => format!("{}_failed", subsystem),
        }
    }
}

fn billing_status(e: &BillingError) -> StatusCode {
    match e {
        BillingError::Unauthorized | BillingError::LoginRequired => StatusCode::UNAUTHORIZED,
        BillingError::Forbidden => StatusCode::FORBIDDEN,
        BillingError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        BillingError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        e if e.is_provider_error() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Attach the subsystem name to store failures
pub trait SubsystemContext<T> {
    fn subsystem(self, subsystem: &'static str) -> ApiResult<T>;
}

impl<T> SubsystemContext<T> for Result<T, BillingError> {
    fn subsystem(self, subsystem: &'static str) -> ApiResult<T> {
        self.map_err(|source| match source {
            BillingError::Database(_) | BillingError::Internal(_) => {
                ApiError::Subsystem { subsystem, source }
            }
            other => ApiError::Billing(other),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        (status, Json(json!({ "error": self.kind() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_keep_their_kind() {
        let err: ApiResult<()> = Err(BillingError::AlreadyUsed).subsystem("coupons");
        let err = err.unwrap_err();
        assert_eq!(err.kind(), "already_used");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_store_failures_get_subsystem_prefix() {
        let err: ApiResult<()> = Err(BillingError::Database("pool timed out".into())).subsystem("pricing");
        let err = err.unwrap_err();
        assert_eq!(err.kind(), "pricing_failed");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::from(BillingError::Unauthorized).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::from(BillingError::LoginRequired).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::from(BillingError::Forbidden).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::from(BillingError::Xendit("HTTP 500".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(BillingError::InvalidAmount("5000".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
