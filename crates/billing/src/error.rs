//! Billing error types
//!
//! Every variant maps to one stable snake_case kind that the HTTP layer
//! returns verbatim as `{"error": "<kind>"}`.

use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Login required")]
    LoginRequired,

    #[error("Caller lacks the required role")]
    Forbidden,

    #[error("Missing required fields")]
    MissingFields,

    #[error("Amount is below the provider minimum: {0}")]
    InvalidAmount(String),

    #[error("Unknown or expired coupon code")]
    InvalidCode,

    #[error("Coupon already used by this user")]
    AlreadyUsed,

    #[error("Coupon percent must be between 1 and 20")]
    InvalidPercent,

    #[error("Coupon amount off must be positive")]
    InvalidAmountOff,

    #[error("Coupon duration must be between 1 and 14 days")]
    InvalidDuration,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Xendit API error: {0}")]
    Xendit(String),

    #[error("Midtrans API error: {0}")]
    Midtrans(String),

    #[error("Midtrans is not configured")]
    MidtransConfig,

    #[error("PayPal authentication failed: {0}")]
    PaypalAuth(String),

    #[error("PayPal order creation failed: {0}")]
    PaypalCreate(String),

    #[error("PayPal error: {0}")]
    Paypal(String),

    #[error("Operation not supported by this provider: {0}")]
    Unsupported(&'static str),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// Stable snake_case identifier surfaced to API callers
    pub fn kind(&self) -> &'static str {
        match self {
            BillingError::Unauthorized => "unauthorized",
            BillingError::LoginRequired => "login_required",
            BillingError::Forbidden => "forbidden_user",
            BillingError::MissingFields => "missing_fields",
            BillingError::InvalidAmount(_) => "invalid_amount",
            BillingError::InvalidCode => "invalid_code",
            BillingError::AlreadyUsed => "already_used",
            BillingError::InvalidPercent => "invalid_percent",
            BillingError::InvalidAmountOff => "invalid_amount_off",
            BillingError::InvalidDuration => "invalid_duration",
            BillingError::InvalidPayload(_) => "invalid_payload",
            BillingError::OrderNotFound(_) => "order_not_found",
            BillingError::Xendit(_) => "xendit_error",
            BillingError::Midtrans(_) => "midtrans_error",
            BillingError::MidtransConfig => "midtrans_config_error",
            BillingError::PaypalAuth(_) => "paypal_auth_failed",
            BillingError::PaypalCreate(_) => "paypal_create_failed",
            BillingError::Paypal(_) => "paypal_error",
            BillingError::Unsupported(_) => "unsupported_operation",
            BillingError::Database(_) => "database_error",
            BillingError::Internal(_) => "internal_error",
        }
    }

    /// Client-side errors carry no side effect and map to 4xx
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            BillingError::Unauthorized
                | BillingError::LoginRequired
                | BillingError::Forbidden
                | BillingError::MissingFields
                | BillingError::InvalidAmount(_)
                | BillingError::InvalidCode
                | BillingError::AlreadyUsed
                | BillingError::InvalidPercent
                | BillingError::InvalidAmountOff
                | BillingError::InvalidDuration
                | BillingError::InvalidPayload(_)
                | BillingError::OrderNotFound(_)
        )
    }

    /// Failures of an outbound provider call
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            BillingError::Xendit(_)
                | BillingError::Midtrans(_)
                | BillingError::MidtransConfig
                | BillingError::PaypalAuth(_)
                | BillingError::PaypalCreate(_)
                | BillingError::Paypal(_)
        )
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        BillingError::Database(e.to_string())
    }
}
