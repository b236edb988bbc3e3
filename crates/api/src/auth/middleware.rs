//! Authentication middleware for Axum

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use journal_billing::{BillingStore, RoleSet};
use serde_json::json;
use uuid::Uuid;

use super::jwt::JwtManager;

/// Authenticated user loaded from the store for this request
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub roles: RoleSet,
}

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
    pub store: Arc<dyn BillingStore>,
}

/// Extract the bearer token from the Authorization header.
/// The scheme is matched case-insensitively.
fn extract_bearer_token(request: &Request) -> Option<String> {
    let header = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

async fn authenticate(auth_state: &AuthState, token: Option<String>) -> Result<AuthUser, AuthError> {
    let token = token.ok_or(AuthError::MissingAuth)?;

    let claims = auth_state.jwt_manager.validate(&token).map_err(|e| {
        tracing::debug!(error = %e, "JWT validation failed");
        AuthError::InvalidToken
    })?;

    let user = auth_state
        .store
        .find_user(claims.uid)
        .await
        .map_err(|e| {
            tracing::error!(user_id = %claims.uid, error = %e, "Failed to load user for token");
            AuthError::DatabaseError
        })?
        .ok_or_else(|| {
            tracing::warn!(user_id = %claims.uid, "Token names a user that does not exist");
            AuthError::InvalidToken
        })?;

    Ok(AuthUser {
        user_id: user.id,
        email: user.email,
        roles: user.roles,
    })
}

/// Middleware that requires authentication
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let token = extract_bearer_token(&request);

    match authenticate(&auth_state, token).await {
        Ok(auth_user) => {
            tracing::debug!(
                path = %path,
                user_id = %auth_user.user_id,
                roles = ?auth_user.roles.to_names(),
                "require_auth: authentication successful"
            );
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(path = %path, error = ?err, "require_auth: authentication failed");
            err.into_response()
        }
    }
}

/// Middleware that optionally authenticates. Handlers decide what an
/// anonymous caller gets.
pub async fn optional_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = extract_bearer_token(&request);

    match authenticate(&auth_state, token).await {
        Ok(auth_user) => {
            request.extensions_mut().insert(auth_user);
        }
        Err(AuthError::MissingAuth) => {}
        Err(err) => {
            tracing::debug!(error = ?err, "optional_auth: ignoring bad credentials");
        }
    }
    next.run(request).await
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Database error")]
    DatabaseError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, kind) = match self {
            AuthError::MissingAuth | AuthError::InvalidToken => {
                (StatusCode::UNAUTHORIZED, "unauthorized")
            }
            AuthError::DatabaseError => (StatusCode::INTERNAL_SERVER_ERROR, "auth_failed"),
        };

        (status, Json(json!({ "error": kind }))).into_response()
    }
}

