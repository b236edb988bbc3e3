//! Unit tests for authentication middleware
//!
//! Tests cover:
//! - Bearer token extraction (missing, wrong scheme, case-insensitive scheme)
//! - JWT validation (valid, forged, unknown user)
//! - Optional authentication for anonymous callers

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header::AUTHORIZATION, Request, StatusCode},
        middleware,
        routing::get,
        Extension, Router,
    };
    use journal_billing::{InMemoryBillingStore, Role, UserAccount};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::super::jwt::JwtManager;
    use super::super::middleware::*;

    const SECRET: &str = "test-jwt-secret-key-for-testing-only";

    fn setup_auth_state(store: Arc<InMemoryBillingStore>) -> AuthState {
        AuthState {
            jwt_manager: JwtManager::new(SECRET),
            store,
        }
    }

    async fn whoami(user: Option<Extension<AuthUser>>) -> String {
        match user {
            Some(Extension(user)) => format!("{}:{}", user.email, user.roles.to_names().join(",")),
            None => "anonymous".to_string(),
        }
    }

    fn protected(auth_state: AuthState) -> Router {
        Router::new()
            .route("/me", get(whoami))
            .route_layer(middleware::from_fn_with_state(auth_state, require_auth))
    }

    fn optional(auth_state: AuthState) -> Router {
        Router::new()
            .route("/me", get(whoami))
            .route_layer(middleware::from_fn_with_state(auth_state, optional_auth))
    }

    async fn call(router: Router, authorization: Option<String>) -> (StatusCode, String) {
        let mut request = Request::builder().uri("/me");
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value);
        }
        let response = router
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn create_test_user(store: &InMemoryBillingStore) -> UserAccount {
        let user = UserAccount::new("test@example.com").with_roles([Role::Trader]);
        store.insert_user(user.clone()).await;
        user
    }

    #[tokio::test]
    async fn test_valid_token_loads_roles() {
        let store = Arc::new(InMemoryBillingStore::new());
        let user = create_test_user(&store).await;
        let auth_state = setup_auth_state(store);
        let token = auth_state.jwt_manager.issue(user.id).unwrap();

        let (status, body) = call(protected(auth_state), Some(format!("Bearer {}", token))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "test@example.com:Trader,User");
    }

    #[tokio::test]
    async fn test_scheme_is_case_insensitive() {
        let store = Arc::new(InMemoryBillingStore::new());
        let user = create_test_user(&store).await;
        let auth_state = setup_auth_state(store);
        let token = auth_state.jwt_manager.issue(user.id).unwrap();

        let (status, _) = call(protected(auth_state), Some(format!("bearer {}", token))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_header_rejected() {
        let auth_state = setup_auth_state(Arc::new(InMemoryBillingStore::new()));
        let (status, body) = call(protected(auth_state), None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, r#"{"error":"unauthorized"}"#);
    }

    #[tokio::test]
    async fn test_wrong_scheme_rejected() {
        let store = Arc::new(InMemoryBillingStore::new());
        let user = create_test_user(&store).await;
        let auth_state = setup_auth_state(store);
        let token = auth_state.jwt_manager.issue(user.id).unwrap();

        let (status, _) = call(protected(auth_state), Some(format!("Basic {}", token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_forged_token_rejected() {
        let store = Arc::new(InMemoryBillingStore::new());
        let user = create_test_user(&store).await;
        let forged = JwtManager::new("attacker-secret").issue(user.id).unwrap();

        let (status, _) = call(
            protected(setup_auth_state(store)),
            Some(format!("Bearer {}", forged)),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_token_for_unknown_user_rejected() {
        let auth_state = setup_auth_state(Arc::new(InMemoryBillingStore::new()));
        let token = auth_state.jwt_manager.issue(Uuid::new_v4()).unwrap();

        let (status, _) = call(protected(auth_state), Some(format!("Bearer {}", token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_optional_auth_allows_anonymous() {
        let auth_state = setup_auth_state(Arc::new(InMemoryBillingStore::new()));

        let (status, body) = call(optional(auth_state.clone()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");

        // Bad credentials degrade to anonymous rather than failing
        let (status, body) = call(optional(auth_state), Some("Bearer garbage".to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");
    }
}
