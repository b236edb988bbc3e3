//! Router tests against the in-memory store and fake payment gateways

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use journal_billing::{
    providers::{CheckoutRequest, InvoiceCallback, SnapStatus, WebhookRequest},
    BillingConfig, BillingError, BillingResult, BillingService, BillingStore, CheckoutSession, Gateway, Idr,
    InMemoryBillingStore, NoopNotifier, OrderStatus, PaymentGateway, PaymentLog, Plan,
    ProviderUpdate, Role, UserAccount,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::{auth::JwtManager, config::Config, routes::create_router, state::AppState};

const CALLBACK_TOKEN: &str = "cb-token";

/// Hosted checkout stand-in. Snap status polls report `settlement` for the
/// configured order and amount.
struct FakeGateway {
    gateway: Gateway,
    settled: Option<(String, i64)>,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn gateway(&self) -> Gateway {
        self.gateway
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> BillingResult<CheckoutSession> {
        Ok(CheckoutSession {
            redirect_url: format!("https://pay.example/{}", request.order_id),
            token: (self.gateway == Gateway::Snap).then(|| "snap-token".to_string()),
        })
    }

    async fn verify_webhook(&self, request: WebhookRequest<'_>) -> BillingResult<ProviderUpdate> {
        if request.callback_token != Some(CALLBACK_TOKEN) {
            return Err(BillingError::Unauthorized);
        }
        let body: Value = serde_json::from_str(request.body)
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;
        Ok(ProviderUpdate::Invoice(InvoiceCallback::from_json(&body)))
    }

    async fn fetch_status(&self, order_id: &str) -> BillingResult<ProviderUpdate> {
        match &self.settled {
            Some((id, amount)) if id == order_id => Ok(ProviderUpdate::Snap(SnapStatus {
                order_id: id.clone(),
                transaction_status: "settlement".into(),
                status_code: Some("200".into()),
                gross_amount: Some(Idr(*amount)),
                ..Default::default()
            })),
            _ => Err(BillingError::OrderNotFound(order_id.to_string())),
        }
    }
}

struct TestApp {
    router: Router,
    store: Arc<InMemoryBillingStore>,
    jwt: JwtManager,
}

impl TestApp {
    fn new() -> Self {
        Self::with_settled(None)
    }

    fn with_settled(settled: Option<(&str, i64)>) -> Self {
        let store = Arc::new(InMemoryBillingStore::new());
        let config = Config::for_tests();
        let billing = BillingService::with_gateways(
            store.clone(),
            &BillingConfig::default(),
            Arc::new(FakeGateway {
                gateway: Gateway::Invoice,
                settled: None,
            }),
            Arc::new(FakeGateway {
                gateway: Gateway::Snap,
                settled: settled.map(|(id, amount)| (id.to_string(), amount)),
            }),
            Arc::new(NoopNotifier),
        )
        .unwrap();

        let state = AppState::with_billing(billing, config);
        Self {
            jwt: state.jwt_manager.clone(),
            router: create_router(state),
            store,
        }
    }

    async fn user(&self, email: &str, roles: impl IntoIterator<Item = Role>) -> (UserAccount, String) {
        let user = UserAccount::new(email).with_roles(roles);
        self.store.insert_user(user.clone()).await;
        let token = self.jwt.issue(user.id).unwrap();
        (user, token)
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let (status, body) = app.send(get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_pricing_is_public_and_seeded() {
    let app = TestApp::new();
    let (status, body) = app.send(get("/pricing", None)).await;

    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), Plan::ALL.len());
    let yearly = rows.iter().find(|r| r["plan"] == "yearly").unwrap();
    assert_eq!(yearly["currentUsd"], json!(18.0));
    assert_eq!(yearly["currentIdr"], json!(270_000));
}

#[tokio::test]
async fn test_pricing_update_requires_developer() {
    let app = TestApp::new();
    let body = json!({ "items": [{ "plan": "monthly", "currentUsd": 3 }] });

    let (status, err) = app.send(json_request("PATCH", "/pricing", None, body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err, json!({ "error": "unauthorized" }));

    let (_, trader) = app.user("trader@example.com", [Role::Trader]).await;
    let (status, err) = app
        .send(json_request("PATCH", "/pricing", Some(&trader), body.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err, json!({ "error": "forbidden_user" }));

    let (_, dev) = app.user("dev@example.com", [Role::Developer]).await;
    let (status, rows) = app.send(json_request("PATCH", "/pricing", Some(&dev), body)).await;
    assert_eq!(status, StatusCode::OK);
    let monthly = rows.as_array().unwrap().iter().find(|r| r["plan"] == "monthly").unwrap();
    assert_eq!(monthly["currentUsd"], json!(3.0));

    let (status, rows) = app
        .send(json_request("POST", "/pricing/reset", Some(&dev), Value::Null))
        .await;
    assert_eq!(status, StatusCode::OK);
    let monthly = rows.as_array().unwrap().iter().find(|r| r["plan"] == "monthly").unwrap();
    assert_eq!(monthly["currentUsd"], json!(2.0));
}

#[tokio::test]
async fn test_invalid_token_rejected() {
    let app = TestApp::new();
    let forged = JwtManager::new("another-secret").issue(uuid::Uuid::new_v4()).unwrap();

    let (status, err) = app.send(get("/coupons", Some(&forged))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err["error"], "unauthorized");
}

#[tokio::test]
async fn test_redeem_requires_login() {
    let app = TestApp::new();
    let (status, err) = app
        .send(json_request(
            "POST",
            "/redeem/validate",
            None,
            json!({ "plan": "yearly", "code": "WELCOME10" }),
        ))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err, json!({ "error": "login_required" }));
}

#[tokio::test]
async fn test_coupon_lifecycle_and_redeem() {
    let app = TestApp::new();
    let (_, creator) = app.user("creator@example.com", [Role::Creator]).await;
    let (_, buyer) = app.user("buyer@example.com", [Role::User]).await;

    let (status, coupon) = app
        .send(json_request(
            "POST",
            "/coupons",
            Some(&creator),
            json!({ "code": "welcome10", "percent": 10, "durationDays": 7 }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(coupon["code"], "WELCOME10");

    let (status, quote) = app
        .send(json_request(
            "POST",
            "/redeem/validate",
            Some(&buyer),
            json!({ "plan": "yearly", "code": "WELCOME10" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["ok"], true);
    assert_eq!(quote["final"], json!(16.2));

    let (status, listed) = app.send(get("/coupons", Some(&creator))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed[0]["usageCount"], 0);

    let (status, _) = app
        .send(
            Request::builder()
                .method("DELETE")
                .uri("/coupons/WELCOME10")
                .header(header::AUTHORIZATION, format!("Bearer {}", creator))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, err) = app
        .send(json_request(
            "POST",
            "/redeem/validate",
            Some(&buyer),
            json!({ "plan": "yearly", "code": "WELCOME10" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err, json!({ "error": "invalid_code" }));
}

#[tokio::test]
async fn test_coupon_validation_errors() {
    let app = TestApp::new();
    let (_, dev) = app.user("dev@example.com", [Role::Developer]).await;

    let (status, err) = app
        .send(json_request(
            "POST",
            "/coupons",
            Some(&dev),
            json!({ "code": "BIG", "percent": 50, "durationDays": 7 }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "invalid_percent");

    let (status, err) = app
        .send(json_request(
            "POST",
            "/coupons",
            Some(&dev),
            json!({ "code": "LONG", "percent": 5, "durationDays": 30 }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "invalid_duration");
}

#[tokio::test]
async fn test_malformed_body_is_invalid_payload() {
    let app = TestApp::new();
    let (_, token) = app.user("u@example.com", [Role::User]).await;

    let request = Request::builder()
        .method("POST")
        .uri("/xendit/create")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from("{not json"))
        .unwrap();
    let (status, err) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "invalid_payload");
}

#[tokio::test]
async fn test_xendit_checkout_then_webhook_grants() {
    let app = TestApp::new();
    let (user, token) = app.user("payer@example.com", [Role::Whitelist]).await;

    let (status, created) = app
        .send(json_request(
            "POST",
            "/xendit/create",
            Some(&token),
            json!({ "plan": "monthly", "email": "payer@example.com" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let order_id = created["order_id"].as_str().unwrap().to_string();
    assert!(order_id.starts_with("invoice-monthly-"));
    assert_eq!(created["invoice_url"], format!("https://pay.example/{}", order_id));
    assert_eq!(app.store.order(&order_id).await.unwrap().status, OrderStatus::Pending);

    let callback = json!({ "external_id": order_id, "status": "PAID", "amount": 30000 });

    let rejected = Request::builder()
        .method("POST")
        .uri("/xendit/webhook")
        .header("x-callback-token", "wrong")
        .body(Body::from(callback.to_string()))
        .unwrap();
    let (status, _) = app.send(rejected).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(app.store.webhook_logs().await.is_empty());

    let accepted = Request::builder()
        .method("POST")
        .uri("/api/webhook/xendit")
        .header("x-callback-token", CALLBACK_TOKEN)
        .body(Body::from(callback.to_string()))
        .unwrap();
    let (status, body) = app.send(accepted).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "granted");

    let account = app.store.user(user.id).await.unwrap();
    assert!(account.roles.contains(Role::Trader));
    assert!(!account.roles.contains(Role::Whitelist));
    assert_eq!(app.store.webhook_logs().await.len(), 1);
}

#[tokio::test]
async fn test_tampered_webhook_still_acknowledged() {
    let app = TestApp::new();
    let (user, _) = app.user("tamper@example.com", [Role::User]).await;
    let order = PaymentLog::pending("invoice-monthly-1-1", user.id, Some(Plan::Monthly), Idr(30_000), None);
    app.store.insert_order(&order).await.unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/xendit/webhook")
        .header("x-callback-token", CALLBACK_TOKEN)
        .body(Body::from(
            json!({ "external_id": "invoice-monthly-1-1", "status": "PAID", "amount": 5000 }).to_string(),
        ))
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "amount_mismatch");
    assert_eq!(app.store.order("invoice-monthly-1-1").await.unwrap().status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_checkout_missing_plan() {
    let app = TestApp::new();
    let (_, token) = app.user("u@example.com", [Role::User]).await;

    let (status, err) = app
        .send(json_request("POST", "/midtrans/create", Some(&token), json!({ "email": "u@example.com" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err, json!({ "error": "missing_fields" }));
}

#[tokio::test]
async fn test_midtrans_create_returns_client_details() {
    let app = TestApp::new();
    let (_, token) = app.user("snap@example.com", [Role::User]).await;

    let (status, body) = app
        .send(json_request(
            "POST",
            "/midtrans/create",
            Some(&token),
            json!({ "plan": "quarterly", "email": "snap@example.com" }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token"], "snap-token");
    assert_eq!(body["isProduction"], false);
    assert!(body["clientKey"].is_string());
    assert!(body["order_id"].as_str().unwrap().starts_with("midtrans-quarterly-"));
}

#[tokio::test]
async fn test_status_poll_recovers_paid_order() {
    let app = TestApp::with_settled(Some(("midtrans-monthly-1-1", 30_000)));
    let (user, token) = app.user("lost@example.com", [Role::User]).await;
    let order = PaymentLog {
        status: OrderStatus::Paid,
        ..PaymentLog::pending("midtrans-monthly-1-1", user.id, Some(Plan::Monthly), Idr(30_000), None)
    };
    app.store.insert_order(&order).await.unwrap();

    let (status, body) = app.send(get("/midtrans/status/midtrans-monthly-1-1", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "PAID" }));
    assert!(app.store.user(user.id).await.unwrap().roles.contains(Role::Trader));

    let (status, body) = app.send(get("/midtrans/check/midtrans-monthly-1-1", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["midtransStatus"], "settlement");
}

#[tokio::test]
async fn test_status_poll_rejects_malformed_id() {
    let app = TestApp::new();
    let (_, token) = app.user("u@example.com", [Role::User]).await;

    let (status, err) = app.send(get("/midtrans/status/not-an-order", Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "invalid_payload");
}

#[tokio::test]
async fn test_status_poll_unknown_order() {
    let app = TestApp::new();
    let (_, token) = app.user("u@example.com", [Role::User]).await;

    let (status, err) = app.send(get("/midtrans/status/midtrans-monthly-9-9", Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["error"], "order_not_found");
}

#[tokio::test]
async fn test_paypal_webhook_acknowledged() {
    let app = TestApp::new();
    let (status, body) = app
        .send(json_request("POST", "/paypal/webhook", None, json!({ "event_type": "PAYMENT.CAPTURE.COMPLETED" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));
}

#[tokio::test]
async fn test_invariants_are_developer_only() {
    let app = TestApp::new();
    let (_, trader) = app.user("t@example.com", [Role::Trader]).await;
    let (_, dev) = app.user("d@example.com", [Role::Developer]).await;

    let (status, _) = app.send(get("/billing/invariants", Some(&trader))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, summary) = app.send(get("/billing/invariants", Some(&dev))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["healthy"], true);
    assert_eq!(summary["checks_run"], 4);
}
