mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use request_desk::domain::id::SessionRef;
use request_desk::infra::memory::InMemoryLedger;
use request_desk::services::reconciler::{MSG_ALREADY_CONFIRMED, MSG_CONFIRMED};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

fn get(uri: &str, actor: Option<(&str, &str)>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some((id, role)) = actor {
        builder = builder.header("X-Actor-Id", id).header("X-Actor-Role", role);
    }
    builder.body(Body::empty()).unwrap()
}

fn send_json(
    method: &str,
    uri: &str,
    actor: Option<(&str, &str)>,
    extra: &[(&str, &str)],
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some((id, role)) = actor {
        builder = builder.header("X-Actor-Id", id).header("X-Actor-Role", role);
    }
    for (name, value) in extra {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

// ── 1. Health and routing ──────────────────────────────────────────────────

#[tokio::test]
async fn health_is_ok() {
    let app = test_app(&InMemoryLedger::new(), Arc::new(FakeGateway::new()));
    let response = app.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_request_is_404_json() {
    let app = test_app(&InMemoryLedger::new(), Arc::new(FakeGateway::new()));
    let response = app
        .oneshot(get("/requests/does-not-exist", Some(("staff_1", "staff"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "not_found");
    assert!(body["message"].as_str().unwrap().contains("does-not-exist"));
}

// ── 2. Intake over HTTP ────────────────────────────────────────────────────

#[tokio::test]
async fn create_request_returns_201_with_owner() {
    let ledger = InMemoryLedger::new();
    let app = test_app(&ledger, Arc::new(FakeGateway::new()));

    let response = app
        .oneshot(send_json(
            "POST",
            "/requests",
            Some(("u_7", "client")),
            &[("Accept-Language", "es-ES,es;q=0.9")],
            json!({
                "title": "Analytics dashboard",
                "service": "DATA_ANALYTICS",
                "description": "Weekly KPI board",
                "contactEmail": "client@example.com"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "SUBMITTED");
    assert_eq!(body["owner"], "u_7");
    assert!(body["price"].is_null());

    let pending = ledger.pending_notifications().await;
    match &pending[0] {
        request_desk::domain::notification::Notification::RequestCreated { locale, .. } => {
            assert_eq!(locale, "es-ES");
        }
        other => panic!("unexpected notification: {other:?}"),
    }
}

#[tokio::test]
async fn foreign_client_gets_403() {
    let ledger = InMemoryLedger::new();
    let request = seed_request(&ledger, "u_1", None).await;
    let app = test_app(&ledger, Arc::new(FakeGateway::new()));

    let response = app
        .oneshot(get(&format!("/requests/{}", request.id), Some(("u_2", "client"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error_code"], "forbidden");
}

#[tokio::test]
async fn unknown_role_header_is_422() {
    let app = test_app(&InMemoryLedger::new(), Arc::new(FakeGateway::new()));
    let response = app
        .oneshot(get("/requests/anything", Some(("u_1", "superuser"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn client_cannot_patch_request() {
    let ledger = InMemoryLedger::new();
    let request = seed_request(&ledger, "u_1", None).await;
    let app = test_app(&ledger, Arc::new(FakeGateway::new()));

    let response = app
        .oneshot(send_json(
            "PATCH",
            &format!("/requests/{}", request.id),
            Some(("u_1", "client")),
            &[],
            json!({ "price": "10.00" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn reviews_are_readable_over_http() {
    let ledger = InMemoryLedger::new();
    let request = seed_request(&ledger, "u_1", None).await;
    let app = test_app(&ledger, Arc::new(FakeGateway::new()));
    let uri = format!("/requests/{}/reviews", request.id);

    let response = app
        .clone()
        .oneshot(send_json(
            "POST",
            &uri,
            Some(("u_1", "client")),
            &[],
            json!({ "rating": 4, "comment": "fast turnaround" }),
        ))
        .await
        .unwrap();
    assert!(response.status().is_success());

    let response = app
        .clone()
        .oneshot(get(&uri, Some(("staff_1", "staff"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body[0]["rating"], 4);
    assert_eq!(body[0]["comment"], "fast turnaround");

    let response = app
        .oneshot(get(&format!("/requests/{}", request.id), Some(("u_1", "client"))))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["reviews"][0]["author"], "u_1");
}

// ── 3. Payments over HTTP ──────────────────────────────────────────────────

#[tokio::test]
async fn initiate_without_idempotency_key_is_422() {
    let ledger = InMemoryLedger::new();
    let request = seed_request(&ledger, "u_1", Some("500.00")).await;
    let app = test_app(&ledger, Arc::new(FakeGateway::new()));

    let response = app
        .oneshot(send_json(
            "POST",
            &format!("/requests/{}/payment", request.id),
            Some(("u_1", "client")),
            &[],
            json!({ "amount": "500.00", "email": "payer@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "validation_error");
    assert!(ledger.snapshot().await.payments.is_empty());
}

#[tokio::test]
async fn unpriced_request_is_400() {
    let ledger = InMemoryLedger::new();
    let request = seed_request(&ledger, "u_1", None).await;
    let app = test_app(&ledger, Arc::new(FakeGateway::new()));

    let response = app
        .oneshot(send_json(
            "POST",
            &format!("/requests/{}/payment", request.id),
            Some(("u_1", "client")),
            &[("Idempotency-Key", "key-http-unpriced")],
            json!({ "amount": "500.00", "email": "payer@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_code"], "invalid_state");
}

#[tokio::test]
async fn gateway_outage_is_503() {
    let ledger = InMemoryLedger::new();
    let request = seed_request(&ledger, "u_1", Some("500.00")).await;
    let app = test_app(&ledger, Arc::new(FakeGateway::failing()));

    let response = app
        .oneshot(send_json(
            "POST",
            &format!("/requests/{}/payment", request.id),
            Some(("u_1", "client")),
            &[("Idempotency-Key", "key-http-outage1")],
            json!({ "amount": "500.00", "email": "payer@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body_json(response).await["error_code"],
        "external_service_error"
    );
    assert!(ledger.snapshot().await.payments.is_empty());
}

#[tokio::test]
async fn pay_then_confirm_over_http() {
    let ledger = InMemoryLedger::new();
    let gateway = Arc::new(FakeGateway::new());
    let request = seed_request(&ledger, "u_1", Some("500.00")).await;
    let app = test_app(&ledger, gateway.clone());

    let response = app
        .clone()
        .oneshot(send_json(
            "POST",
            &format!("/requests/{}/payment", request.id),
            Some(("u_1", "client")),
            &[("Idempotency-Key", "key-http-flow01")],
            json!({ "amount": "250.00", "email": "payer@example.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let checkout = body_json(response).await;
    assert_eq!(checkout["status"], "PARTIAL");
    assert_eq!(checkout["replayed"], false);
    assert!(checkout["checkoutUrl"].as_str().unwrap().starts_with("https://"));
    let session = checkout["sessionReference"].as_str().unwrap().to_string();

    gateway.complete(&SessionRef::new(session.clone()).unwrap());

    let confirm_uri = format!("/payments/confirm-session?session_id={session}");
    let response = app.clone().oneshot(get(&confirm_uri, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], MSG_CONFIRMED);
    assert_eq!(body["currency"], "USD");
    assert_eq!(body["paymentId"], checkout["paymentId"]);
    assert_eq!(body["requestId"], request.id.as_str());

    let response = app.oneshot(get(&confirm_uri, None)).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["message"], MSG_ALREADY_CONFIRMED);
    assert_eq!(request_status(&ledger, &request.id).await, "payment_received");
}

#[tokio::test]
async fn replayed_initiation_returns_same_session() {
    let ledger = InMemoryLedger::new();
    let gateway = Arc::new(FakeGateway::new());
    let request = seed_request(&ledger, "u_1", Some("500.00")).await;
    let app = test_app(&ledger, gateway.clone());
    let call = || {
        send_json(
            "POST",
            &format!("/requests/{}/payment", request.id),
            Some(("u_1", "client")),
            &[("Idempotency-Key", "key-http-replay1")],
            json!({ "amount": "500.00", "email": "payer@example.com" }),
        )
    };

    let first = body_json(app.clone().oneshot(call()).await.unwrap()).await;
    let second = body_json(app.oneshot(call()).await.unwrap()).await;

    assert_eq!(second["replayed"], true);
    assert_eq!(second["paymentId"], first["paymentId"]);
    assert_eq!(second["sessionReference"], first["sessionReference"]);
    assert_eq!(gateway.created_count(), 1);
}

// ── 4. Webhook authentication ──────────────────────────────────────────────

#[tokio::test]
async fn webhook_without_signature_is_400() {
    let app = test_app(&InMemoryLedger::new(), Arc::new(FakeGateway::new()));
    let response = app
        .oneshot(send_json(
            "POST",
            "/webhooks/stripe",
            None,
            &[],
            json!({ "id": "evt_1", "type": "checkout.session.completed" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_code"], "webhook_error");
}

#[tokio::test]
async fn webhook_with_forged_signature_is_400() {
    let ledger = InMemoryLedger::new();
    let app = test_app(&ledger, Arc::new(FakeGateway::new()));
    let response = app
        .oneshot(send_json(
            "POST",
            "/webhooks/stripe",
            None,
            &[("Stripe-Signature", "t=1700000000,v1=deadbeef")],
            json!({ "id": "evt_1", "type": "checkout.session.completed" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(ledger.snapshot().await.audit.is_empty());
}
