mod common;

use common::*;
use request_desk::domain::error::ServiceError;
use request_desk::domain::gateway::{META_CUSTOMER_EMAIL, META_PAYMENT_ID, META_REQUEST_ID};
use request_desk::domain::id::RequestId;
use request_desk::domain::ledger::LedgerStore;
use request_desk::domain::payment::PaymentStatus;
use request_desk::services::payment_orchestrator::initiate_payment;
use std::sync::atomic::Ordering;

// ── 1. Amount below price is a partial payment ─────────────────────────────

#[tokio::test]
async fn amount_below_price_is_partial() {
    let (ledger, gateway) = fresh().await;
    let request = seed_request(&ledger, "u_1", Some("500.00")).await;

    let reference = initiate_payment(
        &ledger,
        &gateway,
        &settings(),
        &client("u_1"),
        &request.id,
        intent("200.00", "key-partial-0001"),
    )
    .await
    .unwrap();

    assert_eq!(reference.status, PaymentStatus::Partial);
    assert!(!reference.replayed);
    assert!(reference.checkout_url.is_some());

    let payment = ledger.get_payment(reference.payment_id).await.unwrap().unwrap();
    assert!(!payment.is_confirmed());
    assert_eq!(payment.status(), PaymentStatus::Partial);
    assert_eq!(
        payment.checkout_reference.as_ref(),
        Some(&reference.session_reference)
    );
    assert!(payment.session_id.is_none(), "session_id is set only on confirm");
}

// ── 2. Amount at or above price is a completed payment ─────────────────────

#[tokio::test]
async fn amount_at_or_above_price_is_completed() {
    let (ledger, gateway) = fresh().await;
    let request = seed_request(&ledger, "u_1", Some("500.00")).await;

    for (amount, key) in [("500.00", "key-exact-00001"), ("750.00", "key-over-000001")] {
        let reference = initiate_payment(
            &ledger,
            &gateway,
            &settings(),
            &client("u_1"),
            &request.id,
            intent(amount, key),
        )
        .await
        .unwrap();
        assert_eq!(reference.status, PaymentStatus::Completed, "amount {amount}");
    }

    // Still provisional until the gateway confirms.
    let payments = ledger.list_payments(&request.id).await.unwrap();
    assert_eq!(payments.len(), 2);
    assert!(payments.iter().all(|p| !p.is_confirmed()));
}

// ── 3. Unpriced requests cannot be paid ────────────────────────────────────

#[tokio::test]
async fn missing_or_zero_price_is_invalid_state() {
    let (ledger, gateway) = fresh().await;

    for price in [None, Some("0")] {
        let request = seed_request(&ledger, "u_1", price).await;
        let err = initiate_payment(
            &ledger,
            &gateway,
            &settings(),
            &client("u_1"),
            &request.id,
            intent("100.00", "key-noprice-001"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidState(_)), "got {err:?}");
        assert!(ledger.list_payments(&request.id).await.unwrap().is_empty());
    }
    assert_eq!(gateway.created_count(), 0);
}

// ── 4. Bad input is rejected before anything is written ────────────────────

#[tokio::test]
async fn non_positive_amount_and_bad_email_are_validation_errors() {
    let (ledger, gateway) = fresh().await;
    let request = seed_request(&ledger, "u_1", Some("500.00")).await;
    let before = ledger.snapshot().await;

    for amount in ["0", "-5.00"] {
        let err = initiate_payment(
            &ledger,
            &gateway,
            &settings(),
            &client("u_1"),
            &request.id,
            intent(amount, "key-badamount-1"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)), "got {err:?}");
    }

    let mut bad_email = intent("100.00", "key-bademail-01");
    bad_email.email = "not-an-email".to_string();
    let err = initiate_payment(
        &ledger,
        &gateway,
        &settings(),
        &client("u_1"),
        &request.id,
        bad_email,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)), "got {err:?}");

    assert_eq!(ledger.snapshot().await, before);
}

#[tokio::test]
async fn unknown_request_is_not_found() {
    let (ledger, gateway) = fresh().await;
    let err = initiate_payment(
        &ledger,
        &gateway,
        &settings(),
        &client("u_1"),
        &RequestId::new("missing-request").unwrap(),
        intent("100.00", "key-missing-001"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)), "got {err:?}");
}

// ── 5. Gateway failure leaves no payment behind ────────────────────────────

#[tokio::test]
async fn gateway_failure_rolls_back_payment_row() {
    let ledger = request_desk::infra::memory::InMemoryLedger::new();
    let gateway = FakeGateway::failing();
    let request = seed_request(&ledger, "u_1", Some("500.00")).await;

    let err = initiate_payment(
        &ledger,
        &gateway,
        &settings(),
        &client("u_1"),
        &request.id,
        intent("500.00", "key-gwfail-0001"),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ServiceError::ExternalService(_)), "got {err:?}");
    assert!(ledger.list_payments(&request.id).await.unwrap().is_empty());
    assert_eq!(request_status(&ledger, &request.id).await, "submitted");

    // The same key works once the gateway recovers.
    gateway.fail_create.store(false, Ordering::SeqCst);
    let reference = initiate_payment(
        &ledger,
        &gateway,
        &settings(),
        &client("u_1"),
        &request.id,
        intent("500.00", "key-gwfail-0001"),
    )
    .await
    .unwrap();
    assert!(!reference.replayed);
    assert_eq!(ledger.list_payments(&request.id).await.unwrap().len(), 1);
}

// ── 6. Idempotent replay ───────────────────────────────────────────────────

#[tokio::test]
async fn same_key_replays_the_first_session() {
    let (ledger, gateway) = fresh().await;
    let request = seed_request(&ledger, "u_1", Some("500.00")).await;

    let first = initiate_payment(
        &ledger,
        &gateway,
        &settings(),
        &client("u_1"),
        &request.id,
        intent("500.00", "key-replay-0001"),
    )
    .await
    .unwrap();
    let second = initiate_payment(
        &ledger,
        &gateway,
        &settings(),
        &client("u_1"),
        &request.id,
        intent("500.00", "key-replay-0001"),
    )
    .await
    .unwrap();

    assert!(second.replayed);
    assert_eq!(second.payment_id, first.payment_id);
    assert_eq!(second.session_reference, first.session_reference);
    assert_eq!(second.checkout_url, first.checkout_url);
    assert_eq!(gateway.created_count(), 1);
    assert_eq!(ledger.list_payments(&request.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn same_key_with_different_amount_is_conflict() {
    let (ledger, gateway) = fresh().await;
    let request = seed_request(&ledger, "u_1", Some("500.00")).await;

    initiate_payment(
        &ledger,
        &gateway,
        &settings(),
        &client("u_1"),
        &request.id,
        intent("500.00", "key-conflict-01"),
    )
    .await
    .unwrap();
    let err = initiate_payment(
        &ledger,
        &gateway,
        &settings(),
        &client("u_1"),
        &request.id,
        intent("250.00", "key-conflict-01"),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ServiceError::Conflict(_)), "got {err:?}");
    assert_eq!(gateway.created_count(), 1);
}

#[tokio::test]
async fn distinct_keys_create_distinct_payments() {
    let (ledger, gateway) = fresh().await;
    let request = seed_request(&ledger, "u_1", Some("500.00")).await;

    let a = initiate_payment(
        &ledger,
        &gateway,
        &settings(),
        &client("u_1"),
        &request.id,
        intent("100.00", "key-distinct-a1"),
    )
    .await
    .unwrap();
    let b = initiate_payment(
        &ledger,
        &gateway,
        &settings(),
        &client("u_1"),
        &request.id,
        intent("100.00", "key-distinct-b1"),
    )
    .await
    .unwrap();

    assert_ne!(a.payment_id, b.payment_id);
    assert_ne!(a.session_reference, b.session_reference);
    assert_eq!(gateway.created_count(), 2);
}

// ── 7. What the gateway is asked for ───────────────────────────────────────

#[tokio::test]
async fn session_request_carries_metadata_and_minor_units() {
    let (ledger, gateway) = fresh().await;
    let request = seed_request(&ledger, "u_1", Some("500.00")).await;

    let reference = initiate_payment(
        &ledger,
        &gateway,
        &settings(),
        &client("u_1"),
        &request.id,
        intent("199.995", "key-metadata-01"),
    )
    .await
    .unwrap();

    let sent = gateway.last_request().unwrap();
    assert_eq!(sent.amount.get(), 20000, "half-up rounding to cents");
    assert_eq!(sent.payer_email, "payer@example.com");
    assert_eq!(sent.product_name, request.title);
    assert_eq!(
        sent.product_description,
        format!("Service Request ID: {}", request.id)
    );
    assert_eq!(
        sent.cancel_url,
        format!("https://app.test/requests/{}", request.id)
    );
    assert!(sent.success_url.contains("{CHECKOUT_SESSION_ID}"));
    assert_eq!(
        sent.idempotency_key,
        format!("{}:{}", request.id, reference.payment_id)
    );

    assert_eq!(
        sent.metadata.get(META_REQUEST_ID).map(String::as_str),
        Some(request.id.as_str())
    );
    assert_eq!(
        sent.metadata.get(META_PAYMENT_ID),
        Some(&reference.payment_id.to_string())
    );
    assert_eq!(
        sent.metadata.get(META_CUSTOMER_EMAIL).map(String::as_str),
        Some("payer@example.com")
    );
}

#[tokio::test]
async fn retry_after_lost_gateway_response_opens_a_session() {
    let (ledger, gateway) = fresh().await;
    let request = seed_request(&ledger, "u_1", Some("500.00")).await;
    gateway.lose_next_response.store(true, Ordering::SeqCst);

    let first = initiate_payment(
        &ledger,
        &gateway,
        &settings(),
        &client("u_1"),
        &request.id,
        intent("500.00", "key-lost-reply-1"),
    )
    .await;
    assert!(
        matches!(first, Err(ServiceError::ExternalService(_))),
        "got {first:?}"
    );
    assert!(ledger.snapshot().await.payments.is_empty());

    // The provider did create a session for the first attempt. The retry
    // must not collide with it.
    for _ in 0..3 {
        let retry = initiate_payment(
            &ledger,
            &gateway,
            &settings(),
            &client("u_1"),
            &request.id,
            intent("500.00", "key-lost-reply-1"),
        )
        .await
        .unwrap();
        assert_eq!(
            ledger.get_payment(retry.payment_id).await.unwrap().unwrap().checkout_reference,
            Some(retry.session_reference.clone())
        );
    }

    let sent = gateway.requests();
    assert_eq!(sent.len(), 2);
    assert_ne!(sent[0].idempotency_key, sent[1].idempotency_key);
    assert_eq!(ledger.snapshot().await.payments.len(), 1);
}

#[tokio::test]
async fn same_client_key_on_two_requests_is_independent() {
    let (ledger, gateway) = fresh().await;
    let first = seed_request(&ledger, "u_1", Some("500.00")).await;
    let second = seed_request(&ledger, "u_1", Some("80.00")).await;

    for (request, amount) in [(&first, "500.00"), (&second, "80.00")] {
        let reference = initiate_payment(
            &ledger,
            &gateway,
            &settings(),
            &client("u_1"),
            &request.id,
            intent(amount, "key-shared-00001"),
        )
        .await
        .unwrap();
        assert!(!reference.replayed);
    }

    assert_eq!(gateway.created_count(), 2);
}

// ── 8. Audit trail ─────────────────────────────────────────────────────────

#[tokio::test]
async fn rollback_is_audited() {
    let ledger = request_desk::infra::memory::InMemoryLedger::new();
    let gateway = FakeGateway::failing();
    let request = seed_request(&ledger, "u_1", Some("500.00")).await;

    let _ = initiate_payment(
        &ledger,
        &gateway,
        &settings(),
        &client("u_1"),
        &request.id,
        intent("500.00", "key-audit-00001"),
    )
    .await;

    let actions: Vec<String> = ledger
        .snapshot()
        .await
        .audit
        .into_iter()
        .filter(|e| e.entity_type == "payment")
        .map(|e| e.action)
        .collect();
    assert_eq!(actions, vec!["created", "rolled_back"]);
}
