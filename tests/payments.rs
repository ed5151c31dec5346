use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use produce_delivery_api::{
    dto::payments::{GatewayTransaction, ResultState, WebhookData, WebhookEvent},
    error::AppError,
    models::{GatewayStatus, OrderStatus},
    routes::payments,
    services::{
        payments::{
            EventVerifier, HttpTransactionLookup, IntegritySigner, SandboxGateway,
            TransactionLookup, WebhookOutcome, handle_event, resolve_result,
        },
        store::{MemoryStore, OrderStore},
    },
    state::PaymentsState,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

const INTEGRITY_SECRET: &str = "test_integrity_secret";
const EVENTS_SECRET: &str = "test_events_secret";

fn event(reference: &str, transaction_id: &str, status: &str) -> WebhookEvent {
    WebhookEvent {
        event: "transaction.updated".into(),
        data: WebhookData {
            transaction: GatewayTransaction {
                id: transaction_id.into(),
                status: status.into(),
                reference: reference.into(),
                amount_in_cents: 6_500_000,
                currency: "COP".into(),
            },
        },
        signature: None,
        timestamp: Some(1_735_689_600),
    }
}

fn payments_state(store: Arc<MemoryStore>, verify_events: bool, signer: Option<&str>) -> PaymentsState {
    let sandbox = SandboxGateway::new();
    let store: Arc<dyn OrderStore> = store;
    PaymentsState {
        store,
        signer: IntegritySigner::new(signer.map(String::from)),
        verifier: EventVerifier::new(verify_events, Some(EVENTS_SECRET.into())),
        lookup: Arc::new(sandbox.clone()),
        sandbox,
        poll_attempts: 1,
        poll_interval: Duration::from_millis(10),
        result_url: "/checkout/result".into(),
    }
}

fn app(state: PaymentsState) -> Router {
    Router::new()
        .nest("/api", payments::router())
        .merge(payments::public_router())
        .with_state(state)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

#[tokio::test]
async fn declined_payment_cancels_the_order() {
    let store = MemoryStore::new();
    let order = store.add_order("Restaurante El Cielo", OrderStatus::PendingApproval);

    let outcome = handle_event(
        &store,
        &EventVerifier::disabled(),
        &event(&order.to_string(), "tx-1", "DECLINED"),
    )
    .await
    .expect("handled");

    assert_eq!(
        outcome,
        WebhookOutcome::Applied {
            order_id: order,
            status: OrderStatus::Cancelled
        }
    );
    assert_eq!(store.order_status(order), Some(OrderStatus::Cancelled));
}

#[tokio::test]
async fn late_approval_does_not_reopen_a_cancelled_order() {
    let store = MemoryStore::new();
    let order = store.add_order("Fruver El Campo", OrderStatus::Cancelled);

    let outcome = handle_event(
        &store,
        &EventVerifier::disabled(),
        &event(&order.to_string(), "tx-late", "APPROVED"),
    )
    .await
    .expect("handled");

    assert_eq!(
        outcome,
        WebhookOutcome::Stale {
            order_id: order,
            status: OrderStatus::Cancelled
        }
    );
    assert_eq!(store.order_status(order), Some(OrderStatus::Cancelled));
}

#[tokio::test]
async fn repeated_approval_is_idempotent() {
    let store = MemoryStore::new();
    let order = store.add_order("Hotel Dann", OrderStatus::PendingApproval);
    let approved = event(&order.to_string(), "tx-approved", "APPROVED");
    let verifier = EventVerifier::disabled();

    for _ in 0..2 {
        handle_event(&store, &verifier, &approved).await.expect("handled");
        assert_eq!(store.order_status(order), Some(OrderStatus::Approved));
        assert_eq!(store.order_transaction(order).as_deref(), Some("tx-approved"));
    }
}

#[tokio::test]
async fn late_events_do_not_regress_an_approved_order() {
    let store = MemoryStore::new();
    let order = store.add_order("Cafetería La 70", OrderStatus::PendingApproval);
    let verifier = EventVerifier::disabled();
    let reference = order.to_string();

    handle_event(&store, &verifier, &event(&reference, "tx-2", "APPROVED"))
        .await
        .expect("approved");
    let outcome = handle_event(&store, &verifier, &event(&reference, "tx-1", "PENDING"))
        .await
        .expect("stale");

    assert_eq!(
        outcome,
        WebhookOutcome::Stale {
            order_id: order,
            status: OrderStatus::Approved
        }
    );
    assert_eq!(store.order_status(order), Some(OrderStatus::Approved));
    assert_eq!(store.order_transaction(order).as_deref(), Some("tx-2"));
}

#[tokio::test]
async fn other_events_and_unknown_references_are_acknowledged() {
    let store = MemoryStore::new();
    let verifier = EventVerifier::disabled();

    let mut other = event(&Uuid::new_v4().to_string(), "tx-3", "APPROVED");
    other.event = "nequi_token.updated".into();
    assert_eq!(
        handle_event(&store, &verifier, &other).await.expect("ignored"),
        WebhookOutcome::IgnoredEvent("nequi_token.updated".into())
    );

    let unknown = event("order-1", "tx-4", "APPROVED");
    assert_eq!(
        handle_event(&store, &verifier, &unknown).await.expect("unknown"),
        WebhookOutcome::UnknownOrder("order-1".into())
    );
}

#[tokio::test]
async fn webhook_route_rejects_bad_checksums_before_writing() {
    let store = Arc::new(MemoryStore::new());
    let order = store.add_order("Hotel Dann", OrderStatus::PendingApproval);
    let state = payments_state(store.clone(), true, Some(INTEGRITY_SECRET));

    let mut forged = serde_json::to_value(event(&order.to_string(), "tx-9", "APPROVED"))
        .expect("event json");
    forged["signature"] = json!({ "checksum": "deadbeef", "properties": [] });

    let (status, body) = send(app(state.clone()), post_json("/api/payments/webhook", &forged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
    assert_eq!(store.order_status(order), Some(OrderStatus::PendingApproval));

    let mut signed = event(&order.to_string(), "tx-9", "APPROVED");
    let checksum = state
        .verifier
        .checksum(&signed.data.transaction, signed.timestamp.unwrap_or_default())
        .expect("checksum");
    signed.signature = serde_json::from_value(json!(checksum)).ok();
    let signed = serde_json::to_value(signed).expect("event json");

    let (status, body) = send(app(state), post_json("/api/payments/webhook", &signed)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));
    assert_eq!(store.order_status(order), Some(OrderStatus::Approved));
}

#[tokio::test]
async fn malformed_webhook_bodies_are_rejected() {
    let state = payments_state(Arc::new(MemoryStore::new()), false, None);
    let (status, body) = send(
        app(state),
        post_json("/api/payments/webhook", &json!({ "event": "transaction.updated" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn integrity_endpoint_needs_a_secret() {
    let request = json!({ "reference": "order-1", "amountInCents": 2500000, "currency": "COP" });

    let missing = payments_state(Arc::new(MemoryStore::new()), false, None);
    let (status, body) = send(app(missing), post_json("/api/payments/integrity", &request)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.get("hash").is_none());
    assert!(
        body["error"]
            .as_str()
            .is_some_and(|e| e.contains("not configured"))
    );

    let configured = payments_state(Arc::new(MemoryStore::new()), false, Some(INTEGRITY_SECRET));
    let expected = configured
        .signer
        .sign("order-1", 2_500_000, "COP")
        .expect("sign");
    let (status, body) = send(app(configured), post_json("/api/payments/integrity", &request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hash"], json!(expected));
}

#[tokio::test]
async fn sandbox_checkout_settles_the_order_and_redirects() {
    let store = Arc::new(MemoryStore::new());
    let order = store.add_order("Restaurante El Cielo", OrderStatus::PendingApproval);
    let state = payments_state(store.clone(), true, Some(INTEGRITY_SECRET));
    let reference = order.to_string();
    let integrity = state.signer.sign(&reference, 6_500_000, "COP").expect("sign");

    // tampered amount
    let (status, _) = send(
        app(state.clone()),
        get(&format!(
            "/sandbox/checkout?reference={reference}&amount-in-cents=100&currency=COP&signature:integrity={integrity}"
        )),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(store.order_status(order), Some(OrderStatus::PendingApproval));

    let response = app(state.clone())
        .oneshot(get(&format!(
            "/sandbox/checkout?reference={reference}&amount-in-cents=6500000&currency=COP&signature:integrity={integrity}"
        )))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("location")
        .to_string();
    assert!(location.starts_with("/checkout/result?id=sbx-"), "{location}");
    assert_eq!(store.order_status(order), Some(OrderStatus::Approved));

    let (status, body) = send(app(state.clone()), get(&location)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], json!("success"));
    assert_eq!(body["status"], json!("APPROVED"));

    let transaction_id = location.trim_start_matches("/checkout/result?id=");
    let (status, body) = send(app(state), get(&format!("/sandbox/status?id={transaction_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["reference"], json!(reference));
}

#[tokio::test]
async fn declined_sandbox_outcome_shows_an_error_result() {
    let store = Arc::new(MemoryStore::new());
    let order = store.add_order("Hotel Dann", OrderStatus::PendingApproval);
    let state = payments_state(store.clone(), false, Some(INTEGRITY_SECRET));
    let reference = order.to_string();
    let integrity = state.signer.sign(&reference, 1000, "COP").expect("sign");

    let response = app(state.clone())
        .oneshot(get(&format!(
            "/sandbox/checkout?reference={reference}&amount-in-cents=1000&currency=COP&signature:integrity={integrity}&outcome=DECLINED&redirect-url=https://shop.example.test/result"
        )))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers()[header::LOCATION]
        .to_str()
        .expect("location")
        .to_string();
    assert!(location.starts_with("https://shop.example.test/result?id=sbx-"));
    assert_eq!(store.order_status(order), Some(OrderStatus::Cancelled));

    let (_, body) = send(
        app(state),
        get(&format!("/checkout/result?{}", location.split_once('?').expect("query").1)),
    )
    .await;
    assert_eq!(body["state"], json!("error"));
}

#[tokio::test]
async fn unknown_transactions_read_as_pending() {
    let state = payments_state(Arc::new(MemoryStore::new()), false, None);
    let (status, body) = send(app(state.clone()), get("/checkout/result?id=sbx-missing")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], json!("pending"));
    assert!(body["status"].is_null());

    let (status, _) = send(app(state), get("/sandbox/status?id=sbx-missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn http_lookup_reads_the_gateway_status_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/transactions"))
        .and(query_param("id", "tx-approved"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": "tx-approved", "status": "APPROVED", "reference": "order-1" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/transactions"))
        .and(query_param("id", "tx-pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": "tx-pending", "status": "PENDING" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/transactions"))
        .and(query_param("id", "tx-missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/transactions"))
        .and(query_param("id", "tx-broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let lookup = HttpTransactionLookup::new(format!("{}/v1/transactions", server.uri()))
        .expect("client");

    assert_eq!(
        lookup.transaction_status("tx-approved").await.expect("status"),
        GatewayStatus::Approved
    );
    assert!(matches!(
        lookup.transaction_status("tx-missing").await,
        Err(AppError::NotFound)
    ));
    assert!(matches!(
        lookup.transaction_status("tx-broken").await,
        Err(AppError::Gateway(_))
    ));

    let view = resolve_result(&lookup, "tx-approved", 1, Duration::ZERO).await;
    assert_eq!(view.state, ResultState::Success);
    let view = resolve_result(&lookup, "tx-pending", 3, Duration::from_millis(5)).await;
    assert_eq!(view.state, ResultState::Pending);
    assert_eq!(view.status.as_deref(), Some("PENDING"));
    let view = resolve_result(&lookup, "tx-broken", 1, Duration::ZERO).await;
    assert_eq!(view.state, ResultState::Pending);
    assert!(view.status.is_none());
}
