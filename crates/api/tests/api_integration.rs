//! Integration tests for the API server.

use std::sync::OnceLock;

use api::config::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use booking_store::{BookingStore, InMemoryBookingStore, Reservation, ReservationStatus};
use chrono::{Duration, NaiveTime, Utc};
use common::{CustomerId, Money, ProductId, ReservationId};
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::InMemoryJobQueue;
use reconciler::{SIGNATURE_HEADER, sign};
use serde_json::{Value, json};
use tower::ServiceExt;

const SECRET: &str = "whsec_api";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn signed_config() -> Config {
    Config {
        webhook_signing_secret: Some(SECRET.to_string()),
        ..Config::default()
    }
}

fn setup_with(config: &Config) -> (axum::Router, InMemoryBookingStore, InMemoryJobQueue) {
    let store = InMemoryBookingStore::new();
    let queue = InMemoryJobQueue::new();
    let state = api::create_default_state(store.clone(), queue.clone(), config);
    let app = api::create_app(state, get_metrics_handle());
    (app, store, queue)
}

fn setup() -> axum::Router {
    setup_with(&signed_config()).0
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn pending_reservation(store: &InMemoryBookingStore) -> Reservation {
    let reservation = Reservation {
        id: ReservationId::new(),
        product_id: ProductId::new("douro-valley"),
        customer_id: CustomerId::new(),
        travel_date: (Utc::now() + Duration::days(10)).date_naive(),
        start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        duration_hours: 10,
        party_size: 2,
        quoted_price: Money::from_major(250),
        extras_total: Money::zero(),
        status: ReservationStatus::PendingPayment,
        created_at: Utc::now() - Duration::minutes(30),
        confirmed_at: None,
    };
    store.insert_reservation(&reservation).await.unwrap();
    reservation
}

fn event(kind: &str, data: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": "evt_api_1",
        "type": kind,
        "created": Utc::now().timestamp(),
        "data": data,
    }))
    .unwrap()
}

fn succeeded(reservation_id: ReservationId, tx: &str) -> Vec<u8> {
    event(
        "payment_succeeded",
        json!({
            "transaction_id": tx,
            "reservation_id": reservation_id,
            "amount": 25_000,
            "currency": "eur",
        }),
    )
}

fn amount(value: &Value) -> f64 {
    value.as_str().unwrap().parse().unwrap()
}

fn webhook_request(body: Vec<u8>, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/payments")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(body)).unwrap()
}

fn signed_webhook(body: Vec<u8>) -> Request<Body> {
    let header = sign(SECRET, Utc::now().timestamp(), &body).unwrap();
    webhook_request(body, Some(header))
}

fn quote_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/quotes")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn catalog() -> Value {
    json!([
        { "season": "low", "tier": "small", "min_people": 1, "max_people": 4, "price": "100.00" },
        { "season": "low", "tier": "group", "min_people": 5, "max_people": 8, "price": "120.00" },
        { "season": "high", "tier": "small", "min_people": 1, "max_people": 4, "price": "150.00" },
        { "season": "high", "tier": "group", "min_people": 5, "max_people": 8, "price": "25.00", "price_per_person": true }
    ])
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["webhook_signatures"], "enforced");
}

#[tokio::test]
async fn test_health_reports_disabled_signatures() {
    let (app, _, _) = setup_with(&Config::default());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["webhook_signatures"], "disabled");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_quote_priced() {
    let app = setup();

    let response = app
        .oneshot(quote_request(json!({
            "tiers": catalog(),
            "partySize": 6,
            "travelDate": "2025-01-15",
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "priced");
    assert_eq!(json["season"], "low");
    assert_eq!(json["tier"], "group");
    assert_eq!(json["total"], "120.00");
    assert_eq!(amount(&json["per_person_price"]), 20.0);
    assert_eq!(json["season_range"]["min"], "100.00");
    assert_eq!(json["season_range"]["max"], "120.00");
}

#[tokio::test]
async fn test_quote_per_person_in_high_season() {
    let app = setup();

    let response = app
        .oneshot(quote_request(json!({
            "tiers": catalog(),
            "party_size": 6,
            "travel_date": "2025-07-10",
        })))
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["status"], "priced");
    assert_eq!(json["season"], "high");
    assert_eq!(amount(&json["total"]), 150.0);
}

#[tokio::test]
async fn test_quote_no_match() {
    let app = setup();

    let response = app
        .oneshot(quote_request(json!({
            "tiers": catalog(),
            "party_size": 12,
            "travel_date": "2025-01-15",
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "no_match");
    assert_eq!(json["season"], "low");
    assert!(json.get("total").is_none());
    assert!(json.get("per_person_price").is_none());
}

#[tokio::test]
async fn test_quote_rejects_empty_party() {
    let app = setup();

    let response = app
        .oneshot(quote_request(json!({
            "tiers": catalog(),
            "party_size": 0,
            "travel_date": "2025-01-15",
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_quote_total_overflow_is_bad_request() {
    let app = setup();

    let response = app
        .oneshot(quote_request(json!({
            "tiers": [{
                "season": "low",
                "tier": "charter",
                "min_people": 1,
                "price": "79228162514264337593543950335",
                "price_per_person": true,
            }],
            "party_size": 2,
            "travel_date": "2025-01-15",
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("overflows"));
}

#[tokio::test]
async fn test_quote_rejects_bad_body() {
    let app = setup();

    let response = app
        .oneshot(quote_request(json!({ "party_size": 2 })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_confirms_reservation() {
    let (app, store, queue) = setup_with(&signed_config());
    let reservation = pending_reservation(&store).await;

    let response = app
        .oneshot(signed_webhook(succeeded(reservation.id, "pi_api_1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["received"], true);
    assert_eq!(json["result"], "confirmed");
    assert_eq!(json["reservation_id"], reservation.id.to_string());

    let stored = store.get_reservation(reservation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReservationStatus::Confirmed);
    assert_eq!(queue.job_count().await, 2);
}

#[tokio::test]
async fn test_webhook_duplicate_is_already_processed() {
    let (app, store, queue) = setup_with(&signed_config());
    let reservation = pending_reservation(&store).await;

    let first = app
        .clone()
        .oneshot(signed_webhook(succeeded(reservation.id, "pi_api_2")))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(signed_webhook(succeeded(reservation.id, "pi_api_2")))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let json = body_json(second).await;
    assert_eq!(json["result"], "already_processed");
    assert_eq!(queue.job_count().await, 2);
}

#[tokio::test]
async fn test_webhook_bad_signature_is_rejected() {
    let (app, store, _) = setup_with(&signed_config());
    let reservation = pending_reservation(&store).await;
    let body = succeeded(reservation.id, "pi_api_3");
    let forged = sign("whsec_other", Utc::now().timestamp(), &body).unwrap();

    let response = app
        .oneshot(webhook_request(body, Some(forged)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].is_string());

    let stored = store.get_reservation(reservation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReservationStatus::PendingPayment);
}

#[tokio::test]
async fn test_webhook_missing_signature_is_rejected() {
    let app = setup();

    let response = app
        .oneshot(webhook_request(
            succeeded(ReservationId::new(), "pi_api_4"),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_unknown_kind_is_acknowledged() {
    let app = setup();

    let response = app
        .oneshot(signed_webhook(event("customer.updated", json!({}))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["result"], "ignored");
    assert_eq!(json["kind"], "customer.updated");
}

#[tokio::test]
async fn test_webhook_malformed_payload_is_rejected() {
    let app = setup();

    let response = app
        .oneshot(signed_webhook(b"{not json".to_vec()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_store_failure_asks_for_retry() {
    let (app, store, _) = setup_with(&signed_config());
    let reservation = pending_reservation(&store).await;
    store.set_fail_on_upsert_payment(true);

    let response = app
        .oneshot(signed_webhook(succeeded(reservation.id, "pi_api_5")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Webhook handler failed");
}

#[tokio::test]
async fn test_webhook_without_secret_trusts_payload() {
    let (app, store, _) = setup_with(&Config::default());
    let reservation = pending_reservation(&store).await;

    let response = app
        .oneshot(webhook_request(succeeded(reservation.id, "pi_api_6"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let stored = store.get_reservation(reservation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReservationStatus::Confirmed);
}
