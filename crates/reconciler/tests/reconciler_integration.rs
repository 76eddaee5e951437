//! Integration tests for webhook reconciliation.

use booking_store::{
    BookingStore, CapacityPolicy, InMemoryBookingStore, PaymentStatus, Reservation,
    ReservationStatus,
};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use common::{CustomerId, Money, ProductId, ReservationId};
use notifications::{InMemoryJobQueue, JobKind};
use reconciler::{AckStatus, ReconcileOutcome, ReconcilerConfig, WebhookReconciler, sign};
use rust_decimal::Decimal;
use serde_json::json;

const SECRET: &str = "whsec_integration";

type TestReconciler = WebhookReconciler<InMemoryBookingStore, InMemoryJobQueue>;

struct TestHarness {
    reconciler: TestReconciler,
    store: InMemoryBookingStore,
    queue: InMemoryJobQueue,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(ReconcilerConfig {
            signing_secret: Some(SECRET.to_string()),
            ..ReconcilerConfig::default()
        })
    }

    fn with_config(config: ReconcilerConfig) -> Self {
        let store = InMemoryBookingStore::new();
        let queue = InMemoryJobQueue::new();
        let reconciler = WebhookReconciler::new(store.clone(), queue.clone(), config);
        Self {
            reconciler,
            store,
            queue,
        }
    }

    async fn pending_reservation(&self) -> Reservation {
        let reservation = Reservation {
            id: ReservationId::new(),
            product_id: ProductId::new("sintra-cascais"),
            customer_id: CustomerId::new(),
            travel_date: NaiveDate::from_ymd_opt(2025, 6, 20).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            duration_hours: 8,
            party_size: 4,
            quoted_price: Money::from_major(320),
            extras_total: Money::from_major(40),
            status: ReservationStatus::PendingPayment,
            created_at: now() - chrono::Duration::hours(1),
            confirmed_at: None,
        };
        self.store.insert_reservation(&reservation).await.unwrap();
        reservation
    }

    async fn deliver(&self, body: &[u8]) -> reconciler::WebhookAck {
        let header = sign(SECRET, now().timestamp(), body).unwrap();
        self.reconciler
            .handle_event_at(body, Some(&header), now())
            .await
    }

    async fn reservation(&self, id: ReservationId) -> Reservation {
        self.store.get_reservation(id).await.unwrap().unwrap()
    }

    async fn booked_slots(&self, reservation: &Reservation) -> u32 {
        self.store
            .get_slot(&reservation.slot_key())
            .await
            .unwrap()
            .map(|slot| slot.booked_slots)
            .unwrap_or(0)
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn event(kind: &str, data: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": format!("evt_{}", uuid_suffix()),
        "type": kind,
        "created": now().timestamp(),
        "data": data,
    }))
    .unwrap()
}

fn uuid_suffix() -> String {
    ReservationId::new().to_string()[..8].to_string()
}

fn succeeded(reservation_id: ReservationId, tx: &str, amount: i64) -> Vec<u8> {
    event(
        "payment_succeeded",
        json!({
            "transaction_id": tx,
            "reservation_id": reservation_id,
            "amount": amount,
            "currency": "eur",
        }),
    )
}

fn canceled(tx: &str) -> Vec<u8> {
    event("payment_canceled", json!({ "transaction_id": tx }))
}

fn checkout(tx: &str, customer_id: CustomerId) -> Vec<u8> {
    event(
        "checkout_completed",
        json!({
            "session_id": format!("cs_{tx}"),
            "transaction_id": tx,
            "amount_total": 36_000,
            "currency": "eur",
            "reservation": {
                "product_id": "arrabida-coast",
                "customer_id": customer_id,
                "travel_date": "2025-07-04",
                "start_time": "10:00",
                "party_size": 3,
                "duration_hours": 6,
                "extras_total": "60.00",
            },
        }),
    )
}

#[tokio::test]
async fn payment_succeeded_confirms_and_completes_follow_ups() {
    let harness = TestHarness::new();
    let r = harness.pending_reservation().await;

    let ack = harness.deliver(&succeeded(r.id, "pi_1", 36_000)).await;

    assert_eq!(ack.status, AckStatus::Processed);
    assert_eq!(
        ack.body(),
        json!({
            "received": true,
            "result": "confirmed",
            "reservation_id": r.id,
            "amount_mismatch": false,
            "capacity_exceeded": false,
        })
    );

    let confirmed = harness.reservation(r.id).await;
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    assert_eq!(confirmed.confirmed_at, Some(now()));

    let payment = harness.store.find_payment("pi_1").await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);
    assert_eq!(payment.paid_at, Some(now()));

    assert_eq!(harness.booked_slots(&r).await, 1);

    let stats = harness
        .store
        .get_customer_stats(r.customer_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.total_bookings, 1);
    assert_eq!(stats.total_spent, Money::from_major(360));

    assert_eq!(harness.queue.jobs_of_kind(JobKind::Voucher).await.len(), 1);
    assert_eq!(harness.queue.jobs_of_kind(JobKind::Reminder).await.len(), 1);
}

#[tokio::test]
async fn duplicate_delivery_is_idempotent() {
    let harness = TestHarness::new();
    let r = harness.pending_reservation().await;
    let body = succeeded(r.id, "pi_1", 36_000);

    harness.deliver(&body).await;
    let ack = harness.deliver(&body).await;

    assert_eq!(ack.status, AckStatus::Processed);
    assert!(matches!(
        ack.result,
        Ok(ReconcileOutcome::AlreadyProcessed { .. })
    ));
    assert_eq!(harness.store.payment_count().await, 1);
    assert_eq!(harness.booked_slots(&r).await, 1);
    assert_eq!(
        harness
            .store
            .get_customer_stats(r.customer_id)
            .await
            .unwrap()
            .unwrap()
            .total_bookings,
        1
    );
    assert_eq!(harness.queue.job_count().await, 2);
}

#[tokio::test]
async fn concurrent_duplicate_deliveries_collapse() {
    let harness = TestHarness::new();
    let r = harness.pending_reservation().await;
    let body = succeeded(r.id, "pi_race", 36_000);

    let acks = futures_util::future::join_all((0..8).map(|_| harness.deliver(&body))).await;

    assert!(acks.iter().all(|ack| ack.status == AckStatus::Processed));
    assert_eq!(
        harness.reservation(r.id).await.status,
        ReservationStatus::Confirmed
    );
    assert_eq!(harness.store.payment_count().await, 1);
    assert_eq!(harness.booked_slots(&r).await, 1);
    assert_eq!(harness.queue.job_count().await, 2);
}

#[tokio::test]
async fn cancel_after_success_leaves_reservation_cancelled() {
    let harness = TestHarness::new();
    let r = harness.pending_reservation().await;

    harness.deliver(&succeeded(r.id, "pi_1", 36_000)).await;
    let ack = harness.deliver(&canceled("pi_1")).await;

    assert_eq!(ack.status, AckStatus::Processed);
    assert_eq!(
        ack.result.unwrap(),
        ReconcileOutcome::Closed {
            reservation_id: r.id,
            status: ReservationStatus::Cancelled,
        }
    );
    let cancelled = harness.reservation(r.id).await;
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(
        harness.store.find_payment("pi_1").await.unwrap().unwrap().status,
        PaymentStatus::Canceled
    );
}

#[tokio::test]
async fn success_after_cancel_does_not_resurrect() {
    let harness = TestHarness::new();
    let r = harness.pending_reservation().await;

    harness
        .deliver(&event(
            "payment_canceled",
            json!({ "transaction_id": "pi_1", "reservation_id": r.id }),
        ))
        .await;
    let ack = harness.deliver(&succeeded(r.id, "pi_1", 36_000)).await;

    assert_eq!(ack.status, AckStatus::Processed);
    assert!(matches!(ack.result, Ok(ReconcileOutcome::Rejected { .. })));
    assert_eq!(
        harness.reservation(r.id).await.status,
        ReservationStatus::Cancelled
    );
    assert_eq!(harness.booked_slots(&r).await, 0);
    assert_eq!(harness.queue.job_count().await, 0);
}

#[tokio::test]
async fn failure_then_success_confirms() {
    let harness = TestHarness::new();
    let r = harness.pending_reservation().await;

    let ack = harness
        .deliver(&event(
            "payment_failed",
            json!({ "transaction_id": "pi_1", "reservation_id": r.id, "amount": 36_000, "currency": "eur" }),
        ))
        .await;
    assert_eq!(
        ack.result.unwrap(),
        ReconcileOutcome::Closed {
            reservation_id: r.id,
            status: ReservationStatus::PaymentFailed,
        }
    );

    harness.deliver(&succeeded(r.id, "pi_1", 36_000)).await;
    assert_eq!(
        harness.reservation(r.id).await.status,
        ReservationStatus::Confirmed
    );
}

#[tokio::test]
async fn amount_mismatch_confirms_and_records_discrepancy() {
    let harness = TestHarness::new();
    let r = harness.pending_reservation().await;

    let ack = harness.deliver(&succeeded(r.id, "pi_short", 30_000)).await;

    assert!(matches!(
        ack.result,
        Ok(ReconcileOutcome::Confirmed {
            amount_mismatch: true,
            ..
        })
    ));
    assert_eq!(
        harness.reservation(r.id).await.status,
        ReservationStatus::Confirmed
    );

    let discrepancies = harness.store.list_discrepancies().await.unwrap();
    assert_eq!(discrepancies.len(), 1);
    assert_eq!(discrepancies[0].expected_minor, 36_000);
    assert_eq!(discrepancies[0].observed_minor, 30_000);
}

#[tokio::test]
async fn unknown_reservation_is_acknowledged() {
    let harness = TestHarness::new();

    let ack = harness
        .deliver(&succeeded(ReservationId::new(), "pi_ghost", 1_000))
        .await;

    assert_eq!(ack.status, AckStatus::Processed);
    assert_eq!(ack.body()["result"], "not_found");
    assert_eq!(harness.store.payment_count().await, 0);
}

#[tokio::test]
async fn bad_signature_is_rejected_without_writes() {
    let harness = TestHarness::new();
    let r = harness.pending_reservation().await;
    let body = succeeded(r.id, "pi_1", 36_000);
    let forged = sign("whsec_forged", now().timestamp(), &body).unwrap();

    let ack = harness
        .reconciler
        .handle_event_at(&body, Some(&forged), now())
        .await;
    assert_eq!(ack.status, AckStatus::Rejected);
    assert_eq!(ack.status.http_status(), 400);

    let ack = harness.reconciler.handle_event_at(&body, None, now()).await;
    assert_eq!(ack.status, AckStatus::Rejected);

    assert_eq!(
        harness.reservation(r.id).await.status,
        ReservationStatus::PendingPayment
    );
    assert_eq!(harness.store.payment_count().await, 0);
}

#[tokio::test]
async fn unknown_kind_is_acknowledged() {
    let harness = TestHarness::new();

    let ack = harness
        .deliver(&event("customer.updated", json!({ "id": "cus_1" })))
        .await;

    assert_eq!(ack.status, AckStatus::Processed);
    assert_eq!(ack.body()["result"], "ignored");
}

#[tokio::test]
async fn malformed_data_is_rejected() {
    let harness = TestHarness::new();

    let ack = harness
        .deliver(&event("payment_succeeded", json!({ "transaction_id": "pi_1" })))
        .await;
    assert_eq!(ack.status, AckStatus::Rejected);
    assert!(ack.body()["error"].as_str().unwrap().contains("payment_succeeded"));

    let ack = harness.deliver(b"{not json").await;
    assert_eq!(ack.status, AckStatus::Rejected);
}

fn checkout_with(tx: &str, customer_id: CustomerId, field: &str, value: serde_json::Value) -> Vec<u8> {
    let mut event: serde_json::Value = serde_json::from_slice(&checkout(tx, customer_id)).unwrap();
    event["data"]["reservation"][field] = value;
    serde_json::to_vec(&event).unwrap()
}

#[tokio::test]
async fn checkout_with_sub_cent_price_is_rejected_not_retried() {
    let harness = TestHarness::new();
    let body = checkout_with("pi_subcent", CustomerId::new(), "quoted_price", json!("100.005"));

    for _ in 0..3 {
        let ack = harness.deliver(&body).await;
        assert_eq!(ack.status, AckStatus::Rejected);
        assert_eq!(ack.status.http_status(), 400);
    }
    assert_eq!(harness.store.reservation_count().await, 0);
}

#[tokio::test]
async fn checkout_with_overlong_duration_is_rejected() {
    let harness = TestHarness::new();
    let body = checkout_with("pi_long", CustomerId::new(), "duration_hours", json!(4_294_967_295_u64));

    let ack = harness.deliver(&body).await;

    assert_eq!(ack.status, AckStatus::Rejected);
    assert_eq!(harness.store.reservation_count().await, 0);
}

#[tokio::test]
async fn unconvertible_stored_amount_is_acknowledged_for_review() {
    let harness = TestHarness::new();
    let r = Reservation {
        id: ReservationId::new(),
        quoted_price: Money::new(Decimal::new(100_005, 3)),
        ..harness.pending_reservation().await
    };
    harness.store.insert_reservation(&r).await.unwrap();
    let body = succeeded(r.id, "pi_subcent", 10_001);

    for _ in 0..2 {
        let ack = harness.deliver(&body).await;
        assert_eq!(ack.status, AckStatus::Processed);
        assert_eq!(ack.status.http_status(), 200);
        assert!(matches!(
            ack.result,
            Ok(ReconcileOutcome::Unprocessable { .. })
        ));
        assert_eq!(ack.body()["result"], "unprocessable");
    }

    assert_eq!(
        harness.reservation(r.id).await.status,
        ReservationStatus::PendingPayment
    );
    assert_eq!(harness.store.find_payment("pi_subcent").await.unwrap(), None);
}

#[tokio::test]
async fn checkout_completed_creates_and_confirms_reservation() {
    let harness = TestHarness::new();
    let customer = CustomerId::new();

    let ack = harness.deliver(&checkout("pi_checkout", customer)).await;

    assert_eq!(ack.status, AckStatus::Processed);
    let reservation_id = ReservationId::for_transaction("pi_checkout");
    assert!(matches!(
        ack.result,
        Ok(ReconcileOutcome::Confirmed { reservation_id: id, amount_mismatch: false, .. }) if id == reservation_id
    ));

    let reservation = harness.reservation(reservation_id).await;
    assert_eq!(reservation.status, ReservationStatus::Confirmed);
    assert_eq!(reservation.customer_id, customer);
    assert_eq!(reservation.quoted_price, Money::from_major(300));
    assert_eq!(reservation.extras_total, Money::from_major(60));
    assert_eq!(harness.booked_slots(&reservation).await, 1);
}

#[tokio::test]
async fn checkout_completed_is_idempotent_on_transaction() {
    let harness = TestHarness::new();
    let customer = CustomerId::new();

    let acks = futures_util::future::join_all(
        (0..4).map(|_| harness.deliver_owned(checkout("pi_checkout", customer))),
    )
    .await;
    assert!(acks.iter().all(|ack| ack.status == AckStatus::Processed));

    let ack = harness.deliver(&checkout("pi_checkout", customer)).await;
    assert!(matches!(
        ack.result,
        Ok(ReconcileOutcome::AlreadyProcessed { .. })
    ));

    assert_eq!(harness.store.reservation_count().await, 1);
    assert_eq!(harness.store.payment_count().await, 1);
    let reservation = harness
        .reservation(ReservationId::for_transaction("pi_checkout"))
        .await;
    assert_eq!(harness.booked_slots(&reservation).await, 1);
}

#[tokio::test]
async fn checkout_for_already_paid_transaction_creates_nothing() {
    let harness = TestHarness::new();
    let r = harness.pending_reservation().await;
    harness.deliver(&succeeded(r.id, "pi_1", 36_000)).await;

    let ack = harness.deliver(&checkout("pi_1", r.customer_id)).await;

    assert!(matches!(
        ack.result,
        Ok(ReconcileOutcome::AlreadyProcessed { reservation_id, .. }) if reservation_id == r.id
    ));
    assert_eq!(harness.store.reservation_count().await, 1);
}

#[tokio::test]
async fn failure_after_confirmation_converges_on_retry() {
    let harness = TestHarness::new();
    let r = harness.pending_reservation().await;
    let body = succeeded(r.id, "pi_1", 36_000);

    harness.store.set_fail_on_reserve_slot(true);
    let ack = harness.deliver(&body).await;
    assert_eq!(ack.status, AckStatus::Failed);
    assert_eq!(ack.status.http_status(), 500);
    assert_eq!(ack.body(), json!({ "error": "Webhook handler failed" }));
    assert_eq!(
        harness.reservation(r.id).await.status,
        ReservationStatus::Confirmed
    );
    assert_eq!(harness.queue.job_count().await, 0);

    harness.store.set_fail_on_reserve_slot(false);
    let ack = harness.deliver(&body).await;
    assert_eq!(ack.status, AckStatus::Processed);
    assert_eq!(harness.booked_slots(&r).await, 1);
    assert_eq!(harness.queue.job_count().await, 2);

    harness.deliver(&body).await;
    assert_eq!(harness.booked_slots(&r).await, 1);
    assert_eq!(harness.queue.job_count().await, 2);
}

#[tokio::test]
async fn queue_failure_is_retried_without_duplicate_jobs() {
    let harness = TestHarness::new();
    let r = harness.pending_reservation().await;
    let body = succeeded(r.id, "pi_1", 36_000);

    harness.queue.set_fail_on_kind(Some(JobKind::Reminder)).await;
    let ack = harness.deliver(&body).await;
    assert_eq!(ack.status, AckStatus::Failed);
    assert_eq!(harness.queue.job_count().await, 1);

    harness.queue.set_fail_on_kind(None).await;
    let ack = harness.deliver(&body).await;
    assert_eq!(ack.status, AckStatus::Processed);
    assert_eq!(harness.queue.jobs_of_kind(JobKind::Voucher).await.len(), 1);
    assert_eq!(harness.queue.jobs_of_kind(JobKind::Reminder).await.len(), 1);
}

#[tokio::test]
async fn full_slot_is_reported_but_acknowledged() {
    let harness = TestHarness::new();
    let first = harness.pending_reservation().await;
    let second = harness.pending_reservation().await;

    harness.deliver(&succeeded(first.id, "pi_1", 36_000)).await;
    let ack = harness.deliver(&succeeded(second.id, "pi_2", 36_000)).await;

    assert_eq!(ack.status, AckStatus::Processed);
    assert!(matches!(
        ack.result,
        Ok(ReconcileOutcome::Confirmed {
            capacity_exceeded: true,
            ..
        })
    ));
    assert_eq!(harness.booked_slots(&first).await, 1);
}

#[tokio::test]
async fn unconditional_policy_overbooks() {
    let harness = TestHarness::with_config(ReconcilerConfig {
        signing_secret: Some(SECRET.to_string()),
        capacity_policy: CapacityPolicy::Unconditional,
        ..ReconcilerConfig::default()
    });
    let first = harness.pending_reservation().await;
    let second = harness.pending_reservation().await;

    harness.deliver(&succeeded(first.id, "pi_1", 36_000)).await;
    harness.deliver(&succeeded(second.id, "pi_2", 36_000)).await;

    assert_eq!(harness.booked_slots(&first).await, 2);
}

#[tokio::test]
async fn trip_within_a_day_gets_no_reminder() {
    let harness = TestHarness::new();
    let r = Reservation {
        id: ReservationId::new(),
        travel_date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
        ..harness.pending_reservation().await
    };
    harness.store.insert_reservation(&r).await.unwrap();

    harness.deliver(&succeeded(r.id, "pi_soon", 36_000)).await;

    assert_eq!(harness.queue.jobs_of_kind(JobKind::Voucher).await.len(), 1);
    assert!(harness.queue.jobs_of_kind(JobKind::Reminder).await.is_empty());
}

#[tokio::test]
async fn unsigned_payload_is_trusted_without_secret() {
    let harness = TestHarness::with_config(ReconcilerConfig::default());
    let r = harness.pending_reservation().await;

    let ack = harness
        .reconciler
        .handle_event_at(&succeeded(r.id, "pi_1", 36_000), None, now())
        .await;

    assert_eq!(ack.status, AckStatus::Processed);
    assert_eq!(
        harness.reservation(r.id).await.status,
        ReservationStatus::Confirmed
    );
}

impl TestHarness {
    async fn deliver_owned(&self, body: Vec<u8>) -> reconciler::WebhookAck {
        self.deliver(&body).await
    }
}
