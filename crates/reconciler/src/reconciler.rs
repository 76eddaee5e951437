//! Webhook reconciliation.

use std::time::Instant;

use booking_store::{
    BookingStore, CapacityPolicy, PaymentStatus, Reservation, ReservationStatus, SlotReservation,
    StatusChange,
};
use chrono::{DateTime, Utc};
use common::{Money, ReservationId};
use domain::{CapacityLedger, CustomerLedger, PaymentClosure, ReservationService, SuccessOutcome};
use notifications::{JobQueue, NotificationScheduler};
use serde::Serialize;

use crate::error::{ReconcileError, Result};
use crate::events::{
    CheckoutCompleted, PaymentClosed, PaymentEvent, PaymentSucceeded, WebhookEvent, parse_event,
};
use crate::signature::{DEFAULT_TOLERANCE_SECS, SignatureVerifier, Verification};

/// Settings for a [`WebhookReconciler`].
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Shared signing secret. `None` trusts every payload.
    pub signing_secret: Option<String>,
    pub tolerance_secs: u64,
    pub capacity_policy: CapacityPolicy,
    pub reminder_lead_hours: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            signing_secret: None,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
            capacity_policy: CapacityPolicy::default(),
            reminder_lead_hours: notifications::DEFAULT_REMINDER_LEAD_HOURS,
        }
    }
}

/// Business result of a reconciled event. Every outcome is acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The reservation was confirmed by this delivery, or by an earlier one
    /// that did not finish.
    Confirmed {
        reservation_id: ReservationId,
        amount_mismatch: bool,
        capacity_exceeded: bool,
    },
    /// The payment had already been applied; follow-up steps were re-driven.
    AlreadyProcessed {
        reservation_id: ReservationId,
        capacity_exceeded: bool,
    },
    /// The reservation moved to (or already was in) a failed or cancelled
    /// status.
    Closed {
        reservation_id: ReservationId,
        status: ReservationStatus,
    },
    /// The reservation's status does not allow the requested transition.
    Rejected {
        reservation_id: ReservationId,
        status: ReservationStatus,
    },
    /// The event references a reservation or transaction that does not exist.
    NotFound,
    /// The event kind is not handled.
    Ignored { kind: String },
    /// The event references data that can never be reconciled, such as a
    /// stored amount with sub-cent precision. Logged for manual review.
    Unprocessable { reason: String },
}

impl ReconcileOutcome {
    /// Outcome label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Confirmed { .. } => "confirmed",
            ReconcileOutcome::AlreadyProcessed { .. } => "already_processed",
            ReconcileOutcome::Closed { .. } => "closed",
            ReconcileOutcome::Rejected { .. } => "rejected",
            ReconcileOutcome::NotFound => "not_found",
            ReconcileOutcome::Ignored { .. } => "ignored",
            ReconcileOutcome::Unprocessable { .. } => "unprocessable",
        }
    }
}

/// How the sender should treat a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    /// Processed or idempotently skipped. Do not retry.
    Processed,
    /// Bad signature or malformed payload. Do not retry.
    Rejected,
    /// Handler failure. Retry later.
    Failed,
}

impl AckStatus {
    pub fn http_status(&self) -> u16 {
        match self {
            AckStatus::Processed => 200,
            AckStatus::Rejected => 400,
            AckStatus::Failed => 500,
        }
    }
}

/// Acknowledgement returned to the sender.
#[derive(Debug)]
pub struct WebhookAck {
    pub status: AckStatus,
    pub result: std::result::Result<ReconcileOutcome, ReconcileError>,
}

impl WebhookAck {
    fn from_result(result: Result<ReconcileOutcome>) -> Self {
        let status = match &result {
            Ok(_) => AckStatus::Processed,
            Err(e) if e.is_rejection() => AckStatus::Rejected,
            Err(_) => AckStatus::Failed,
        };
        Self { status, result }
    }

    /// JSON body: `{ "received": true, "result": ... }` or `{ "error": ... }`.
    pub fn body(&self) -> serde_json::Value {
        match &self.result {
            Ok(outcome) => {
                let mut body = serde_json::to_value(outcome)
                    .unwrap_or_else(|_| serde_json::json!({ "result": outcome.as_str() }));
                if let Some(fields) = body.as_object_mut() {
                    fields.insert("received".into(), serde_json::Value::Bool(true));
                }
                body
            }
            Err(e) if e.is_rejection() => serde_json::json!({ "error": e.to_string() }),
            Err(_) => serde_json::json!({ "error": "Webhook handler failed" }),
        }
    }
}

/// Drives reservations, capacity, customer statistics and notifications to
/// a consistent state for each payment event.
///
/// Collaborators are injected at construction. Deliveries may be repeated,
/// concurrent and out of order; each step is idempotent, so a delivery that
/// fails partway is completed by the sender's retry.
pub struct WebhookReconciler<S, Q>
where
    S: BookingStore,
    Q: JobQueue,
{
    store: S,
    reservations: ReservationService<S>,
    capacity: CapacityLedger<S>,
    customers: CustomerLedger<S>,
    notifications: NotificationScheduler<Q>,
    verifier: SignatureVerifier,
}

impl<S, Q> WebhookReconciler<S, Q>
where
    S: BookingStore + Clone,
    Q: JobQueue,
{
    /// Creates a reconciler over the given store and job queue.
    pub fn new(store: S, queue: Q, config: ReconcilerConfig) -> Self {
        Self {
            reservations: ReservationService::new(store.clone()),
            capacity: CapacityLedger::new(store.clone(), config.capacity_policy),
            customers: CustomerLedger::new(store.clone()),
            notifications: NotificationScheduler::with_reminder_lead_hours(
                queue,
                config.reminder_lead_hours,
            ),
            verifier: SignatureVerifier::new(config.signing_secret, config.tolerance_secs),
            store,
        }
    }

    /// Returns a reference to the booking store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns a reference to the notification scheduler.
    pub fn notifications(&self) -> &NotificationScheduler<Q> {
        &self.notifications
    }

    /// Returns true when deliveries are accepted without signature checks.
    pub fn signatures_disabled(&self) -> bool {
        self.verifier.is_degraded()
    }

    /// Handles one delivery at the current time.
    pub async fn handle_event(&self, raw: &[u8], signature: Option<&str>) -> WebhookAck {
        self.handle_event_at(raw, signature, Utc::now()).await
    }

    /// Handles one delivery as of `now`.
    #[tracing::instrument(skip_all, fields(event_id, kind))]
    pub async fn handle_event_at(
        &self,
        raw: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> WebhookAck {
        let start = Instant::now();
        let mut kind = "unparsed";

        let result = match self.authenticate(raw, signature, now) {
            Ok(event) => {
                kind = event.payment.metric_kind();
                tracing::Span::current()
                    .record("event_id", event.id.as_str())
                    .record("kind", event.payment.kind());
                self.dispatch(event, now).await
            }
            Err(e) => Err(e),
        };

        let result = match result {
            Err(e) if !e.is_rejection() && !e.is_retryable() => {
                tracing::error!(
                    error = %e,
                    "Webhook cannot be reconciled; acknowledging for manual review"
                );
                Ok(ReconcileOutcome::Unprocessable {
                    reason: e.to_string(),
                })
            }
            other => other,
        };

        let label = match &result {
            Ok(outcome) => {
                tracing::info!(result = outcome.as_str(), "Webhook processed");
                outcome.as_str()
            }
            Err(e @ ReconcileError::Signature(_)) => {
                tracing::error!(error = %e, "Webhook signature rejected");
                metrics::counter!("webhook_signature_failures_total").increment(1);
                "signature_rejected"
            }
            Err(e @ ReconcileError::Malformed(_)) => {
                tracing::warn!(error = %e, "Webhook payload rejected");
                "malformed"
            }
            Err(e) => {
                tracing::error!(error = %e, "Webhook handler failed");
                "error"
            }
        };

        metrics::counter!("webhook_events_total", "kind" => kind, "result" => label).increment(1);
        metrics::histogram!("webhook_handle_duration_seconds").record(start.elapsed().as_secs_f64());

        WebhookAck::from_result(result)
    }

    fn authenticate(
        &self,
        raw: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<WebhookEvent> {
        if self.verifier.verify(raw, signature, now)? == Verification::Unverified {
            tracing::warn!("Accepting unverified webhook payload; signing secret not configured");
        }
        Ok(parse_event(raw)?)
    }

    async fn dispatch(&self, event: WebhookEvent, now: DateTime<Utc>) -> Result<ReconcileOutcome> {
        match event.payment {
            PaymentEvent::PaymentSucceeded(data) => self.on_payment_succeeded(data, now).await,
            PaymentEvent::PaymentFailed(data) => self.on_payment_closed(data, false, now).await,
            PaymentEvent::PaymentCanceled(data) => self.on_payment_closed(data, true, now).await,
            PaymentEvent::CheckoutCompleted(data) => self.on_checkout_completed(data, now).await,
            PaymentEvent::Unknown { kind } => {
                tracing::debug!(%kind, "Ignoring unhandled event kind");
                Ok(ReconcileOutcome::Ignored { kind })
            }
        }
    }

    async fn on_payment_succeeded(
        &self,
        data: PaymentSucceeded,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome> {
        self.confirm(
            data.reservation_id,
            &data.transaction_id,
            data.amount,
            &data.currency,
            now,
        )
        .await
    }

    async fn on_payment_closed(
        &self,
        data: PaymentClosed,
        cancelled: bool,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome> {
        let closure = PaymentClosure {
            transaction_id: data.transaction_id,
            reservation_hint: data.reservation_id,
            amount: data.amount.map(Money::from_minor_units),
            currency: data.currency,
        };

        let change = if cancelled {
            self.reservations.transition_on_cancel(closure, now).await?
        } else {
            self.reservations.transition_on_failure(closure, now).await?
        };

        Ok(match change {
            StatusChange::Applied(r) | StatusChange::Unchanged(r) => ReconcileOutcome::Closed {
                reservation_id: r.id,
                status: r.status,
            },
            StatusChange::Rejected(r) => ReconcileOutcome::Rejected {
                reservation_id: r.id,
                status: r.status,
            },
            StatusChange::NotFound => ReconcileOutcome::NotFound,
        })
    }

    /// Creates the reservation for a new transaction, then confirms it.
    ///
    /// A transaction that already has a payment reuses its reservation and
    /// is not short-circuited: it still runs through [`Self::confirm`], which
    /// reports `AlreadyProcessed` and re-drives the idempotent follow-up
    /// steps so an earlier delivery that failed partway converges.
    async fn on_checkout_completed(
        &self,
        data: CheckoutCompleted,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome> {
        let existing = self
            .store
            .find_payment(&data.transaction_id)
            .await
            .map_err(domain::DomainError::from)?;

        let reservation_id = match existing {
            Some(payment) => {
                if payment.status == PaymentStatus::Succeeded {
                    tracing::debug!(
                        session_id = %data.session_id,
                        "Checkout already paid; re-driving follow-ups"
                    );
                }
                payment.reservation_id
            }
            None => {
                let reservation = checkout_reservation(&data, now);
                let inserted = self
                    .store
                    .insert_reservation(&reservation)
                    .await
                    .map_err(domain::DomainError::from)?;
                if inserted {
                    tracing::info!(
                        reservation_id = %reservation.id,
                        session_id = %data.session_id,
                        "Reservation created from checkout"
                    );
                }
                reservation.id
            }
        };

        self.confirm(
            reservation_id,
            &data.transaction_id,
            data.amount_total,
            &data.currency,
            now,
        )
        .await
    }

    async fn confirm(
        &self,
        reservation_id: ReservationId,
        transaction_id: &str,
        observed_minor: i64,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome> {
        let outcome = self
            .reservations
            .transition_on_success(reservation_id, transaction_id, observed_minor, currency, now)
            .await?;

        // `None` for a payment that was already processed.
        let amount_mismatch = match outcome {
            SuccessOutcome::Confirmed { discrepancy, .. } => Some(discrepancy.is_some()),
            SuccessOutcome::AlreadyProcessed { .. } => None,
            SuccessOutcome::Rejected { reservation } => {
                return Ok(ReconcileOutcome::Rejected {
                    reservation_id,
                    status: reservation.status,
                });
            }
            SuccessOutcome::ReservationNotFound => return Ok(ReconcileOutcome::NotFound),
        };

        // A cancel may land after the capture; its reservation gets no
        // slot, stats or voucher.
        let reservation = match self
            .store
            .get_reservation(reservation_id)
            .await
            .map_err(domain::DomainError::from)?
        {
            Some(current) if current.status == ReservationStatus::Confirmed => current,
            Some(current) => {
                tracing::warn!(
                    %reservation_id,
                    status = %current.status,
                    "Reservation left confirmed before follow-ups; skipping them"
                );
                return Ok(ReconcileOutcome::Rejected {
                    reservation_id,
                    status: current.status,
                });
            }
            None => return Ok(ReconcileOutcome::NotFound),
        };

        let capacity_exceeded = self.complete_confirmation(&reservation, now).await?;
        Ok(match amount_mismatch {
            Some(amount_mismatch) => ReconcileOutcome::Confirmed {
                reservation_id,
                amount_mismatch,
                capacity_exceeded,
            },
            None => ReconcileOutcome::AlreadyProcessed {
                reservation_id,
                capacity_exceeded,
            },
        })
    }

    /// Capacity, customer statistics and notifications for a confirmed
    /// reservation. Each step is idempotent per reservation.
    ///
    /// Returns true if the slot was full.
    async fn complete_confirmation(
        &self,
        reservation: &Reservation,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let slot = self.capacity.reserve_for(reservation).await?;
        self.customers.record_booking(reservation).await?;
        self.notifications
            .schedule_confirmation(reservation, now)
            .await?;
        Ok(matches!(slot, SlotReservation::CapacityExceeded(_)))
    }
}

fn checkout_reservation(data: &CheckoutCompleted, now: DateTime<Utc>) -> Reservation {
    let details = &data.reservation;
    let (quoted_price, extras_total) = details.amounts(data.amount_total);

    Reservation {
        id: ReservationId::for_transaction(&data.transaction_id),
        product_id: details.product_id.clone(),
        customer_id: details.customer_id,
        travel_date: details.travel_date,
        start_time: details.start_time,
        duration_hours: details.duration_hours,
        party_size: details.party_size,
        quoted_price,
        extras_total,
        status: ReservationStatus::PendingPayment,
        created_at: now,
        confirmed_at: None,
    }
}
