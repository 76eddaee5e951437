//! Payment-driven reservation transitions.

use booking_store::{
    AmountDiscrepancy, BookingStore, CaptureRecord, PaymentRecord, PaymentStatus, PaymentUpsert,
    Reservation, ReservationStatus, StatusChange,
};
use chrono::{DateTime, Utc};
use common::{Money, ReservationId};

use crate::error::Result;

/// Currency recorded when neither the event nor an earlier payment names one.
pub const DEFAULT_CURRENCY: &str = "eur";

/// Outcome of applying a successful payment to a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuccessOutcome {
    /// The reservation is confirmed and the payment recorded as succeeded.
    ///
    /// Also returned when a previous attempt confirmed the reservation but
    /// failed before recording the payment.
    Confirmed {
        reservation: Reservation,
        payment: PaymentRecord,
        discrepancy: Option<AmountDiscrepancy>,
    },

    /// The payment was already recorded as succeeded against a confirmed
    /// reservation. Nothing was written.
    AlreadyProcessed { reservation: Reservation },

    /// The reservation's status does not allow confirmation, or it moved on
    /// before the payment was recorded. No payment was written.
    Rejected { reservation: Reservation },

    /// No reservation with the given ID exists.
    ReservationNotFound,
}

/// A failed or canceled payment reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentClosure {
    pub transaction_id: String,
    /// Used when no payment record exists for the transaction yet.
    pub reservation_hint: Option<ReservationId>,
    pub amount: Option<Money>,
    pub currency: Option<String>,
}

/// Applies gateway payment outcomes to reservations.
///
/// Every step is a single conditional update or unique-keyed upsert on the
/// store, so concurrent and repeated deliveries of the same outcome converge
/// on one confirmed reservation and one payment record.
pub struct ReservationService<S: BookingStore> {
    store: S,
}

impl<S: BookingStore> ReservationService<S> {
    /// Creates a new reservation service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Confirms a reservation for a captured payment.
    ///
    /// `observed_minor` is the captured amount in minor units. A mismatch
    /// against quoted price plus extras is recorded as a discrepancy and does
    /// not block confirmation.
    #[tracing::instrument(skip(self, currency, now))]
    pub async fn transition_on_success(
        &self,
        reservation_id: ReservationId,
        transaction_id: &str,
        observed_minor: i64,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Result<SuccessOutcome> {
        let Some(reservation) = self.store.get_reservation(reservation_id).await? else {
            tracing::warn!(%reservation_id, "Payment succeeded for unknown reservation");
            return Ok(SuccessOutcome::ReservationNotFound);
        };

        let existing = self.store.find_payment(transaction_id).await?;
        if existing
            .as_ref()
            .is_some_and(|p| p.status == PaymentStatus::Succeeded)
            && reservation.status == ReservationStatus::Confirmed
        {
            tracing::debug!(%reservation_id, "Payment already processed");
            return Ok(SuccessOutcome::AlreadyProcessed { reservation });
        }

        let discrepancy = self
            .check_amount(&reservation, transaction_id, observed_minor, currency, now)
            .await?;

        let reservation = match self
            .store
            .transition_reservation(reservation_id, ReservationStatus::Confirmed, now)
            .await?
        {
            StatusChange::Applied(reservation) => {
                tracing::info!(%reservation_id, transaction_id, "Reservation confirmed");
                metrics::counter!("reservations_confirmed_total").increment(1);
                reservation
            }
            StatusChange::Unchanged(reservation) => reservation,
            StatusChange::Rejected(reservation) => {
                tracing::warn!(
                    %reservation_id,
                    transaction_id,
                    status = %reservation.status,
                    "Captured payment for a reservation that cannot be confirmed; needs manual refund review"
                );
                return Ok(SuccessOutcome::Rejected { reservation });
            }
            StatusChange::NotFound => return Ok(SuccessOutcome::ReservationNotFound),
        };

        let capture = self
            .store
            .record_capture(PaymentUpsert {
                reservation_id,
                transaction_id: transaction_id.to_string(),
                amount: Money::from_minor_units(observed_minor),
                currency: currency.to_string(),
                status: PaymentStatus::Succeeded,
                paid_at: Some(now),
            })
            .await?;

        let payment = match capture {
            CaptureRecord::Recorded(payment) => payment,
            CaptureRecord::NotConfirmed(reservation) => {
                tracing::warn!(
                    %reservation_id,
                    transaction_id,
                    status = %reservation.status,
                    "Reservation left confirmed before the capture was recorded; needs manual refund review"
                );
                return Ok(SuccessOutcome::Rejected { reservation });
            }
        };

        Ok(SuccessOutcome::Confirmed {
            reservation,
            payment,
            discrepancy,
        })
    }

    /// Marks the payment failed and moves the reservation to `PaymentFailed`.
    #[tracing::instrument(skip(self, now), fields(transaction_id = %closure.transaction_id))]
    pub async fn transition_on_failure(
        &self,
        closure: PaymentClosure,
        now: DateTime<Utc>,
    ) -> Result<StatusChange> {
        self.close_payment(
            closure,
            ReservationStatus::PaymentFailed,
            PaymentStatus::Failed,
            now,
        )
        .await
    }

    /// Marks the payment canceled and moves the reservation to `Cancelled`.
    #[tracing::instrument(skip(self, now), fields(transaction_id = %closure.transaction_id))]
    pub async fn transition_on_cancel(
        &self,
        closure: PaymentClosure,
        now: DateTime<Utc>,
    ) -> Result<StatusChange> {
        self.close_payment(
            closure,
            ReservationStatus::Cancelled,
            PaymentStatus::Canceled,
            now,
        )
        .await
    }

    async fn check_amount(
        &self,
        reservation: &Reservation,
        transaction_id: &str,
        observed_minor: i64,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AmountDiscrepancy>> {
        let expected_minor = reservation.expected_amount().to_minor_units()?;
        if expected_minor == observed_minor {
            return Ok(None);
        }

        tracing::warn!(
            reservation_id = %reservation.id,
            transaction_id,
            expected_minor,
            observed_minor,
            currency,
            "Captured amount differs from reservation total"
        );

        let discrepancy = AmountDiscrepancy {
            reservation_id: reservation.id,
            transaction_id: transaction_id.to_string(),
            expected_minor,
            observed_minor,
            currency: currency.to_string(),
            recorded_at: now,
        };
        if self.store.record_discrepancy(&discrepancy).await? {
            metrics::counter!("payment_amount_discrepancies_total").increment(1);
        }
        Ok(Some(discrepancy))
    }

    async fn close_payment(
        &self,
        closure: PaymentClosure,
        to: ReservationStatus,
        payment_status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusChange> {
        let existing = self.store.find_payment(&closure.transaction_id).await?;
        let Some(reservation_id) = existing
            .as_ref()
            .map(|p| p.reservation_id)
            .or(closure.reservation_hint)
        else {
            tracing::warn!("Payment outcome for unknown transaction");
            return Ok(StatusChange::NotFound);
        };

        let change = self
            .store
            .transition_reservation(reservation_id, to, now)
            .await?;

        let reservation = match &change {
            StatusChange::Applied(reservation) => {
                tracing::info!(%reservation_id, status = %to, "Reservation closed");
                reservation
            }
            StatusChange::Unchanged(reservation) => reservation,
            StatusChange::Rejected(reservation) => {
                tracing::warn!(
                    %reservation_id,
                    current = %reservation.status,
                    requested = %to,
                    "Ignoring payment outcome for reservation in later state"
                );
                return Ok(change);
            }
            StatusChange::NotFound => {
                tracing::warn!(%reservation_id, "Payment outcome for unknown reservation");
                return Ok(change);
            }
        };

        let amount = closure
            .amount
            .or(existing.as_ref().map(|p| p.amount))
            .unwrap_or_else(|| reservation.expected_amount());
        let currency = closure
            .currency
            .or(existing.map(|p| p.currency))
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        self.store
            .upsert_payment(PaymentUpsert {
                reservation_id,
                transaction_id: closure.transaction_id,
                amount,
                currency,
                status: payment_status,
                paid_at: None,
            })
            .await?;

        Ok(change)
    }
}
