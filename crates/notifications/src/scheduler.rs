//! Voucher and reminder scheduling.

use booking_store::Reservation;
use chrono::{DateTime, NaiveDate, Utc};
use common::{CustomerId, Money, ProductId, ReservationId};
use serde::Serialize;

use crate::error::Result;
use crate::job::{JobKind, NotificationJob};
use crate::queue::{EnqueueOutcome, JobQueue};

/// Default time between a reminder and the trip start.
pub const DEFAULT_REMINDER_LEAD_HOURS: u32 = 24;

/// Jobs scheduled for one confirmed reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledNotifications {
    pub voucher: EnqueueOutcome,
    /// `None` when the trip starts within the reminder lead time.
    pub reminder: Option<EnqueueOutcome>,
}

#[derive(Debug, Serialize)]
struct BookingPayload<'a> {
    reservation_id: ReservationId,
    customer_id: CustomerId,
    product_id: &'a ProductId,
    travel_date: NaiveDate,
    start_time: String,
    party_size: u32,
    total: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    reminder_type: Option<String>,
}

impl<'a> BookingPayload<'a> {
    fn for_reservation(reservation: &'a Reservation) -> Self {
        Self {
            reservation_id: reservation.id,
            customer_id: reservation.customer_id,
            product_id: &reservation.product_id,
            travel_date: reservation.travel_date,
            start_time: reservation.start_time.format("%H:%M").to_string(),
            party_size: reservation.party_size,
            total: reservation.expected_amount(),
            reminder_type: None,
        }
    }
}

/// Enqueues the notifications that follow a confirmation.
///
/// Every job carries an idempotency key derived from its kind and the
/// reservation, so scheduling again for a retried webhook is a no-op at the
/// queue.
pub struct NotificationScheduler<Q: JobQueue> {
    queue: Q,
    reminder_lead_hours: u32,
}

impl<Q: JobQueue> NotificationScheduler<Q> {
    /// Creates a scheduler with the default reminder lead time.
    pub fn new(queue: Q) -> Self {
        Self::with_reminder_lead_hours(queue, DEFAULT_REMINDER_LEAD_HOURS)
    }

    pub fn with_reminder_lead_hours(queue: Q, reminder_lead_hours: u32) -> Self {
        Self {
            queue,
            reminder_lead_hours,
        }
    }

    /// Returns a reference to the underlying queue.
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Enqueues the voucher and, if the trip starts more than the lead time
    /// after `now`, a reminder due that long before the start.
    #[tracing::instrument(skip(self, reservation, now), fields(reservation_id = %reservation.id))]
    pub async fn schedule_confirmation(
        &self,
        reservation: &Reservation,
        now: DateTime<Utc>,
    ) -> Result<ScheduledNotifications> {
        let voucher = self.schedule_voucher(reservation).await?;
        let reminder = self.schedule_reminder(reservation, now).await?;
        Ok(ScheduledNotifications { voucher, reminder })
    }

    /// Enqueues the booking voucher for immediate delivery.
    pub async fn schedule_voucher(&self, reservation: &Reservation) -> Result<EnqueueOutcome> {
        let payload = serde_json::to_value(BookingPayload::for_reservation(reservation))?;
        self.submit(JobKind::Voucher, reservation.id, payload, None)
            .await
    }

    /// Enqueues the trip reminder, or returns `None` when the trip is too
    /// close for one.
    pub async fn schedule_reminder(
        &self,
        reservation: &Reservation,
        now: DateTime<Utc>,
    ) -> Result<Option<EnqueueOutcome>> {
        let lead = chrono::Duration::hours(i64::from(self.reminder_lead_hours));
        let delay = reservation.starts_at() - lead - now;

        let Ok(delay) = delay.to_std() else {
            tracing::debug!("Trip starts within reminder lead time; no reminder");
            return Ok(None);
        };
        if delay.is_zero() {
            return Ok(None);
        }

        let payload = serde_json::to_value(BookingPayload {
            reminder_type: Some(format!("{}h", self.reminder_lead_hours)),
            ..BookingPayload::for_reservation(reservation)
        })?;
        self.submit(JobKind::Reminder, reservation.id, payload, Some(delay))
            .await
            .map(Some)
    }

    async fn submit(
        &self,
        kind: JobKind,
        reservation_id: ReservationId,
        payload: serde_json::Value,
        delay: Option<std::time::Duration>,
    ) -> Result<EnqueueOutcome> {
        let idempotency_key = kind.key_for(reservation_id);
        let outcome = self
            .queue
            .enqueue(NotificationJob {
                kind,
                reservation_id,
                idempotency_key: idempotency_key.clone(),
                payload,
                delay,
            })
            .await?;

        match outcome {
            EnqueueOutcome::Enqueued => {
                tracing::info!(key = %idempotency_key, delay_secs = delay.map(|d| d.as_secs()), "Notification job enqueued");
                metrics::counter!("notification_jobs_enqueued_total", "kind" => kind.as_str())
                    .increment(1);
            }
            EnqueueOutcome::Duplicate => {
                tracing::debug!(key = %idempotency_key, "Notification job already enqueued");
                metrics::counter!("notification_jobs_deduplicated_total", "kind" => kind.as_str())
                    .increment(1);
            }
        }
        Ok(outcome)
    }
}
