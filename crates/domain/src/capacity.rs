//! Slot capacity accounting.

use booking_store::{BookingStore, CapacityPolicy, Reservation, SlotClaim, SlotKey, SlotReservation};
use chrono::{NaiveDate, NaiveTime};
use common::{ProductId, ReservationId};

use crate::error::{DomainError, Result};

/// Counts confirmed reservations against (product, date, start time) slots.
///
/// A slot is created on first use with one slot available and one booked.
/// Under [`CapacityPolicy::Enforce`] a full slot is reported as
/// [`SlotReservation::CapacityExceeded`] instead of being overbooked; under
/// [`CapacityPolicy::Unconditional`] the count grows past `max_slots`.
pub struct CapacityLedger<S: BookingStore> {
    store: S,
    policy: CapacityPolicy,
}

impl<S: BookingStore> CapacityLedger<S> {
    pub fn new(store: S, policy: CapacityPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> CapacityPolicy {
        self.policy
    }

    /// Occupies one unit of the slot on behalf of `reservation_id`.
    ///
    /// The slot end label is `start hour + duration_hours` with minutes
    /// dropped. Repeating the call for the same reservation does not count
    /// it twice.
    #[tracing::instrument(skip(self))]
    pub async fn reserve_slot(
        &self,
        reservation_id: ReservationId,
        product_id: ProductId,
        travel_date: NaiveDate,
        start_time: NaiveTime,
        duration_hours: u32,
    ) -> Result<SlotReservation> {
        let key = SlotKey {
            product_id,
            travel_date,
            start_time,
        };
        let end_time = key.end_time_label(duration_hours).ok_or_else(|| {
            DomainError::InvalidReservation {
                reservation_id,
                reason: format!("duration of {duration_hours} hours overflows the end time"),
            }
        })?;
        let claim = SlotClaim {
            reservation_id,
            end_time,
            key,
        };

        let outcome = self.store.reserve_slot(claim, self.policy).await?;
        match &outcome {
            SlotReservation::Reserved(slot) => {
                tracing::info!(
                    slot = %slot.key,
                    booked = slot.booked_slots,
                    max = slot.max_slots,
                    "Slot reserved"
                );
                if slot.booked_slots > slot.max_slots {
                    tracing::warn!(slot = %slot.key, "Slot overbooked");
                }
            }
            SlotReservation::AlreadyClaimed(_) => {
                tracing::debug!(%reservation_id, "Slot already counted for reservation");
            }
            SlotReservation::CapacityExceeded(slot) => {
                tracing::warn!(
                    slot = %slot.key,
                    %reservation_id,
                    max = slot.max_slots,
                    "Slot capacity exceeded; reservation needs manual review"
                );
                metrics::counter!("capacity_exceeded_total").increment(1);
            }
        }
        Ok(outcome)
    }

    /// Occupies the slot a reservation was booked for.
    pub async fn reserve_for(&self, reservation: &Reservation) -> Result<SlotReservation> {
        self.reserve_slot(
            reservation.id,
            reservation.product_id.clone(),
            reservation.travel_date,
            reservation.start_time,
            reservation.duration_hours,
        )
        .await
    }
}
