use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, Money, ReservationId};

use crate::{
    AmountDiscrepancy, CapacityPolicy, CapacitySlot, CustomerStats, PaymentRecord, PaymentUpsert,
    Reservation, ReservationStatus, Result, SlotClaim, SlotKey,
};

/// Result of a conditional status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    /// The update matched and was written.
    Applied(Reservation),
    /// The reservation was already in the target status; nothing written.
    Unchanged(Reservation),
    /// The current status does not allow the transition; nothing written.
    Rejected(Reservation),
    /// No reservation with that ID exists.
    NotFound,
}

/// Result of claiming one unit of slot capacity for a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotReservation {
    /// The slot was created or incremented for this reservation.
    Reserved(CapacitySlot),
    /// This reservation was already counted against the slot.
    AlreadyClaimed(CapacitySlot),
    /// The slot is full and the policy is [`CapacityPolicy::Enforce`].
    CapacityExceeded(CapacitySlot),
}

/// Result of recording a captured payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureRecord {
    /// The payment row was written.
    Recorded(PaymentRecord),
    /// The reservation is no longer `Confirmed`; nothing written.
    NotConfirmed(Reservation),
}

/// Persistence primitives for booking reconciliation.
///
/// Every mutating method is a single atomic operation at the store. Callers
/// never read, modify in memory and write back. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Inserts a reservation if no reservation with the same ID exists.
    ///
    /// Returns false, writing nothing, if the ID is already taken.
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<bool>;

    /// Retrieves a reservation by ID.
    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>>;

    /// Moves a reservation to `to` if its current status allows it.
    ///
    /// The check and the write are one conditional update. When `to` is
    /// `Confirmed`, `confirmed_at` is set to `at` unless it is already set.
    async fn transition_reservation(
        &self,
        id: ReservationId,
        to: ReservationStatus,
        at: DateTime<Utc>,
    ) -> Result<StatusChange>;

    /// Retrieves the payment record for a gateway transaction.
    async fn find_payment(&self, transaction_id: &str) -> Result<Option<PaymentRecord>>;

    /// Creates or updates the payment record keyed by `transaction_id`.
    ///
    /// Concurrent upserts for the same transaction collapse to one row.
    async fn upsert_payment(&self, upsert: PaymentUpsert) -> Result<PaymentRecord>;

    /// Upserts a captured payment only while its reservation is `Confirmed`.
    ///
    /// The status check and the write are atomic, so a cancellation that
    /// moved the reservation on after it was confirmed is never overwritten
    /// by a late capture.
    async fn record_capture(&self, upsert: PaymentUpsert) -> Result<CaptureRecord>;

    /// Counts a reservation against a slot, creating the slot on first use
    /// with `max_slots = 1, booked_slots = 1`.
    ///
    /// The claim and the increment commit together; a reservation that
    /// already holds a claim is not counted again.
    async fn reserve_slot(&self, claim: SlotClaim, policy: CapacityPolicy)
    -> Result<SlotReservation>;

    /// Retrieves a capacity slot.
    async fn get_slot(&self, key: &SlotKey) -> Result<Option<CapacitySlot>>;

    /// Adds one booking of `amount` to the customer's statistics if
    /// `booked_at` is newer than their `last_booking_at`.
    ///
    /// Compare-and-set at the store; returns whether the stats were updated.
    async fn record_customer_booking(
        &self,
        customer_id: CustomerId,
        amount: Money,
        booked_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Retrieves a customer's booking statistics.
    async fn get_customer_stats(&self, customer_id: CustomerId) -> Result<Option<CustomerStats>>;

    /// Records an amount discrepancy, once per transaction.
    ///
    /// Returns false if one was already recorded for the transaction.
    async fn record_discrepancy(&self, discrepancy: &AmountDiscrepancy) -> Result<bool>;

    /// Lists recorded discrepancies, oldest first.
    async fn list_discrepancies(&self) -> Result<Vec<AmountDiscrepancy>>;
}
