//! Customer booking statistics.

use booking_store::{BookingStore, Reservation};

use crate::error::Result;

/// Maintains per-customer booking totals.
///
/// Each reservation is counted at most once: the store only applies the
/// update when the reservation's creation time is newer than the customer's
/// `last_booking_at`, as one compare-and-set. Two concurrent confirmations
/// of the same reservation are resolved by the store's native atomicity;
/// a reservation created before the customer's latest counted booking but
/// confirmed after it is not counted.
pub struct CustomerLedger<S: BookingStore> {
    store: S,
}

impl<S: BookingStore> CustomerLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Adds a confirmed reservation to its customer's totals.
    ///
    /// Returns false if the reservation had already been counted.
    #[tracing::instrument(skip(self, reservation), fields(reservation_id = %reservation.id, customer_id = %reservation.customer_id))]
    pub async fn record_booking(&self, reservation: &Reservation) -> Result<bool> {
        let updated = self
            .store
            .record_customer_booking(
                reservation.customer_id,
                reservation.expected_amount(),
                reservation.created_at,
            )
            .await?;

        if updated {
            tracing::info!("Customer statistics updated");
        } else {
            tracing::debug!("Customer statistics already include reservation");
        }
        Ok(updated)
    }
}
