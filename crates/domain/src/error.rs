//! Domain error types.

use booking_store::StoreError;
use common::{MoneyError, ReservationId};
use thiserror::Error;

/// Errors that can occur during domain operations.
///
/// Business outcomes (unknown reservation, rejected transition, full slot)
/// are not errors; they are reported through the outcome types.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the booking store.
    #[error("Booking store error: {0}")]
    Store(#[from] StoreError),

    /// A stored amount could not be expressed in minor units.
    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    /// A stored reservation holds values the ledgers cannot work with.
    #[error("Invalid reservation {reservation_id}: {reason}")]
    InvalidReservation {
        reservation_id: ReservationId,
        reason: String,
    },
}

impl DomainError {
    /// Returns true if repeating the operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DomainError::Store(StoreError::Database(_) | StoreError::Unavailable(_))
        )
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
