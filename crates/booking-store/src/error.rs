use common::ReservationId;
use thiserror::Error;

/// Errors that can occur when interacting with the booking store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be mapped back to a record.
    #[error("Corrupt record in {table}: {reason}")]
    CorruptRecord { table: &'static str, reason: String },

    /// A payment was upserted for a reservation that does not exist.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// The backing store is temporarily unavailable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for booking store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
