//! Persistence for reservations, payments, capacity slots and customer stats.
//!
//! The [`BookingStore`] trait exposes only the primitives the reconciliation
//! core needs: conditional status updates, unique-keyed upserts and atomic
//! increments. [`InMemoryBookingStore`] backs tests and local runs;
//! [`PostgresBookingStore`] is the production implementation.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod status;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryBookingStore;
pub use postgres::PostgresBookingStore;
pub use records::{
    AmountDiscrepancy, CapacityPolicy, CapacitySlot, CustomerStats, PaymentRecord, PaymentUpsert,
    Reservation, SlotClaim, SlotKey,
};
pub use status::{PaymentStatus, ReservationStatus};
pub use store::{BookingStore, CaptureRecord, SlotReservation, StatusChange};
