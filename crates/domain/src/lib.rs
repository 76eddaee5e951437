//! Domain layer for booking reconciliation.
//!
//! This crate holds the rules that sit on top of the booking store:
//! - [`ReservationService`]: payment-driven reservation transitions with the
//!   idempotency short-circuit and amount discrepancy recording
//! - [`CapacityLedger`]: one slot increment per confirmed reservation
//! - [`CustomerLedger`]: once-per-reservation customer statistics

pub mod capacity;
pub mod customer;
pub mod error;
pub mod reservation;

pub use capacity::CapacityLedger;
pub use customer::CustomerLedger;
pub use error::{DomainError, Result};
pub use reservation::{DEFAULT_CURRENCY, PaymentClosure, ReservationService, SuccessOutcome};
