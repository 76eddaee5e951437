//! Shared types for the booking reconciliation system.

pub mod ids;
pub mod money;

pub use ids::{CustomerId, PaymentId, ProductId, ReservationId};
pub use money::{Money, MoneyError};
