//! Payment webhook reconciliation.
//!
//! [`WebhookReconciler`] is the entry point for gateway deliveries. It
//! authenticates the raw body with [`SignatureVerifier`], parses it into a
//! [`PaymentEvent`], and drives the reservation, capacity, customer and
//! notification collaborators to a consistent state. The returned
//! [`WebhookAck`] tells the sender whether the delivery was processed,
//! rejected, or should be retried.

pub mod error;
pub mod events;
pub mod reconciler;
pub mod signature;

pub use error::{ReconcileError, Result};
pub use events::{
    CheckoutCompleted, CheckoutReservation, EventParseError, PaymentClosed, PaymentEvent,
    PaymentSucceeded, WebhookEvent, parse_event,
};
pub use reconciler::{AckStatus, ReconcileOutcome, ReconcilerConfig, WebhookAck, WebhookReconciler};
pub use signature::{
    DEFAULT_TOLERANCE_SECS, SIGNATURE_HEADER, SignatureError, SignatureVerifier, Verification, sign,
};
