//! Reconciler error types.

use domain::DomainError;
use notifications::NotificationError;
use thiserror::Error;

use crate::events::EventParseError;
use crate::signature::SignatureError;

/// Errors that stop a webhook from being reconciled.
///
/// Business outcomes such as an unknown reservation or an amount mismatch
/// are not errors; see [`crate::ReconcileOutcome`].
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The event could not be authenticated.
    #[error("Signature verification failed: {0}")]
    Signature(#[from] SignatureError),

    /// The event body is not a well-formed payment event.
    #[error("Malformed event: {0}")]
    Malformed(#[from] EventParseError),

    /// Reservation, capacity or customer persistence failed.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Notification scheduling failed.
    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),
}

impl ReconcileError {
    /// Returns true for failures the sender should retry.
    ///
    /// Only store and queue unavailability qualify. Every reconciliation
    /// step is idempotent, so a retried delivery picks up where it failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Domain(e) => e.is_transient(),
            ReconcileError::Notification(e) => {
                matches!(e, NotificationError::QueueUnavailable(_))
            }
            ReconcileError::Signature(_) | ReconcileError::Malformed(_) => false,
        }
    }

    /// Returns true if the event itself was rejected.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ReconcileError::Signature(_) | ReconcileError::Malformed(_)
        )
    }
}

/// Convenience type alias for reconciler results.
pub type Result<T> = std::result::Result<T, ReconcileError>;
