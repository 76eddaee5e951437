//! Reservation lifecycle and payment status.

use serde::{Deserialize, Serialize};

use crate::StoreError;

/// The lifecycle status of a reservation.
///
/// ```text
/// PendingPayment ──┬──► Confirmed ──────────┐
///                  ├──► PaymentFailed ──┬───┼──► Cancelled
///                  │         └──────────┼─► Confirmed
///                  └────────────────────┴──► Cancelled
/// ```
///
/// Precedence between terminal outcomes:
/// - `Cancelled` absorbs everything; nothing leaves it.
/// - `Confirmed` only yields to `Cancelled` (a cancellation delivered after
///   the success, i.e. last write wins between the two).
/// - `PaymentFailed` yields to `Confirmed` (the gateway later captured the
///   money) and to `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Created by checkout, awaiting a payment outcome.
    #[default]
    PendingPayment,

    /// Payment captured.
    Confirmed,

    /// Payment attempt failed.
    PaymentFailed,

    /// Payment canceled or booking cancelled.
    Cancelled,
}

impl ReservationStatus {
    pub const ALL: [ReservationStatus; 4] = [
        ReservationStatus::PendingPayment,
        ReservationStatus::Confirmed,
        ReservationStatus::PaymentFailed,
        ReservationStatus::Cancelled,
    ];

    /// Returns true if a reservation in this status may move to `next`.
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;

        matches!(
            (self, next),
            (PendingPayment, Confirmed | PaymentFailed | Cancelled)
                | (PaymentFailed, Confirmed | Cancelled)
                | (Confirmed, Cancelled)
        )
    }

    /// Statuses from which `next` is reachable in one step.
    ///
    /// Used by stores to express transitions as a single conditional update.
    pub fn predecessors_of(next: ReservationStatus) -> Vec<ReservationStatus> {
        Self::ALL
            .into_iter()
            .filter(|status| status.can_transition_to(next))
            .collect()
    }

    /// Returns true once any payment outcome has been applied.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::PendingPayment)
    }

    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::PendingPayment => "pending_payment",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::PaymentFailed => "payment_failed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| StoreError::CorruptRecord {
                table: "reservations",
                reason: format!("unknown status '{s}'"),
            })
    }
}

/// Status of a payment record, as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Succeeded,
    Failed,
    Canceled,
}

impl PaymentStatus {
    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            "canceled" => Ok(PaymentStatus::Canceled),
            other => Err(StoreError::CorruptRecord {
                table: "payments",
                reason: format!("unknown status '{other}'"),
            }),
        }
    }
}
