//! Notification jobs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use common::ReservationId;
use serde::{Deserialize, Serialize};

/// Kind of notification a job delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Booking voucher, sent as soon as the reservation is confirmed.
    Voucher,
    /// Trip reminder, sent ahead of the start time.
    Reminder,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Voucher => "voucher",
            JobKind::Reminder => "reminder",
        }
    }

    /// Idempotency key for this kind of job for a reservation.
    pub fn key_for(&self, reservation_id: ReservationId) -> String {
        format!("{}:{}", self.as_str(), reservation_id)
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job handed to the queue collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub kind: JobKind,
    pub reservation_id: ReservationId,
    /// Jobs sharing a key are delivered at most once by the queue.
    pub idempotency_key: String,
    pub payload: serde_json::Value,
    /// Earliest execution, relative to enqueue time. `None` runs immediately.
    pub delay: Option<Duration>,
}

impl NotificationJob {
    /// Earliest time the job may run if enqueued at `enqueued_at`.
    pub fn run_at(&self, enqueued_at: DateTime<Utc>) -> DateTime<Utc> {
        match self.delay.and_then(|d| chrono::Duration::from_std(d).ok()) {
            Some(delay) => enqueued_at + delay,
            None => enqueued_at,
        }
    }
}
