//! Notification scheduling for confirmed reservations.
//!
//! The [`JobQueue`] trait is the seam to the job-queue collaborator: it takes
//! a payload, an idempotency key and an optional delay, and drops jobs whose
//! key it has already seen. [`NotificationScheduler`] builds the voucher and
//! reminder jobs for a reservation on top of it.

pub mod error;
pub mod job;
pub mod queue;
pub mod scheduler;

pub use error::{NotificationError, Result};
pub use job::{JobKind, NotificationJob};
pub use queue::{EnqueueOutcome, InMemoryJobQueue, JobQueue};
pub use scheduler::{DEFAULT_REMINDER_LEAD_HOURS, NotificationScheduler, ScheduledNotifications};
