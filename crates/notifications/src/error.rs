//! Notification error types.

use thiserror::Error;

/// Errors that can occur while scheduling notifications.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The job queue rejected or could not accept the job.
    #[error("Job queue unavailable: {0}")]
    QueueUnavailable(String),

    /// The job payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for notification results.
pub type Result<T> = std::result::Result<T, NotificationError>;
