//! Job queue trait and in-memory implementation.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{NotificationError, Result};
use crate::job::{JobKind, NotificationJob};

/// Whether the queue accepted a job or recognised its idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    Duplicate,
}

/// Job queue collaborator.
///
/// Implementations guarantee at-least-once execution no earlier than the
/// job's delay, and accept each idempotency key once.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: NotificationJob) -> Result<EnqueueOutcome>;
}

#[derive(Debug, Clone)]
struct QueuedJob {
    job: NotificationJob,
    run_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct InMemoryQueueState {
    jobs: Vec<QueuedJob>,
    keys: HashSet<String>,
    fail_on_enqueue: bool,
    fail_on_kind: Option<JobKind>,
}

/// In-memory job queue for testing and local runs.
///
/// Keys are remembered for the life of the queue, so a job cannot be
/// re-enqueued after it has become due.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobQueue {
    state: Arc<RwLock<InMemoryQueueState>>,
}

impl InMemoryJobQueue {
    /// Creates a new empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the queue to reject every enqueue.
    pub async fn set_fail_on_enqueue(&self, fail: bool) {
        self.state.write().await.fail_on_enqueue = fail;
    }

    /// Configures the queue to reject enqueues of one kind only.
    pub async fn set_fail_on_kind(&self, kind: Option<JobKind>) {
        self.state.write().await.fail_on_kind = kind;
    }

    /// Returns the number of accepted jobs.
    pub async fn job_count(&self) -> usize {
        self.state.read().await.jobs.len()
    }

    /// Returns the accepted jobs in enqueue order.
    pub async fn jobs(&self) -> Vec<NotificationJob> {
        self.state
            .read()
            .await
            .jobs
            .iter()
            .map(|queued| queued.job.clone())
            .collect()
    }

    /// Returns the accepted jobs of one kind.
    pub async fn jobs_of_kind(&self, kind: JobKind) -> Vec<NotificationJob> {
        self.jobs()
            .await
            .into_iter()
            .filter(|job| job.kind == kind)
            .collect()
    }

    /// Returns the jobs whose earliest execution time has passed.
    pub async fn due_jobs(&self, now: DateTime<Utc>) -> Vec<NotificationJob> {
        self.state
            .read()
            .await
            .jobs
            .iter()
            .filter(|queued| queued.run_at <= now)
            .map(|queued| queued.job.clone())
            .collect()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: NotificationJob) -> Result<EnqueueOutcome> {
        let mut state = self.state.write().await;

        if state.fail_on_enqueue || state.fail_on_kind == Some(job.kind) {
            return Err(NotificationError::QueueUnavailable(format!(
                "injected failure enqueuing {}",
                job.idempotency_key
            )));
        }

        if !state.keys.insert(job.idempotency_key.clone()) {
            return Ok(EnqueueOutcome::Duplicate);
        }

        let run_at = job.run_at(Utc::now());
        state.jobs.push(QueuedJob { job, run_at });
        Ok(EnqueueOutcome::Enqueued)
    }
}
