//! Job intake and dispatch.

pub mod job;
pub mod memory;
pub mod retry;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueError;

pub use job::{JobError, PipelineJob};
pub use memory::{MemoryJobQueue, QueueSnapshot};
pub use retry::{retry, Exhausted, RetryPolicy};

/// Producer side of a queue. Delivery is at least once.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: PipelineJob) -> Result<(), QueueError>;
}

/// Consumer side: what the queue runs for each job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &PipelineJob) -> Result<(), JobError>;

    /// Called after `handle` was abandoned for exceeding `limit`.
    async fn timed_out(&self, job: &PipelineJob, limit: Duration);
}
