//! Daemon loop: queue polling, claim distribution, and recovery.
//!
//! The daemon never touches workflow state. It claims QUEUED tasks and
//! hands them to the pool; the claim-then-submit race against pool
//! capacity is closed by releasing the claim on `Busy`.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::domain::errors::DomainResult;

use super::executor_pool::{ExecutorPool, SubmitError};
use super::task_queue::TaskQueue;

pub struct Daemon {
    queue: TaskQueue,
    pool: Arc<ExecutorPool>,
    poll_interval: Duration,
    worker_id: String,
}

impl Daemon {
    pub fn new(queue: TaskQueue, pool: Arc<ExecutorPool>, poll_interval: Duration) -> Self {
        let worker_id = format!("taskmill-{}", uuid::Uuid::new_v4());
        Self { queue, pool, poll_interval, worker_id }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Recover from an unclean shutdown: any task still RUNNING has a
    /// dead owner and goes back to QUEUED with attempts preserved.
    pub async fn recover(&self) -> DomainResult<usize> {
        let released = self.queue.release_all_running().await?;
        if released > 0 {
            info!(released, "Recovered orphaned RUNNING tasks");
        }
        Ok(released)
    }

    /// Poll loop; returns when `shutdown` fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            worker_id = %self.worker_id,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            max_concurrent = self.pool.max_concurrent(),
            "Daemon loop started"
        );

        let mut poll = interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, stopping daemon loop");
                    break;
                }
            }
        }
    }

    /// One poll tick: claim at most one task and submit it.
    async fn tick(&self) {
        // Backpressure: skip the claim entirely while the pool is full.
        if self.pool.active_count() >= self.pool.max_concurrent() {
            return;
        }

        let task = match self.queue.claim(&self.worker_id).await {
            Ok(Some(task)) => task,
            Ok(None) => return,
            Err(e) => {
                error!(error = %e, "Claim failed");
                return;
            }
        };

        let task_id = task.id;
        debug!(task_id = %task_id, priority = task.priority, "Claimed task");

        if let Err(e) = self.pool.submit(task).await {
            match e {
                SubmitError::Busy | SubmitError::ShuttingDown => {
                    // Lost the capacity race; put the claim back.
                    warn!(task_id = %task_id, reason = %e, "Submit rejected, releasing claim");
                    if let Err(release_err) = self.queue.release(task_id).await {
                        error!(task_id = %task_id, error = %release_err, "Release after rejected submit failed");
                    }
                }
            }
        }
    }
}
