//! Priority queue façade over the task store.
//!
//! The queue adds claim/complete/fail/release/cancel semantics on top of
//! the store's CAS transitions. Claim is race-free across concurrent
//! workers: at most one worker ever observes a given task as RUNNING via
//! its own claim.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Task, TaskSpec, TaskStatus, WorkflowState};
use crate::domain::ports::{StatusChange, TaskFilter, TaskStore};

/// Candidates examined per claim attempt before giving up the tick.
const CLAIM_CANDIDATE_LIMIT: usize = 5;

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task was QUEUED (or already cancelled) and is now CANCELLED.
    Cancelled,
    /// The task is RUNNING; the executor will abort at the next phase
    /// boundary.
    Cancelling,
}

#[derive(Clone)]
pub struct TaskQueue {
    store: Arc<dyn TaskStore>,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Validate and persist a new QUEUED task.
    pub async fn enqueue(&self, spec: TaskSpec) -> DomainResult<Task> {
        spec.payload.validate().map_err(DomainError::InvalidTask)?;

        let task = Task::new(spec);
        self.store.put(&task).await?;
        info!(task_id = %task.id, priority = task.priority, "Task enqueued");
        Ok(task)
    }

    /// Claim the highest-priority QUEUED task for `worker_id`.
    ///
    /// Scans claim candidates in (priority desc, created_at asc, id asc)
    /// order and CAS-claims the first one that is still QUEUED. Lost races
    /// fall through to the next candidate.
    pub async fn claim(&self, worker_id: &str) -> DomainResult<Option<Task>> {
        let candidates = self.store.claim_candidates(CLAIM_CANDIDATE_LIMIT).await?;
        for id in candidates {
            let won = self
                .store
                .transition(
                    id,
                    TaskStatus::Queued,
                    StatusChange::Claim { worker_id: worker_id.to_string() },
                )
                .await?;
            if !won {
                debug!(task_id = %id, "Lost claim race, trying next candidate");
                continue;
            }

            let task = self.store.get(id).await?.ok_or(DomainError::TaskNotFound(id))?;
            debug!(task_id = %id, worker_id, "Task claimed");
            return Ok(Some(task));
        }
        Ok(None)
    }

    /// RUNNING -> COMPLETED. Fails with a conflict if the task is not
    /// RUNNING (e.g. cancelled mid-flight, or completed twice).
    pub async fn complete(&self, id: Uuid, result: serde_json::Value) -> DomainResult<()> {
        let done = self
            .store
            .transition(id, TaskStatus::Running, StatusChange::Complete { result })
            .await?;
        if !done {
            return Err(DomainError::TransitionConflict { id, expected: TaskStatus::Running });
        }
        info!(task_id = %id, "Task completed");
        Ok(())
    }

    /// RUNNING -> FAILED, symmetric to [`complete`](Self::complete).
    pub async fn fail(&self, id: Uuid, error: &str) -> DomainResult<()> {
        let done = self
            .store
            .transition(id, TaskStatus::Running, StatusChange::Fail { error: error.to_string() })
            .await?;
        if !done {
            return Err(DomainError::TransitionConflict { id, expected: TaskStatus::Running });
        }
        info!(task_id = %id, error, "Task failed");
        Ok(())
    }

    /// RUNNING -> QUEUED: release a claim whose owner is gone (crash
    /// recovery) or whose submission was rejected by the pool.
    pub async fn release(&self, id: Uuid) -> DomainResult<()> {
        let done =
            self.store.transition(id, TaskStatus::Running, StatusChange::Release).await?;
        if !done {
            return Err(DomainError::TransitionConflict { id, expected: TaskStatus::Running });
        }
        debug!(task_id = %id, "Task released back to queue");
        Ok(())
    }

    /// Finalize a RUNNING task whose executor observed the cancellation
    /// flag at a phase boundary.
    pub async fn finalize_cancelled(&self, id: Uuid) -> DomainResult<()> {
        let done = self
            .store
            .transition(
                id,
                TaskStatus::Running,
                StatusChange::Cancel { error: "cancelled".to_string() },
            )
            .await?;
        if !done {
            return Err(DomainError::TransitionConflict { id, expected: TaskStatus::Running });
        }
        info!(task_id = %id, "Task cancelled at phase boundary");
        Ok(())
    }

    /// Release every RUNNING task back to QUEUED. Called once at daemon
    /// startup: any RUNNING row at that point belongs to a dead owner.
    pub async fn release_all_running(&self) -> DomainResult<usize> {
        let running = self
            .store
            .list(TaskFilter { status: Some(TaskStatus::Running) }, usize::MAX)
            .await?;

        let mut released = 0;
        for task in running {
            if self.store.transition(task.id, TaskStatus::Running, StatusChange::Release).await? {
                warn!(task_id = %task.id, attempts = task.attempts, "Recovered orphaned task");
                released += 1;
            }
        }
        Ok(released)
    }

    /// Cooperative cancellation.
    ///
    /// QUEUED tasks transition straight to CANCELLED; RUNNING tasks get
    /// the flag set and finish at the next phase boundary; terminal tasks
    /// are a conflict.
    pub async fn cancel(&self, id: Uuid) -> DomainResult<CancelOutcome> {
        // Fast path: still queued.
        let cancelled = self
            .store
            .transition(
                id,
                TaskStatus::Queued,
                StatusChange::Cancel { error: "cancelled before execution".to_string() },
            )
            .await?;
        if cancelled {
            info!(task_id = %id, "Queued task cancelled");
            return Ok(CancelOutcome::Cancelled);
        }

        let task = self.store.get(id).await?.ok_or(DomainError::TaskNotFound(id))?;
        match task.status {
            TaskStatus::Running => {
                if self.store.set_cancel_requested(id).await? {
                    info!(task_id = %id, "Cancellation requested for running task");
                    Ok(CancelOutcome::Cancelling)
                } else {
                    // Reached terminal between the lookup and the flag write.
                    Err(DomainError::TransitionConflict { id, expected: TaskStatus::Running })
                }
            }
            TaskStatus::Cancelled => Ok(CancelOutcome::Cancelled),
            _ => Err(DomainError::TransitionConflict { id, expected: TaskStatus::Queued }),
        }
    }

    pub async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
        self.store.get(id).await
    }

    pub async fn list(&self, filter: TaskFilter, limit: usize) -> DomainResult<Vec<Task>> {
        self.store.list(filter, limit).await
    }

    /// Scoped mid-execution write used by the owning executor only.
    pub async fn update_workflow(&self, id: Uuid, workflow: &WorkflowState) -> DomainResult<()> {
        self.store.update_workflow(id, workflow).await
    }

    pub async fn stats(&self) -> DomainResult<HashMap<TaskStatus, u64>> {
        self.store.counts_by_status().await
    }

    pub async fn ping(&self) -> DomainResult<()> {
        self.store.ping().await
    }
}
