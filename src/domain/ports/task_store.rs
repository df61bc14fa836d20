//! Task store port.
//!
//! The store is the sole shared mutable resource in the system. All status
//! changes go through [`TaskStore::transition`], a compare-and-set gated on
//! the expected current status; mid-phase workflow updates use the scoped
//! [`TaskStore::update_workflow`].

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskStatus, WorkflowState};

/// Filter criteria for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
}

/// The mutation applied by a CAS transition.
///
/// Each variant carries exactly the fields that status change touches; the
/// adapter turns it into a single guarded UPDATE.
#[derive(Debug, Clone)]
pub enum StatusChange {
    /// QUEUED -> RUNNING: attempts++, worker ownership, claimed_at.
    Claim { worker_id: String },
    /// RUNNING -> COMPLETED: final result, completed_at, ownership cleared.
    Complete { result: serde_json::Value },
    /// RUNNING -> FAILED: error message, completed_at, ownership cleared.
    Fail { error: String },
    /// RUNNING -> QUEUED: crash-recovery release, ownership cleared.
    Release,
    /// QUEUED or RUNNING -> CANCELLED.
    Cancel { error: String },
}

impl StatusChange {
    /// The status this change transitions into.
    pub fn target_status(&self) -> TaskStatus {
        match self {
            Self::Claim { .. } => TaskStatus::Running,
            Self::Complete { .. } => TaskStatus::Completed,
            Self::Fail { .. } => TaskStatus::Failed,
            Self::Release => TaskStatus::Queued,
            Self::Cancel { .. } => TaskStatus::Cancelled,
        }
    }
}

/// Durable persistence of task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task. Fails with `TaskAlreadyExists` on id collision.
    async fn put(&self, task: &Task) -> DomainResult<()>;

    /// Point lookup by id.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>>;

    /// List tasks ordered by (priority desc, created_at asc, id asc).
    async fn list(&self, filter: TaskFilter, limit: usize) -> DomainResult<Vec<Task>>;

    /// Claim candidates: QUEUED task ids in claim order.
    async fn claim_candidates(&self, limit: usize) -> DomainResult<Vec<Uuid>>;

    /// Atomic compare-and-set status transition.
    ///
    /// Returns `true` when the task was in `expected` and the change was
    /// applied, `false` when the precondition failed (lost race, terminal
    /// task). This is the only mechanism that changes `status`.
    async fn transition(
        &self,
        id: Uuid,
        expected: TaskStatus,
        change: StatusChange,
    ) -> DomainResult<bool>;

    /// Overwrite the embedded workflow state without touching status.
    async fn update_workflow(&self, id: Uuid, workflow: &WorkflowState) -> DomainResult<()>;

    /// Set the cooperative cancellation flag on a RUNNING task.
    async fn set_cancel_requested(&self, id: Uuid) -> DomainResult<bool>;

    /// Task counts per status, for metrics.
    async fn counts_by_status(&self) -> DomainResult<std::collections::HashMap<TaskStatus, u64>>;

    /// Cheap liveness probe for the health endpoint.
    async fn ping(&self) -> DomainResult<()>;
}
