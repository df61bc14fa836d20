//! Task domain model.
//!
//! A task is one submitted unit of work with a durable lifecycle. Its
//! embedded [`WorkflowState`] tracks progress through the workflow phases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::workflow::WorkflowState;

/// Status of a task in the queue.
///
/// Wire and storage form is SCREAMING_SNAKE_CASE (`"QUEUED"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Task is persisted and claimable.
    Queued,
    /// Task is owned by exactly one executor.
    Running,
    /// Workflow reached COMPLETE.
    Completed,
    /// Workflow reached FAILED.
    Failed,
    /// Cancelled via the API.
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "QUEUED" => Some(Self::Queued),
            "RUNNING" => Some(Self::Running),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Valid transitions from this status.
    ///
    /// Running -> Queued is the crash-recovery release; terminal statuses
    /// never transition further.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Queued => &[Self::Running, Self::Cancelled],
            Self::Running => &[Self::Completed, Self::Failed, Self::Cancelled, Self::Queued],
            Self::Completed | Self::Failed | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminator selecting a workflow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// The five-phase TDD loop: test gen, implement, review, deploy, validate.
    FivePhaseTdd,
}

impl Default for TaskKind {
    fn default() -> Self {
        Self::FivePhaseTdd
    }
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FivePhaseTdd => "five_phase_tdd",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "five_phase_tdd" => Some(Self::FivePhaseTdd),
            _ => None,
        }
    }
}

/// Workflow input carried by a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Feature description handed to the agents.
    pub feature: String,
    /// URL of the application under development.
    pub target_url: String,
    /// Optional staging deployment target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_url: Option<String>,
}

impl TaskPayload {
    /// Validate the required fields. Empty strings count as missing.
    pub fn validate(&self) -> Result<(), String> {
        if self.feature.trim().is_empty() {
            return Err("payload.feature is required".to_string());
        }
        if self.target_url.trim().is_empty() {
            return Err("payload.target_url is required".to_string());
        }
        Ok(())
    }
}

/// Submission request for a new task, before an id is minted.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSpec {
    pub kind: TaskKind,
    #[serde(default = "default_priority")]
    pub priority: i32,
    pub payload: TaskPayload,
}

pub(crate) const fn default_priority() -> i32 {
    5
}

/// One submitted unit of work with a durable lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub kind: TaskKind,
    /// Higher priority claims earlier. Default 5.
    pub priority: i32,
    pub status: TaskStatus,
    /// Times a worker has claimed this task.
    pub attempts: u32,
    /// Executor currently owning the task, if any.
    pub worker_id: Option<String>,
    /// Cooperative cancellation flag, observed at phase boundaries.
    pub cancel_requested: bool,
    pub payload: TaskPayload,
    /// Embedded workflow progression record.
    pub workflow: WorkflowState,
    /// Final success summary once COMPLETED.
    pub result: Option<serde_json::Value>,
    /// Human-readable error once FAILED or CANCELLED.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new QUEUED task from a submission spec.
    pub fn new(spec: TaskSpec) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind: spec.kind,
            priority: spec.priority,
            status: TaskStatus::Queued,
            attempts: 0,
            worker_id: None,
            cancel_requested: false,
            payload: spec.payload,
            workflow: WorkflowState::new(now),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            claimed_at: None,
            completed_at: None,
        }
    }
}
