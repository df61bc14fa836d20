//! Domain errors for the taskmill orchestrator.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::TaskStatus;

/// Domain-level errors shared by the queue, store, and executor layers.
///
/// Agent failures are deliberately absent: a failing agent produces a
/// `PhaseResult` and is routed by the workflow machine, not raised.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Task already exists: {0}")]
    TaskAlreadyExists(Uuid),

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Transition conflict: task {id} is not {expected}")]
    TransitionConflict { id: Uuid, expected: TaskStatus },

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}
