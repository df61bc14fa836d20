//! Agent port.
//!
//! An agent executes a single phase's work and is opaque to the
//! orchestrator. Registered agents MUST be idempotent under repeat
//! invocation with the same input: after a crash or a retry the
//! orchestrator re-invokes with at-least-once semantics.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::{Phase, PhaseResult, TaskPayload};

/// Input record handed to an agent for one phase invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInput {
    pub task_id: Uuid,
    pub phase: Phase,
    pub payload: TaskPayload,
    /// Results of previously entered phases, latest per phase. A coder
    /// re-entered after a failed review finds the reviewer's feedback here.
    pub prior_results: BTreeMap<Phase, PhaseResult>,
}

/// Infrastructure-level agent failures (spawn error, broken pipe, bad
/// output). A phase-level failure is not an error: it is a `PhaseResult`
/// with failure status.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Failed to spawn agent process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Agent I/O error: {0}")]
    Io(#[source] std::io::Error),

    #[error("Agent produced invalid output: {0}")]
    InvalidOutput(String),

    #[error("Agent exited with status {0}")]
    NonZeroExit(i32),
}

/// A pluggable executor of a single phase's work.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Registry name, referenced by the workflow phase table.
    fn name(&self) -> &str;

    /// Execute one phase. The caller enforces the wall-clock timeout; the
    /// returned future should honor cancellation promptly when dropped.
    async fn execute(&self, input: AgentInput) -> Result<PhaseResult, AgentError>;

    /// Per-agent timeout override in seconds, if configured.
    fn timeout_override_secs(&self) -> Option<u64> {
        None
    }
}
