//! Domain models.

pub mod config;
pub mod task;
pub mod workflow;

pub use config::{
    AgentConfig, Config, DatabaseConfig, LoggingConfig, ServerConfig, StoreRetryConfig,
    WorkflowConfig,
};
pub use task::{Task, TaskKind, TaskPayload, TaskSpec, TaskStatus};
pub use workflow::{Phase, PhaseOutcome, PhaseResult, WorkflowState};
