//! Application layer: queue façade, workflow machine, executors, daemon.

pub mod agent_registry;
pub mod daemon;
pub mod executor_pool;
pub mod task_queue;
pub mod workflow_executor;
pub mod workflow_machine;

pub use agent_registry::AgentRegistry;
pub use daemon::Daemon;
pub use executor_pool::{ExecutorPool, PoolMetrics, SubmitError};
pub use task_queue::{CancelOutcome, TaskQueue};
pub use workflow_executor::{ExecutionOutcome, WorkflowExecutor};
pub use workflow_machine::{Action, Invocation, TaskOutcome, WorkflowMachine};
