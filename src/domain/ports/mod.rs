//! Ports: trait seams implemented by adapters.

pub mod agent;
pub mod task_store;

pub use agent::{Agent, AgentError, AgentInput};
pub use task_store::{StatusChange, TaskFilter, TaskStore};
