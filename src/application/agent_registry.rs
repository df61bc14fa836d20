//! Agent registry: name -> handler lookup.
//!
//! Populated once at daemon startup from configuration and read-only
//! afterwards. Unknown agent names are a startup-validated error, not a
//! runtime surprise.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::process::ProcessAgent;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::AgentConfig;
use crate::domain::ports::Agent;

use super::workflow_machine::WorkflowMachine;

#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build subprocess shims for every configured agent.
    pub fn from_config(configs: &[AgentConfig]) -> DomainResult<Self> {
        let mut registry = Self::new();
        for config in configs {
            if config.command.trim().is_empty() {
                return Err(DomainError::InvalidTask(format!(
                    "agent '{}' has an empty command",
                    config.name
                )));
            }
            registry.register(Arc::new(ProcessAgent::from_config(config)));
        }
        Ok(registry)
    }

    /// Register an agent under its own name. Last registration wins.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.name().to_string(), agent);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Ensure every agent the workflow's phase table names is registered.
    pub fn validate_for(&self, machine: &WorkflowMachine) -> DomainResult<()> {
        for name in machine.agent_names() {
            if !self.agents.contains_key(name) {
                return Err(DomainError::AgentNotFound(name.to_string()));
            }
        }
        Ok(())
    }
}
