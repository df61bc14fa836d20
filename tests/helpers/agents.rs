//! Scripted in-process agents for executor and daemon tests.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

use taskmill::application::AgentRegistry;
use taskmill::domain::models::{PhaseResult, WorkflowConfig};
use taskmill::domain::ports::{Agent, AgentError, AgentInput};

/// Agent that replays a scripted sequence of results, then repeats a
/// default. Counts invocations.
pub struct ScriptedAgent {
    name: String,
    script: Mutex<VecDeque<PhaseResult>>,
    default: PhaseResult,
    delay: Option<Duration>,
    invocations: Arc<AtomicU32>,
}

impl ScriptedAgent {
    pub fn succeeding(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            default: PhaseResult::success(json!({"agent": name})),
            delay: None,
            invocations: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn failing(name: &str, error: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            default: PhaseResult::failure(error),
            delay: None,
            invocations: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Replay `script` in order, then fall back to success.
    pub fn with_script(name: &str, script: Vec<PhaseResult>) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            default: PhaseResult::success(json!({"agent": name})),
            delay: None,
            invocations: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared invocation counter, usable after the agent moves into the
    /// registry.
    pub fn counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.invocations)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _input: AgentInput) -> Result<PhaseResult, AgentError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().await.pop_front();
        Ok(next.unwrap_or_else(|| self.default.clone()))
    }
}

/// Agent that blocks until its gate opens, for pool capacity tests.
pub struct GatedAgent {
    name: String,
    gate: watch::Receiver<bool>,
    entered: Arc<AtomicU32>,
}

impl GatedAgent {
    /// Returns the agent and the sender that opens the gate.
    pub fn new(name: &str) -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                name: name.to_string(),
                gate: rx,
                entered: Arc::new(AtomicU32::new(0)),
            },
            tx,
        )
    }

    pub fn entered(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.entered)
    }
}

#[async_trait]
impl Agent for GatedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _input: AgentInput) -> Result<PhaseResult, AgentError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.clone();
        while !*gate.borrow() {
            if gate.changed().await.is_err() {
                break;
            }
        }
        Ok(PhaseResult::success(json!({})))
    }
}

/// Registry with succeeding agents for all four workflow roles.
pub fn all_succeeding_registry() -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    for name in ["test-generator", "coder", "reviewer", "deployer"] {
        registry.register(Arc::new(ScriptedAgent::succeeding(name)));
    }
    registry
}

/// Workflow config with short timeouts suitable for tests.
pub fn fast_workflow_config() -> WorkflowConfig {
    WorkflowConfig {
        max_code_impl_retries: 3,
        e2e_test_gen_timeout_secs: 5,
        code_impl_timeout_secs: 5,
        review_timeout_secs: 5,
        deploy_timeout_secs: 5,
        e2e_validate_timeout_secs: 5,
    }
}
