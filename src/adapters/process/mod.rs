//! Subprocess agent shim.
//!
//! Wire contract: the agent's `AgentInput` is written to the child's
//! stdin as one JSON document; the child writes one `PhaseResult` JSON
//! document to stdout and exits zero. A non-zero exit or unparseable
//! output is an infrastructure-level agent error. `kill_on_drop` bounds
//! invocations abandoned by timeout or shutdown.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::domain::models::{AgentConfig, PhaseResult};
use crate::domain::ports::{Agent, AgentError, AgentInput};

pub struct ProcessAgent {
    name: String,
    command: String,
    args: Vec<String>,
    timeout_secs: Option<u64>,
}

impl ProcessAgent {
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self { name: name.into(), command: command.into(), args, timeout_secs: None }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            name: config.name.clone(),
            command: config.command.clone(),
            args: config.args.clone(),
            timeout_secs: config.timeout_secs,
        }
    }
}

#[async_trait]
impl Agent for ProcessAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout_override_secs(&self) -> Option<u64> {
        self.timeout_secs
    }

    async fn execute(&self, input: AgentInput) -> Result<PhaseResult, AgentError> {
        let input_json = serde_json::to_vec(&input)
            .map_err(|e| AgentError::InvalidOutput(format!("failed to encode input: {e}")))?;

        debug!(
            agent = %self.name,
            command = %self.command,
            task_id = %input.task_id,
            phase = %input.phase,
            "Spawning agent process"
        );

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(AgentError::Spawn)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&input_json).await.map_err(AgentError::Io)?;
            stdin.shutdown().await.map_err(AgentError::Io)?;
        }

        let output = child.wait_with_output().await.map_err(AgentError::Io)?;

        if !output.status.success() {
            return Err(AgentError::NonZeroExit(output.status.code().unwrap_or(-1)));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            AgentError::InvalidOutput(format!(
                "expected one PhaseResult JSON document on stdout: {e}"
            ))
        })
    }
}
