//! Per-task workflow driver.
//!
//! One executor owns exactly one claimed task and drives it phase by
//! phase: reload the task (the store is authoritative), ask the machine
//! for the next action, invoke the agent under its timeout, persist the
//! transition, repeat. Cancellation and shutdown are observed at phase
//! boundaries only.

use backoff::ExponentialBackoff;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Phase, PhaseResult, StoreRetryConfig, Task, WorkflowState};
use crate::domain::ports::AgentInput;

use super::agent_registry::AgentRegistry;
use super::task_queue::TaskQueue;
use super::workflow_machine::{Action, Invocation, TaskOutcome, WorkflowMachine};

/// How one executor run ended, as seen by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Workflow reached COMPLETE; task is COMPLETED.
    Completed,
    /// Workflow reached FAILED; task is FAILED.
    Failed,
    /// Cancellation flag honored at a phase boundary; task is CANCELLED.
    Cancelled,
    /// Shutdown observed at a phase boundary; task released to QUEUED.
    Released,
    /// Persistent store failure; task left RUNNING for startup recovery.
    Aborted,
}

pub struct WorkflowExecutor {
    queue: TaskQueue,
    registry: Arc<AgentRegistry>,
    machine: Arc<WorkflowMachine>,
    store_retry: StoreRetryConfig,
    shutting_down: Arc<AtomicBool>,
}

impl WorkflowExecutor {
    pub fn new(
        queue: TaskQueue,
        registry: Arc<AgentRegistry>,
        machine: Arc<WorkflowMachine>,
        store_retry: StoreRetryConfig,
        shutting_down: Arc<AtomicBool>,
    ) -> Self {
        Self { queue, registry, machine, store_retry, shutting_down }
    }

    /// Drive the claimed task to a terminal state (or a clean release).
    pub async fn run(self, task_id: Uuid) -> ExecutionOutcome {
        // Result of the current phase's invocation, not yet folded into
        // the persisted workflow state.
        let mut pending: Option<(Phase, PhaseResult)> = None;
        // The (phase, error) pair that routed the workflow to FAILED.
        let mut last_failure: Option<(Phase, String)> = None;

        loop {
            let task = match self.load(task_id).await {
                Ok(task) => task,
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "Store unavailable, aborting executor");
                    return ExecutionOutcome::Aborted;
                }
            };

            // Phase boundary checks happen once the in-flight result is
            // persisted, never between an invocation and its persist.
            if pending.is_none() {
                if task.cancel_requested {
                    return self.finish_cancelled(task_id, &task.workflow).await;
                }
                if self.shutting_down.load(Ordering::Relaxed) {
                    debug!(task_id = %task_id, "Shutdown observed, releasing task");
                    if let Err(e) = self.queue.release(task_id).await {
                        warn!(task_id = %task_id, error = %e, "Release on shutdown failed");
                    }
                    return ExecutionOutcome::Released;
                }
            }

            let action = self.machine.decide(&task.workflow, pending.as_ref().map(|(_, r)| r));
            match action {
                Action::Terminate(outcome) => {
                    return self.finish(task_id, &task.workflow, outcome, last_failure).await;
                }
                Action::Transition(next) => {
                    let Some((phase, result)) = pending.take() else {
                        error!(task_id = %task_id, "Transition decided without a pending result");
                        return ExecutionOutcome::Aborted;
                    };
                    if next == Phase::Failed {
                        let reason = result
                            .error
                            .clone()
                            .unwrap_or_else(|| "agent reported failure".to_string());
                        last_failure = Some((phase, reason));
                    }

                    let mut workflow = task.workflow.clone();
                    workflow.advance(phase, result, next);
                    info!(
                        task_id = %task_id,
                        from = %phase,
                        to = %next,
                        retries = workflow.retry_count(Phase::CodeImpl),
                        "Phase transition"
                    );
                    if self.persist_workflow(task_id, &workflow).await.is_err() {
                        error!(task_id = %task_id, "Workflow persist failed, aborting executor");
                        return ExecutionOutcome::Aborted;
                    }
                }
                Action::Invoke(invocation) => {
                    let result = match self.invoke(&task, &invocation).await {
                        Ok(result) => result,
                        Err(e) => {
                            // Unknown agent is a configuration bug: fail the
                            // workflow terminally instead of retrying.
                            let mut workflow = task.workflow.clone();
                            workflow.jump_to(Phase::Failed);
                            let _ = self.persist_workflow(task_id, &workflow).await;
                            let message = format!(
                                "phase {} cannot run: {e}",
                                invocation.phase
                            );
                            if let Err(gate) = self.queue.fail(task_id, &message).await {
                                warn!(task_id = %task_id, error = %gate, "Fail gate lost");
                            }
                            return ExecutionOutcome::Failed;
                        }
                    };
                    pending = Some((invocation.phase, result));
                }
            }
        }
    }

    /// Invoke the agent for one phase under its wall-clock deadline.
    ///
    /// Agent failure and timeout are data (a failure `PhaseResult`); only
    /// an unknown agent name surfaces as an error.
    async fn invoke(&self, task: &Task, invocation: &Invocation) -> DomainResult<PhaseResult> {
        let agent = self
            .registry
            .get(&invocation.agent)
            .ok_or_else(|| DomainError::AgentNotFound(invocation.agent.clone()))?;

        let timeout = agent
            .timeout_override_secs()
            .map_or(invocation.timeout, Duration::from_secs);

        let input = AgentInput {
            task_id: task.id,
            phase: invocation.phase,
            payload: task.payload.clone(),
            prior_results: task.workflow.phase_results.clone(),
        };

        debug!(
            task_id = %task.id,
            agent = %invocation.agent,
            phase = %invocation.phase,
            timeout_secs = timeout.as_secs(),
            "Invoking agent"
        );

        let result = match tokio::time::timeout(timeout, agent.execute(input)).await {
            Ok(Ok(result)) => result,
            Ok(Err(agent_err)) => {
                warn!(task_id = %task.id, agent = %invocation.agent, error = %agent_err, "Agent error");
                PhaseResult::failure(format!("agent '{}' error: {agent_err}", invocation.agent))
            }
            Err(_) => {
                warn!(
                    task_id = %task.id,
                    agent = %invocation.agent,
                    timeout_secs = timeout.as_secs(),
                    "Agent timed out"
                );
                PhaseResult::failure(format!("timeout after {}s", timeout.as_secs()))
            }
        };
        Ok(result)
    }

    async fn load(&self, task_id: Uuid) -> DomainResult<Task> {
        self.with_store_retry(|| async move {
            self.queue.get(task_id).await?.ok_or(DomainError::TaskNotFound(task_id))
        })
        .await
    }

    async fn persist_workflow(&self, task_id: Uuid, workflow: &WorkflowState) -> DomainResult<()> {
        self.with_store_retry(|| async move { self.queue.update_workflow(task_id, workflow).await })
            .await
    }

    /// Retry transient store failures with bounded exponential backoff.
    async fn with_store_retry<T, F, Fut>(&self, operation: F) -> DomainResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = DomainResult<T>>,
    {
        let mut operation = operation;
        let elapsed_cap = self.store_retry.max_backoff_ms
            * u64::from(self.store_retry.max_retries.max(1));
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(self.store_retry.initial_backoff_ms),
            max_interval: Duration::from_millis(self.store_retry.max_backoff_ms),
            max_elapsed_time: Some(Duration::from_millis(elapsed_cap)),
            ..ExponentialBackoff::default()
        };

        backoff::future::retry(policy, || {
            let fut = operation();
            async move {
                fut.await.map_err(|e| match e {
                    DomainError::Store(_) => backoff::Error::transient(e),
                    other => backoff::Error::permanent(other),
                })
            }
        })
        .await
    }

    async fn finish_cancelled(
        &self,
        task_id: Uuid,
        workflow: &WorkflowState,
    ) -> ExecutionOutcome {
        let mut workflow = workflow.clone();
        workflow.jump_to(Phase::Failed);
        if let Err(e) = self.persist_workflow(task_id, &workflow).await {
            warn!(task_id = %task_id, error = %e, "Workflow persist during cancel failed");
        }
        match self.queue.finalize_cancelled(task_id).await {
            Ok(()) => ExecutionOutcome::Cancelled,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Cancel gate lost");
                ExecutionOutcome::Cancelled
            }
        }
    }

    async fn finish(
        &self,
        task_id: Uuid,
        workflow: &WorkflowState,
        outcome: TaskOutcome,
        last_failure: Option<(Phase, String)>,
    ) -> ExecutionOutcome {
        match outcome {
            TaskOutcome::Completed => {
                let result = summarize_success(workflow);
                match self.queue.complete(task_id, result).await {
                    Ok(()) => ExecutionOutcome::Completed,
                    Err(e) => {
                        // Cancelled mid-flight: log and exit without
                        // further mutation.
                        warn!(task_id = %task_id, error = %e, "Complete gate lost");
                        ExecutionOutcome::Completed
                    }
                }
            }
            TaskOutcome::Failed => {
                let message = match last_failure {
                    Some((phase, reason)) => {
                        let retries = workflow.retry_count(Phase::CodeImpl);
                        if retries > 0 {
                            format!("phase {phase} failed after {retries} rework(s): {reason}")
                        } else {
                            format!("phase {phase} failed: {reason}")
                        }
                    }
                    None => "workflow failed".to_string(),
                };
                match self.queue.fail(task_id, &message).await {
                    Ok(()) => ExecutionOutcome::Failed,
                    Err(e) => {
                        warn!(task_id = %task_id, error = %e, "Fail gate lost");
                        ExecutionOutcome::Failed
                    }
                }
            }
        }
    }
}

/// Final result summary: the key artifacts of the run.
fn summarize_success(workflow: &WorkflowState) -> serde_json::Value {
    json!({
        "phases_completed": workflow.phase_results.len(),
        "deployment": workflow.result_for(Phase::Deploy).map(|r| r.data.clone()),
        "validation": workflow.result_for(Phase::E2eValidate).map(|r| r.data.clone()),
    })
}
