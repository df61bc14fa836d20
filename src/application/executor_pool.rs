//! Bounded concurrency host for workflow executors.
//!
//! A counted semaphore caps concurrent executors; `submit` never blocks
//! and never buffers. The pool owns the executor tasks it spawns and is
//! strictly a concurrency and resource boundary: it knows nothing about
//! workflow semantics.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::models::{StoreRetryConfig, Task};

use super::agent_registry::AgentRegistry;
use super::task_queue::TaskQueue;
use super::workflow_executor::{ExecutionOutcome, WorkflowExecutor};
use super::workflow_machine::WorkflowMachine;

/// Rolling duration samples kept for metrics.
const DURATION_WINDOW: usize = 100;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Pool is at capacity")]
    Busy,
    #[error("Pool is shutting down")]
    ShuttingDown,
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolMetrics {
    pub max_concurrent: usize,
    pub active: usize,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub released: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_duration_ms: Option<u64>,
}

#[derive(Default)]
struct PoolInner {
    completed: u64,
    failed: u64,
    cancelled: u64,
    released: u64,
    durations_ms: VecDeque<u64>,
    handles: HashMap<Uuid, JoinHandle<()>>,
}

pub struct ExecutorPool {
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
    accepting: AtomicBool,
    shutting_down: Arc<AtomicBool>,
    inner: Arc<Mutex<PoolInner>>,

    // Executor construction dependencies.
    queue: TaskQueue,
    registry: Arc<AgentRegistry>,
    machine: Arc<WorkflowMachine>,
    store_retry: StoreRetryConfig,
}

impl ExecutorPool {
    pub fn new(
        max_concurrent: usize,
        queue: TaskQueue,
        registry: Arc<AgentRegistry>,
        machine: Arc<WorkflowMachine>,
        store_retry: StoreRetryConfig,
    ) -> Self {
        Self {
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            accepting: AtomicBool::new(true),
            shutting_down: Arc::new(AtomicBool::new(false)),
            inner: Arc::new(Mutex::new(PoolInner::default())),
            queue,
            registry,
            machine,
            store_retry,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Executors currently holding a slot.
    pub fn active_count(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }

    /// Start an executor for a claimed task.
    ///
    /// Non-blocking: when no slot is free the caller gets `Busy` and is
    /// expected to release its claim rather than buffer unbounded.
    pub async fn submit(&self, task: Task) -> Result<(), SubmitError> {
        if !self.accepting.load(Ordering::Relaxed) {
            return Err(SubmitError::ShuttingDown);
        }
        let permit = Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .map_err(|_| SubmitError::Busy)?;

        let task_id = task.id;
        let executor = WorkflowExecutor::new(
            self.queue.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.machine),
            self.store_retry.clone(),
            Arc::clone(&self.shutting_down),
        );
        let inner = Arc::clone(&self.inner);

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let outcome = executor.run(task_id).await;
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            let mut guard = inner.lock().await;
            match outcome {
                ExecutionOutcome::Completed => guard.completed += 1,
                ExecutionOutcome::Failed | ExecutionOutcome::Aborted => guard.failed += 1,
                ExecutionOutcome::Cancelled => guard.cancelled += 1,
                ExecutionOutcome::Released => guard.released += 1,
            }
            guard.durations_ms.push_back(elapsed_ms);
            if guard.durations_ms.len() > DURATION_WINDOW {
                guard.durations_ms.pop_front();
            }
            guard.handles.remove(&task_id);
            drop(guard);
            drop(permit);
        });

        self.inner.lock().await.handles.insert(task_id, handle);
        debug!(task_id = %task_id, active = self.active_count(), "Executor submitted");
        Ok(())
    }

    pub async fn metrics(&self) -> PoolMetrics {
        let guard = self.inner.lock().await;
        let avg_duration_ms = if guard.durations_ms.is_empty() {
            None
        } else {
            Some(guard.durations_ms.iter().sum::<u64>() / guard.durations_ms.len() as u64)
        };
        PoolMetrics {
            max_concurrent: self.max_concurrent,
            active: self.active_count(),
            completed: guard.completed,
            failed: guard.failed,
            cancelled: guard.cancelled,
            released: guard.released,
            avg_duration_ms,
        }
    }

    /// Graceful shutdown.
    ///
    /// Stops intake, signals executors to exit at their next phase
    /// boundary (they release their tasks back to QUEUED), waits up to
    /// `timeout`, then aborts stragglers. Aborted tasks stay RUNNING in
    /// the store and are recovered at next startup.
    pub async fn shutdown(&self, timeout: Duration) {
        self.accepting.store(false, Ordering::Relaxed);
        self.shutting_down.store(true, Ordering::Relaxed);
        info!(active = self.active_count(), "Pool shutting down");

        let handles: Vec<(Uuid, JoinHandle<()>)> =
            self.inner.lock().await.handles.drain().collect();
        let aborts: Vec<_> =
            handles.iter().map(|(task_id, handle)| (*task_id, handle.abort_handle())).collect();

        let drain = futures::future::join_all(handles.into_iter().map(|(_, handle)| handle));
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                remaining = self.active_count(),
                "Shutdown timeout reached, aborting remaining executors"
            );
            for (task_id, abort) in aborts {
                // Aborting a finished executor is a no-op; stragglers stay
                // RUNNING in the store and are released at next startup.
                warn!(task_id = %task_id, "Aborting executor");
                abort.abort();
            }
        }
        info!("Pool shut down");
    }
}
