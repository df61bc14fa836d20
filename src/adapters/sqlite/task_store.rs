//! SQLite implementation of the `TaskStore` port.
//!
//! Status changes are single guarded UPDATEs (`WHERE id = ? AND status = ?`),
//! which SQLite applies atomically; a lost race shows up as zero affected
//! rows. No higher layer touches `status` any other way.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Task, TaskKind, TaskPayload, TaskStatus, WorkflowState,
};
use crate::domain::ports::{StatusChange, TaskFilter, TaskStore};

#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn put(&self, task: &Task) -> DomainResult<()> {
        let payload_json = serde_json::to_string(&task.payload)?;
        let workflow_json = serde_json::to_string(&task.workflow)?;
        let result_json = task.result.as_ref().map(serde_json::to_string).transpose()?;

        let outcome = sqlx::query(
            r#"INSERT INTO tasks (id, kind, priority, status, attempts, worker_id,
               cancel_requested, payload, workflow_state, result, error,
               created_at, updated_at, claimed_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(task.kind.as_str())
        .bind(task.priority)
        .bind(task.status.as_str())
        .bind(i64::from(task.attempts))
        .bind(&task.worker_id)
        .bind(i32::from(task.cancel_requested))
        .bind(&payload_json)
        .bind(&workflow_json)
        .bind(result_json)
        .bind(&task.error)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .bind(task.claimed_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await;

        match outcome {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(DomainError::TaskAlreadyExists(task.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Task::try_from).transpose()
    }

    async fn list(&self, filter: TaskFilter, limit: usize) -> DomainResult<Vec<Task>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<TaskRow> = match filter.status {
            Some(status) => {
                sqlx::query_as(
                    "SELECT * FROM tasks WHERE status = ?
                     ORDER BY priority DESC, created_at ASC, id ASC LIMIT ?",
                )
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM tasks
                     ORDER BY priority DESC, created_at ASC, id ASC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(Task::try_from).collect()
    }

    async fn claim_candidates(&self, limit: usize) -> DomainResult<Vec<Uuid>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let ids: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM tasks WHERE status = 'QUEUED'
             ORDER BY priority DESC, created_at ASC, id ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        ids.iter().map(|(id,)| super::parse_uuid(id)).collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: TaskStatus,
        change: StatusChange,
    ) -> DomainResult<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let id_str = id.to_string();

        let result = match change {
            StatusChange::Claim { worker_id } => {
                sqlx::query(
                    r#"UPDATE tasks
                       SET status = 'RUNNING', worker_id = ?, attempts = attempts + 1,
                           claimed_at = ?, updated_at = ?
                       WHERE id = ? AND status = ?"#,
                )
                .bind(worker_id)
                .bind(&now)
                .bind(&now)
                .bind(&id_str)
                .bind(expected.as_str())
                .execute(&self.pool)
                .await?
            }
            StatusChange::Complete { result } => {
                let result_json = serde_json::to_string(&result)?;
                sqlx::query(
                    r#"UPDATE tasks
                       SET status = 'COMPLETED', result = ?, worker_id = NULL,
                           completed_at = ?, updated_at = ?
                       WHERE id = ? AND status = ?"#,
                )
                .bind(result_json)
                .bind(&now)
                .bind(&now)
                .bind(&id_str)
                .bind(expected.as_str())
                .execute(&self.pool)
                .await?
            }
            StatusChange::Fail { error } => {
                sqlx::query(
                    r#"UPDATE tasks
                       SET status = 'FAILED', error = ?, worker_id = NULL,
                           completed_at = ?, updated_at = ?
                       WHERE id = ? AND status = ?"#,
                )
                .bind(error)
                .bind(&now)
                .bind(&now)
                .bind(&id_str)
                .bind(expected.as_str())
                .execute(&self.pool)
                .await?
            }
            StatusChange::Release => {
                sqlx::query(
                    r#"UPDATE tasks
                       SET status = 'QUEUED', worker_id = NULL, claimed_at = NULL,
                           updated_at = ?
                       WHERE id = ? AND status = ?"#,
                )
                .bind(&now)
                .bind(&id_str)
                .bind(expected.as_str())
                .execute(&self.pool)
                .await?
            }
            StatusChange::Cancel { error } => {
                sqlx::query(
                    r#"UPDATE tasks
                       SET status = 'CANCELLED', error = ?, worker_id = NULL,
                           completed_at = ?, updated_at = ?
                       WHERE id = ? AND status = ?"#,
                )
                .bind(error)
                .bind(&now)
                .bind(&now)
                .bind(&id_str)
                .bind(expected.as_str())
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() > 0)
    }

    async fn update_workflow(&self, id: Uuid, workflow: &WorkflowState) -> DomainResult<()> {
        let workflow_json = serde_json::to_string(workflow)?;
        let now = chrono::Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE tasks SET workflow_state = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&workflow_json)
        .bind(&now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(id));
        }
        Ok(())
    }

    async fn set_cancel_requested(&self, id: Uuid) -> DomainResult<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE tasks SET cancel_requested = 1, updated_at = ?
             WHERE id = ? AND status = 'RUNNING'",
        )
        .bind(&now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn counts_by_status(&self) -> DomainResult<HashMap<TaskStatus, u64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM tasks GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = HashMap::new();
        for (status_str, count) in rows {
            if let Some(status) = TaskStatus::from_str(&status_str) {
                counts.insert(status, u64::try_from(count).unwrap_or(0));
            }
        }
        Ok(counts)
    }

    async fn ping(&self) -> DomainResult<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    kind: String,
    priority: i32,
    status: String,
    attempts: i64,
    worker_id: Option<String>,
    cancel_requested: i32,
    payload: String,
    workflow_state: String,
    result: Option<String>,
    error: Option<String>,
    created_at: String,
    updated_at: String,
    claimed_at: Option<String>,
    completed_at: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let id = super::parse_uuid(&row.id)?;

        let kind = TaskKind::from_str(&row.kind)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid kind: {}", row.kind)))?;

        let status = TaskStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid status: {}", row.status)))?;

        let payload: TaskPayload = serde_json::from_str(&row.payload)?;
        let workflow: WorkflowState = serde_json::from_str(&row.workflow_state)?;
        let result: Option<serde_json::Value> =
            row.result.as_deref().map(serde_json::from_str).transpose()?;

        Ok(Task {
            id,
            kind,
            priority: row.priority,
            status,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            worker_id: row.worker_id,
            cancel_requested: row.cancel_requested != 0,
            payload,
            workflow,
            result,
            error: row.error,
            created_at: super::parse_datetime(&row.created_at)?,
            updated_at: super::parse_datetime(&row.updated_at)?,
            claimed_at: super::parse_optional_datetime(row.claimed_at)?,
            completed_at: super::parse_optional_datetime(row.completed_at)?,
        })
    }
}
