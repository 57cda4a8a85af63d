//! Download task queue operations.
//!
//! Status codes follow [`TaskStatus`]: 0 pending, 1 running, 2 fail,
//! 3 dead, 4 success. Only pending and fail rows are eligible for
//! polling; dead and success rows are never handed out again.

use crate::error::DatabaseError;
use crate::types::{TaskId, TaskStats, TaskStatus};
use crate::{Error, Result};

use super::{Database, DownloadTask};

impl Database {
    /// Enqueue a download task for an illustration
    ///
    /// Idempotent: if a task for this illustration already exists (in any
    /// status) the call is a no-op. Returns `true` when a new row was
    /// inserted, `false` when the task was already present.
    pub async fn insert_task_if_absent(&self, illust_id: &str) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (illust_id, status, retry_count, created_at, updated_at)
            VALUES (?, 0, 0, ?, ?)
            ON CONFLICT(illust_id) DO NOTHING
            "#,
        )
        .bind(illust_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert task: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() == 1)
    }

    /// Get the oldest pollable task, if any
    ///
    /// Pollable means pending or fail. Ties on creation time are broken
    /// by insertion order.
    pub async fn find_one_pollable(&self) -> Result<Option<DownloadTask>> {
        let row = sqlx::query_as::<_, DownloadTask>(
            r#"
            SELECT
                id, illust_id, status, retry_count,
                last_run_at, last_run_error, created_at, updated_at
            FROM tasks
            WHERE status IN (0, 2)
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to find pollable task: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get a task by ID
    pub async fn get_task(&self, id: TaskId) -> Result<Option<DownloadTask>> {
        let row = sqlx::query_as::<_, DownloadTask>(
            r#"
            SELECT
                id, illust_id, status, retry_count,
                last_run_at, last_run_error, created_at, updated_at
            FROM tasks
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get task: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get a task by illustration ID
    pub async fn get_task_by_illust(&self, illust_id: &str) -> Result<Option<DownloadTask>> {
        let row = sqlx::query_as::<_, DownloadTask>(
            r#"
            SELECT
                id, illust_id, status, retry_count,
                last_run_at, last_run_error, created_at, updated_at
            FROM tasks
            WHERE illust_id = ?
            "#,
        )
        .bind(illust_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get task by illust: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Mark a task running and charge one attempt
    ///
    /// Increments retry_count, stamps last_run_at and clears the previous
    /// error. Returns the updated row.
    pub async fn mark_task_running(&self, id: TaskId) -> Result<DownloadTask> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 1,
                retry_count = retry_count + 1,
                last_run_at = ?,
                last_run_error = NULL,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark task running: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "Task {} not found",
                id
            ))));
        }

        self.get_task(id).await?.ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!("Task {} not found", id)))
        })
    }

    /// Mark a task successfully completed
    pub async fn mark_task_success(&self, id: TaskId) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query("UPDATE tasks SET status = 4, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to mark task success: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Mark a task failed, retiring it once retries are exhausted
    ///
    /// Records the error message and moves the task to fail, or to dead
    /// when retry_count has reached `max_retry`. Returns the status the
    /// task ended up in.
    pub async fn mark_task_failed(
        &self,
        id: TaskId,
        error: &str,
        max_retry: u32,
    ) -> Result<TaskStatus> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = CASE WHEN retry_count >= ? THEN 3 ELSE 2 END,
                last_run_error = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(max_retry as i32)
        .bind(error)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark task failed: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "Task {} not found",
                id
            ))));
        }

        let status: i32 = sqlx::query_scalar("SELECT status FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to read back task status: {}",
                    e
                )))
            })?;

        Ok(TaskStatus::from_i32(status))
    }

    /// List tasks with a specific status
    pub async fn list_tasks_by_status(&self, status: i32) -> Result<Vec<DownloadTask>> {
        let rows = sqlx::query_as::<_, DownloadTask>(
            r#"
            SELECT
                id, illust_id, status, retry_count,
                last_run_at, last_run_error, created_at, updated_at
            FROM tasks
            WHERE status = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list tasks by status: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Count tasks per status
    pub async fn task_stats(&self) -> Result<TaskStats> {
        let rows = sqlx::query_as::<_, (i32, i64)>(
            "SELECT status, COUNT(*) FROM tasks GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to count tasks: {}",
                e
            )))
        })?;

        let mut stats = TaskStats::default();
        for (status, count) in rows {
            let count = count as usize;
            match TaskStatus::from_i32(status) {
                TaskStatus::Pending => stats.pending += count,
                TaskStatus::Running => stats.running += count,
                TaskStatus::Fail => stats.fail += count,
                TaskStatus::Dead => stats.dead += count,
                TaskStatus::Success => stats.success += count,
            }
        }

        Ok(stats)
    }
}
