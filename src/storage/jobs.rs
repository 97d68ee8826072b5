use anyhow::Result;
use std::time::Duration;

use super::schema::Database;
use super::types::QueueStats;
use crate::queue::{ClaimedJob, FailDisposition, JobOptions};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Database {
    // ========================================================================
    // Job Queue Operations
    // ========================================================================

    pub async fn enqueue_job(&self, queue: &str, payload: &str, options: JobOptions) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
                INSERT INTO jobs
                    (queue, payload, max_attempts, remove_on_complete, remove_on_fail, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                RETURNING id
            "#,
        )
        .bind(queue)
        .bind(payload)
        .bind(i64::from(options.max_attempts.max(1)))
        .bind(options.remove_on_complete)
        .bind(options.remove_on_fail)
        .bind(now_ms())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Claim the oldest available job of a queue and lease it for `lease`.
    ///
    /// A job is available when waiting, or when active with an expired lease
    /// (its worker died or stalled). The claim is a single `UPDATE ... RETURNING`
    /// so two workers can never hold the same lease.
    pub async fn claim_job(&self, queue: &str, lease: Duration) -> Result<Option<ClaimedJob>> {
        let now = now_ms();
        let locked_until = now.saturating_add(lease.as_millis() as i64);
        let row: Option<(i64, String, String, i64, i64)> = sqlx::query_as(
            r#"
                UPDATE jobs
                SET status = 'active', attempts = attempts + 1, locked_until = ?
                WHERE id = (
                    SELECT id FROM jobs
                    WHERE queue = ?
                      AND (status = 'waiting' OR (status = 'active' AND locked_until < ?))
                    ORDER BY id
                    LIMIT 1
                )
                RETURNING id, queue, payload, attempts, max_attempts
            "#,
        )
        .bind(locked_until)
        .bind(queue)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, queue, payload, attempts, max_attempts)| ClaimedJob {
            id,
            queue,
            payload,
            attempts,
            max_attempts,
        }))
    }

    /// Acknowledge a job; removed or kept as completed per its options.
    pub async fn complete_job(&self, job_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM jobs WHERE id = ? AND remove_on_complete = 1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE jobs SET status = 'completed', locked_until = NULL, last_error = NULL WHERE id = ?",
        )
        .bind(job_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// Retryable failures with attempts left go back to waiting; everything
    /// else is removed or marked failed per the job's options.
    pub async fn fail_job(&self, job_id: i64, reason: &str, retryable: bool) -> Result<FailDisposition> {
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction holds the write lock before reading
        sqlx::query("UPDATE jobs SET last_error = ?, locked_until = NULL WHERE id = ?")
            .bind(reason)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        let row: Option<(i64, i64, bool)> =
            sqlx::query_as("SELECT attempts, max_attempts, remove_on_fail FROM jobs WHERE id = ?")
                .bind(job_id)
                .fetch_optional(&mut *tx)
                .await?;

        let disposition = match row {
            None => FailDisposition::Removed,
            Some((attempts, max_attempts, _)) if retryable && attempts < max_attempts => {
                sqlx::query("UPDATE jobs SET status = 'waiting' WHERE id = ?")
                    .bind(job_id)
                    .execute(&mut *tx)
                    .await?;
                FailDisposition::Requeued
            }
            Some((_, _, true)) => {
                sqlx::query("DELETE FROM jobs WHERE id = ?")
                    .bind(job_id)
                    .execute(&mut *tx)
                    .await?;
                FailDisposition::Removed
            }
            Some(_) => {
                sqlx::query("UPDATE jobs SET status = 'failed' WHERE id = ?")
                    .bind(job_id)
                    .execute(&mut *tx)
                    .await?;
                FailDisposition::Failed
            }
        };

        tx.commit().await?;
        Ok(disposition)
    }

    pub async fn queue_stats(&self, queue: &str) -> Result<QueueStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs WHERE queue = ? GROUP BY status")
                .bind(queue)
                .fetch_all(&self.pool)
                .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            match status.as_str() {
                "waiting" => stats.waiting = count,
                "active" => stats.active = count,
                "completed" => stats.completed = count,
                "failed" => stats.failed = count,
                other => tracing::warn!(queue = %queue, status = %other, "Unknown job status"),
            }
        }
        Ok(stats)
    }

    /// Raw payloads of the jobs currently waiting in a queue, oldest first.
    pub async fn waiting_payloads(&self, queue: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT payload FROM jobs WHERE queue = ? AND status = 'waiting' ORDER BY id",
        )
        .bind(queue)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(payload,)| payload).collect())
    }
}
