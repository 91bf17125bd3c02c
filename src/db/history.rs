//! Completion records, per-user history and platform statistics.

use crate::sink::ResultSink;
use crate::types::{
    CompletionRecord, HistoryEntry, PlatformStats, RequestResult, RequestState, UserId,
};
use crate::{Error, Result};
use async_trait::async_trait;

use super::{Database, HistoryRow, PlatformStatsRow};

impl Database {
    /// Store a finished request
    ///
    /// Idempotent: recording the same request twice leaves one history row and
    /// counts it once in the platform statistics. Returns `true` when a new
    /// row was written.
    pub async fn record_completion(&self, record: &CompletionRecord) -> Result<bool> {
        let (title, file_size, duration_secs) = match &record.result {
            RequestResult::Succeeded { artifact } => (
                Some(artifact.title.clone()),
                Some(artifact.size_bytes as i64),
                artifact.duration_s,
            ),
            _ => (None, None, None),
        };
        let (error_kind, error_message) = match &record.result {
            RequestResult::Failed { error } => {
                (Some(error.kind.as_str()), Some(error.message.clone()))
            }
            _ => (None, None),
        };
        let state = record.state();
        let finished_at = record.finished_at.timestamp_millis();

        let mut tx = self.pool.begin().await.map_err(Error::Sqlx)?;

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO downloads (
                request_id, user_id, username, url, platform, quality, state, success,
                title, file_size, duration_secs, error_kind, error_message, attempts,
                submitted_at, finished_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.get() as i64)
        .bind(record.user_id.as_str())
        .bind(&record.username)
        .bind(&record.url)
        .bind(record.platform.as_str())
        .bind(record.quality.to_string())
        .bind(state.to_string())
        .bind(matches!(record.result, RequestResult::Succeeded { .. }))
        .bind(title)
        .bind(file_size)
        .bind(duration_secs)
        .bind(error_kind)
        .bind(error_message)
        .bind(record.attempts as i64)
        .bind(record.submitted_at.timestamp_millis())
        .bind(finished_at)
        .execute(&mut *tx)
        .await
        .map_err(Error::Sqlx)?;
        let inserted = result.rows_affected() == 1;

        if inserted {
            let (succeeded, failed, cancelled) = match state {
                RequestState::Succeeded => (1, 0, 0),
                RequestState::Failed => (0, 1, 0),
                _ => (0, 0, 1),
            };
            sqlx::query(
                r#"
                INSERT INTO platform_stats (
                    platform, total, succeeded, failed, cancelled, total_bytes, last_used
                )
                VALUES (?, 1, ?, ?, ?, ?, ?)
                ON CONFLICT(platform) DO UPDATE SET
                    total = total + 1,
                    succeeded = succeeded + excluded.succeeded,
                    failed = failed + excluded.failed,
                    cancelled = cancelled + excluded.cancelled,
                    total_bytes = total_bytes + excluded.total_bytes,
                    last_used = MAX(last_used, excluded.last_used)
                "#,
            )
            .bind(record.platform.as_str())
            .bind(succeeded)
            .bind(failed)
            .bind(cancelled)
            .bind(file_size.unwrap_or(0))
            .bind(finished_at)
            .execute(&mut *tx)
            .await
            .map_err(Error::Sqlx)?;
        }

        tx.commit().await.map_err(Error::Sqlx)?;
        Ok(inserted)
    }

    /// A user's most recent finished requests, newest first
    pub async fn user_history(&self, user_id: &UserId, limit: usize) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, request_id, user_id, username, url, platform, quality, state,
                   title, file_size, duration_secs, error_kind, error_message, attempts,
                   submitted_at, finished_at
            FROM downloads
            WHERE user_id = ?
            ORDER BY finished_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(rows.into_iter().map(HistoryEntry::from).collect())
    }

    /// Count a user's finished requests
    pub async fn count_user_history(&self, user_id: &UserId) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM downloads WHERE user_id = ?")
            .bind(user_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Sqlx)
    }

    /// Counters for every platform that has finished at least one request, busiest first
    pub async fn platform_stats(&self) -> Result<Vec<PlatformStats>> {
        let rows = sqlx::query_as::<_, PlatformStatsRow>(
            r#"
            SELECT platform, total, succeeded, failed, cancelled, total_bytes, last_used
            FROM platform_stats
            ORDER BY total DESC, platform ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(rows.into_iter().map(PlatformStats::from).collect())
    }

    /// Delete history rows that finished before the given unix timestamp (milliseconds)
    ///
    /// Platform counters are cumulative and are not touched. Returns the number
    /// of rows deleted.
    pub async fn delete_history_before(&self, before_millis: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM downloads WHERE finished_at < ?")
            .bind(before_millis)
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ResultSink for Database {
    async fn record(&self, record: &CompletionRecord) -> Result<()> {
        if !self.record_completion(record).await? {
            tracing::debug!(request_id = record.id.0, "Duplicate completion record ignored");
        }
        Ok(())
    }
}
