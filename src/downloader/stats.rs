//! Queue snapshots.

use crate::types::{QueueSnapshot, UserLoad};
use tokio::time::Instant;

use super::MediaDownloader;

impl MediaDownloader {
    /// Point-in-time counts of the queue
    ///
    /// Taken under the queue lock, so the figures are mutually consistent.
    /// Never waits on a worker.
    pub async fn snapshot(&self) -> QueueSnapshot {
        let inner = self.queue_state.inner.lock().await;
        let now = Instant::now();

        let waiting_retry = inner
            .queued
            .iter()
            .filter_map(|id| inner.requests.get(id))
            .filter(|r| r.not_before.is_some_and(|t| t > now))
            .count();

        let oldest_queued_at = inner
            .queued
            .iter()
            .filter_map(|id| inner.requests.get(id))
            .map(|r| r.submitted_at)
            .min();

        let mut per_user: Vec<UserLoad> = inner
            .per_user
            .iter()
            .map(|(user_id, counts)| UserLoad {
                user_id: user_id.clone(),
                queued: counts.queued,
                running: counts.running,
            })
            .collect();
        per_user.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        QueueSnapshot {
            queued: inner.queued.len(),
            waiting_retry,
            running: inner.running,
            succeeded: inner.succeeded,
            failed: inner.failed,
            cancelled: inner.cancelled,
            oldest_queued_at,
            per_user,
            workers: self.config.queue.max_concurrent,
            capacity: self.config.queue.capacity,
            accepting: inner.accepting,
        }
    }
}
