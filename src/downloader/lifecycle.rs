//! Drain and shutdown coordination.

use crate::types::{DrainReport, Event, RequestId, RequestState};
use std::time::Duration;

use super::MediaDownloader;
use super::control::{Cancelled, cancel_locked};

/// How long cancelled running requests get to return after the deadline
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Interval at which the drain re-checks running requests
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

impl MediaDownloader {
    /// Stop admissions, let running requests finish, then stop the workers
    ///
    /// This method performs the shutdown sequence:
    /// 1. Stops admitting submissions and cancels every queued request
    /// 2. Waits up to `deadline` for running requests to finish on their own
    /// 3. Cancels the requests still running and gives them a short grace period
    /// 4. Stops workers and background services
    /// 5. Deletes artifacts still awaiting delivery
    /// 6. Waits for pending result sink writes (what is left of `deadline`,
    ///    at least the cancel grace period)
    ///
    /// A fetch that ignores its cancellation token keeps its worker busy; such
    /// requests are counted in [`DrainReport::still_blocked`] and their workers
    /// are left to finish in the background. Calling this again after a drain
    /// returns an empty report.
    pub async fn drain_and_stop(&self, deadline: Duration) -> DrainReport {
        let mut report = DrainReport::default();
        let started_at = tokio::time::Instant::now();

        // 1. Stop admissions and cancel queued work
        let (queued, running_at_start) = {
            let mut inner = self.queue_state.inner.lock().await;
            if !inner.accepting && self.queue_state.shutdown.is_cancelled() {
                return report;
            }
            inner.accepting = false;

            let queued: Vec<RequestId> = inner.queued.iter().copied().collect();
            let finished: Vec<_> = queued
                .into_iter()
                .filter_map(|id| match cancel_locked(&mut inner, id) {
                    Ok(Cancelled::Queued(f)) => Some(f),
                    _ => None,
                })
                .collect();
            (finished, inner.running)
        };
        report.cancelled_queued = queued.len();
        tracing::info!(
            cancelled_queued = report.cancelled_queued,
            running = running_at_start,
            deadline_secs = deadline.as_secs_f64(),
            "Draining queue"
        );
        for finished in queued {
            self.deliver(finished).await;
        }

        // 2. Let running requests finish
        let drained = tokio::time::timeout(deadline, self.wait_for_running())
            .await
            .is_ok();

        // 3. Cancel what is left
        if drained {
            report.finished_in_time = running_at_start;
        } else {
            let signalled = {
                let mut inner = self.queue_state.inner.lock().await;
                let running: Vec<RequestId> = inner
                    .requests
                    .values()
                    .filter(|r| r.state == RequestState::Running)
                    .map(|r| r.id)
                    .collect();
                running
                    .into_iter()
                    .filter(|id| {
                        matches!(cancel_locked(&mut inner, *id), Ok(Cancelled::Signalled))
                    })
                    .count()
            };
            report.cancelled_running = signalled;
            report.finished_in_time = running_at_start.saturating_sub(signalled);
            tracing::warn!(
                cancelled_running = signalled,
                "Drain deadline reached, cancelling running requests"
            );

            if tokio::time::timeout(CANCEL_GRACE, self.wait_for_running())
                .await
                .is_err()
            {
                report.still_blocked = self.queue_state.inner.lock().await.running;
                tracing::warn!(
                    still_blocked = report.still_blocked,
                    "Fetches did not honor cancellation, leaving workers behind"
                );
            }
        }

        // 4. Stop workers and services
        self.queue_state.shutdown.cancel();
        let handles: Vec<_> = std::mem::take(&mut *self.queue_state.tasks.lock().await);
        if report.still_blocked == 0 {
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "Background task ended abnormally");
                }
            }
        }

        // 5. Discard undelivered artifacts
        let removed = self.remove_all_artifacts().await;

        // 6. Flush completion records
        let sink_writes = &self.queue_state.sink_writes;
        sink_writes.close();
        let flush_budget = deadline
            .saturating_sub(started_at.elapsed())
            .max(CANCEL_GRACE);
        if tokio::time::timeout(flush_budget, sink_writes.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                pending = sink_writes.len(),
                "Result sink writes still pending after drain"
            );
        }

        self.emit_event(Event::Shutdown);
        tracing::info!(
            cancelled_queued = report.cancelled_queued,
            finished_in_time = report.finished_in_time,
            cancelled_running = report.cancelled_running,
            still_blocked = report.still_blocked,
            artifacts_removed = removed,
            "Queue drained and stopped"
        );
        report
    }

    /// Whether the queue still admits submissions
    pub async fn is_accepting(&self) -> bool {
        self.queue_state.inner.lock().await.accepting
    }

    /// Wait until no request is running
    async fn wait_for_running(&self) {
        loop {
            let running = self.queue_state.inner.lock().await.running;
            if running == 0 {
                return;
            }
            tracing::debug!(running, "Waiting for running requests to finish");
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}
