//! Worker pool - each worker claims the next ready request and runs it.

use super::MediaDownloader;
use super::scheduling::Job;

impl MediaDownloader {
    /// Spawn one worker
    ///
    /// The worker loops until shutdown:
    /// 1. Claims the next ready request (see the scheduling rules)
    /// 2. Runs its fetch attempt to completion
    /// 3. When nothing is ready, sleeps until new work is announced or the
    ///    poll interval elapses (requests leaving retry backoff are found by polling)
    ///
    /// A worker never abandons a claimed request: shutdown is observed only
    /// between jobs, so a running fetch is stopped through its own token. A
    /// job that panics fails its request and the worker carries on.
    pub(crate) fn spawn_worker(&self, worker: usize) -> tokio::task::JoinHandle<()> {
        let downloader = self.clone();
        let shutdown = self.queue_state.shutdown.clone();
        let work_available = self.queue_state.work_available.clone();
        let poll_interval = self.config.queue.poll_interval();

        tokio::spawn(async move {
            tracing::debug!(worker, "Worker started");
            loop {
                if shutdown.is_cancelled() {
                    break;
                }

                if let Some(job) = downloader.dispatch_next().await {
                    downloader.run_guarded(job).await;
                    continue;
                }

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = work_available.notified() => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            tracing::debug!(worker, "Worker stopped");
        })
    }

    /// Run a job in its own task so a panic cannot take the worker down
    async fn run_guarded(&self, job: Job) {
        let id = job.request.id;
        let downloader = self.clone();
        if let Err(e) = tokio::spawn(async move { downloader.run_job(job).await }).await {
            tracing::error!(request_id = id.0, error = %e, "Job task panicked");
            self.abandon_request(id, "job task panicked").await;
        }
    }
}
