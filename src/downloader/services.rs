//! Background service starters - workers, retention sweeper and rate-limit sweeper.

use std::sync::atomic::Ordering;
use std::time::Duration;

use super::MediaDownloader;

/// Longest gap between two sweeps; longer configured periods are shortened
const MAX_SERVICE_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

impl MediaDownloader {
    /// Start the worker pool and background sweepers
    ///
    /// Spawns `queue.max_concurrent` workers, the artifact retention sweeper
    /// and the rate-limiter sweeper. Calling it again is a no-op. All tasks
    /// stop when [`drain_and_stop`](Self::drain_and_stop) runs.
    pub async fn start(&self) {
        if self.queue_state.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("Downloader already started");
            return;
        }

        let workers = self.config.queue.max_concurrent;
        let mut handles = Vec::with_capacity(workers + 2);
        for worker in 0..workers {
            handles.push(self.spawn_worker(worker));
        }
        handles.push(self.start_retention_sweeper());
        handles.push(self.start_rate_limit_sweeper());

        self.queue_state.tasks.lock().await.extend(handles);
        tracing::info!(workers, "Downloader started");
    }

    /// Periodically delete artifacts whose retention window elapsed
    fn start_retention_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let downloader = self.clone();
        let interval = self.config.retention.sweep_interval;
        self.spawn_periodic("retention sweeper", interval, move || {
            let downloader = downloader.clone();
            async move {
                downloader.sweep_expired_artifacts().await;
            }
        })
    }

    /// Periodically forget users whose rate-limit windows emptied
    fn start_rate_limit_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let limiter = self.limiter.clone();
        let interval = self.config.rate_limit.sweep_interval;
        self.spawn_periodic("rate limit sweeper", interval, move || {
            let limiter = limiter.clone();
            async move {
                let evicted = limiter.sweep().await;
                if evicted > 0 {
                    tracing::debug!(evicted, "Idle rate-limit windows evicted");
                }
            }
        })
    }

    fn spawn_periodic<F, Fut>(
        &self,
        name: &'static str,
        period: Duration,
        mut tick: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.queue_state.shutdown.clone();
        let period = period.min(MAX_SERVICE_PERIOD);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => tick().await,
                }
            }
            tracing::debug!(service = name, "Background service stopped");
        })
    }
}
