//! Core downloader implementation split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`queue`] - Admission: validation, rate limiting, capacity checks
//! - [`scheduling`] - FIFO dispatch with the anti-starvation slot
//! - [`queue_processor`] - Worker pool
//! - [`download_task`] - One fetch attempt: timeout, retry decision, completion
//! - [`control`] - Cancellation and status lookups
//! - [`retention`] - Finished artifact storage and expiry
//! - [`stats`] - Queue snapshots
//! - [`lifecycle`] - Drain and shutdown
//! - [`services`] - Background service starters

mod control;
mod download_task;
mod lifecycle;
mod queue;
mod queue_processor;
mod retention;
mod scheduling;
mod services;
mod stats;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::fetch::{FetchOperation, fetcher_from_config};
use crate::platforms::{ContentPolicy, Platform};
use crate::rate_limiter::RateLimiter;
use crate::sink::ResultSink;
use crate::types::{
    CompletionRecord, Event, Quality, RequestId, RequestResult, RequestState, RequestView, UserId,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::PathBuf;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub(crate) use retention::ArtifactStore;

/// A request the queue still owns (queued or running)
pub(crate) struct TrackedRequest {
    pub(crate) id: RequestId,
    pub(crate) user_id: UserId,
    pub(crate) username: Option<String>,
    pub(crate) url: String,
    pub(crate) platform: Platform,
    pub(crate) quality: Quality,
    /// User's duration ceiling, passed on to every attempt
    pub(crate) max_duration_secs: Option<u64>,
    pub(crate) submitted_at: DateTime<Utc>,
    pub(crate) state: RequestState,
    pub(crate) attempt_count: u32,
    /// Not eligible for dispatch before this instant (retry backoff)
    pub(crate) not_before: Option<tokio::time::Instant>,
    /// Backoff used before the current attempt
    pub(crate) last_delay: Option<std::time::Duration>,
    /// Token of the current attempt
    pub(crate) cancel_token: CancellationToken,
    pub(crate) cancel_requested: bool,
    pub(crate) dir: PathBuf,
    pub(crate) completion: Option<oneshot::Sender<CompletionRecord>>,
}

impl TrackedRequest {
    fn view(&self, position: Option<usize>) -> RequestView {
        RequestView {
            id: self.id,
            user_id: self.user_id.clone(),
            url: self.url.clone(),
            platform: self.platform,
            quality: self.quality,
            submitted_at: self.submitted_at,
            state: self.state,
            attempt_count: self.attempt_count,
            position,
            result: None,
        }
    }
}

/// Queued and running counts of one user
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct UserCounts {
    pub(crate) queued: usize,
    pub(crate) running: usize,
}

impl UserCounts {
    pub(crate) fn outstanding(&self) -> usize {
        self.queued + self.running
    }
}

/// A request that just reached a terminal state, with everything needed to
/// deliver it once the queue lock is released
pub(crate) struct Finished {
    pub(crate) record: CompletionRecord,
    pub(crate) completion: Option<oneshot::Sender<CompletionRecord>>,
    pub(crate) dir: PathBuf,
}

/// Everything guarded by the queue lock
pub(crate) struct QueueInner {
    pub(crate) requests: HashMap<RequestId, TrackedRequest>,
    /// Queued request IDs; IDs are assigned monotonically, so this is FIFO order
    pub(crate) queued: BTreeSet<RequestId>,
    pub(crate) running: usize,
    pub(crate) per_user: HashMap<UserId, UserCounts>,
    /// Dispatch sequence number of each user's most recent start
    pub(crate) last_served: HashMap<UserId, u64>,
    pub(crate) dispatch_seq: u64,
    /// Recently finished requests, oldest first
    pub(crate) recent: VecDeque<RequestView>,
    pub(crate) recent_capacity: usize,
    pub(crate) next_id: u64,
    pub(crate) accepting: bool,
    pub(crate) succeeded: u64,
    pub(crate) failed: u64,
    pub(crate) cancelled: u64,
}

impl QueueInner {
    pub(crate) fn new(recent_capacity: usize) -> Self {
        Self {
            requests: HashMap::new(),
            queued: BTreeSet::new(),
            running: 0,
            per_user: HashMap::new(),
            last_served: HashMap::new(),
            dispatch_seq: 0,
            recent: VecDeque::new(),
            recent_capacity,
            next_id: 1,
            accepting: true,
            succeeded: 0,
            failed: 0,
            cancelled: 0,
        }
    }

    pub(crate) fn user_counts(&self, user_id: &UserId) -> UserCounts {
        self.per_user.get(user_id).copied().unwrap_or_default()
    }

    fn adjust_user(&mut self, user_id: &UserId, f: impl FnOnce(&mut UserCounts)) {
        let counts = self.per_user.entry(user_id.clone()).or_default();
        f(counts);
        if counts.outstanding() == 0 {
            self.per_user.remove(user_id);
        }
    }

    /// 1-based position of a queued request
    pub(crate) fn position_of(&self, id: RequestId) -> Option<usize> {
        self.queued.iter().position(|q| *q == id).map(|p| p + 1)
    }

    /// Move a queued request to running
    pub(crate) fn mark_running(&mut self, id: RequestId) -> Option<&mut TrackedRequest> {
        let user_id = self.requests.get(&id)?.user_id.clone();
        if !self.queued.remove(&id) {
            return None;
        }
        self.running += 1;
        self.adjust_user(&user_id, |c| {
            c.queued -= 1;
            c.running += 1;
        });
        self.dispatch_seq += 1;
        self.last_served.insert(user_id, self.dispatch_seq);
        self.requests.get_mut(&id)
    }

    /// Move a running request back to the queue for a retry
    pub(crate) fn mark_requeued(&mut self, id: RequestId) {
        let Some(user_id) = self.requests.get(&id).map(|r| r.user_id.clone()) else {
            return;
        };
        self.running = self.running.saturating_sub(1);
        self.queued.insert(id);
        self.adjust_user(&user_id, |c| {
            c.running = c.running.saturating_sub(1);
            c.queued += 1;
        });
    }

    /// Remove a request from the live table and record its outcome
    pub(crate) fn finalize(&mut self, id: RequestId, result: RequestResult) -> Option<Finished> {
        let mut req = self.requests.remove(&id)?;

        match req.state {
            RequestState::Queued => {
                self.queued.remove(&id);
                self.adjust_user(&req.user_id, |c| c.queued = c.queued.saturating_sub(1));
            }
            RequestState::Running => {
                self.running = self.running.saturating_sub(1);
                self.adjust_user(&req.user_id, |c| c.running = c.running.saturating_sub(1));
            }
            _ => {}
        }

        match result.state() {
            RequestState::Succeeded => self.succeeded += 1,
            RequestState::Failed => self.failed += 1,
            _ => self.cancelled += 1,
        }

        req.state = result.state();
        let mut view = req.view(None);
        view.result = Some(result.clone());
        self.recent.push_back(view);
        while self.recent.len() > self.recent_capacity {
            self.recent.pop_front();
        }

        let record = CompletionRecord {
            id,
            user_id: req.user_id,
            username: req.username,
            url: req.url,
            platform: req.platform,
            quality: req.quality,
            attempts: req.attempt_count,
            submitted_at: req.submitted_at,
            finished_at: Utc::now(),
            result,
        };

        Some(Finished {
            record,
            completion: req.completion.take(),
            dir: req.dir,
        })
    }

    /// Terminal view of a recently finished request
    pub(crate) fn recent(&self, id: RequestId) -> Option<&RequestView> {
        self.recent.iter().rev().find(|v| v.id == id)
    }
}

/// Queue and worker state management
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Request table, queued order and per-user counters (one lock for all of them)
    pub(crate) inner: std::sync::Arc<tokio::sync::Mutex<QueueInner>>,
    /// Wakes idle workers when work is queued
    pub(crate) work_available: std::sync::Arc<tokio::sync::Notify>,
    /// Worker and service task handles
    pub(crate) tasks: std::sync::Arc<tokio::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>>,
    /// Whether `start` already ran
    pub(crate) started: std::sync::Arc<std::sync::atomic::AtomicBool>,
    /// Stops workers and background services
    pub(crate) shutdown: CancellationToken,
    /// Result sink writes still in flight
    pub(crate) sink_writes: TaskTracker,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: std::sync::Arc<Config>,
    /// Fetch implementation (trait object for pluggable implementations)
    pub(crate) fetcher: std::sync::Arc<dyn FetchOperation>,
    /// Receives every completion record
    pub(crate) sink: std::sync::Arc<dyn ResultSink>,
    /// History database, when the sink is the SQLite store
    pub(crate) history: Option<std::sync::Arc<Database>>,
    /// Per-user admission limiter
    pub(crate) limiter: std::sync::Arc<RateLimiter>,
    /// URL allowlist and blocklist
    pub(crate) policy: std::sync::Arc<ContentPolicy>,
    /// Queue and worker state
    pub(crate) queue_state: QueueState,
    /// Finished artifacts awaiting delivery
    pub(crate) artifacts: ArtifactStore,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
}

impl MediaDownloader {
    /// Create a new MediaDownloader instance
    ///
    /// Validates the configuration and creates the working directory. Workers
    /// are not running until [`start`](Self::start) is called; requests
    /// admitted before that simply wait in the queue.
    pub async fn new(
        config: Config,
        fetcher: std::sync::Arc<dyn FetchOperation>,
        sink: std::sync::Arc<dyn ResultSink>,
    ) -> Result<Self> {
        Self::build(config, fetcher, sink, None).await
    }

    /// Create a downloader that records completions in the SQLite history database
    ///
    /// The database also backs the history and platform statistics API routes.
    pub async fn with_database(
        config: Config,
        fetcher: std::sync::Arc<dyn FetchOperation>,
        database: std::sync::Arc<Database>,
    ) -> Result<Self> {
        let sink: std::sync::Arc<dyn ResultSink> = database.clone();
        Self::build(config, fetcher, sink, Some(database)).await
    }

    /// Create a fully wired downloader from configuration alone
    ///
    /// Opens the history database at `persistence.database_path` and uses
    /// yt-dlp when it can be found, falling back to the no-op fetcher.
    pub async fn open(config: Config) -> Result<Self> {
        let database = Database::new(&config.persistence.database_path).await?;
        let fetcher = fetcher_from_config(&config.fetch);
        Self::with_database(config, fetcher, std::sync::Arc::new(database)).await
    }

    async fn build(
        config: Config,
        fetcher: std::sync::Arc<dyn FetchOperation>,
        sink: std::sync::Arc<dyn ResultSink>,
        history: Option<std::sync::Arc<Database>>,
    ) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.queue.work_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create work directory '{}': {}",
                        config.queue.work_dir.display(),
                        e
                    ),
                ))
            })?;

        match retention::remove_stale_request_dirs(&config.queue.work_dir).await {
            Ok(0) => {}
            Ok(removed) => {
                tracing::info!(removed, "Removed request directories left by a previous run")
            }
            Err(e) => tracing::warn!(error = %e, "Failed to scan work directory for stale requests"),
        }

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let queue_state = QueueState {
            inner: std::sync::Arc::new(tokio::sync::Mutex::new(QueueInner::new(
                config.queue.recent_capacity,
            ))),
            work_available: std::sync::Arc::new(tokio::sync::Notify::new()),
            tasks: std::sync::Arc::new(tokio::sync::Mutex::new(Vec::new())),
            started: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
            sink_writes: TaskTracker::new(),
        };

        tracing::info!(
            fetcher = fetcher.name(),
            workers = config.queue.max_concurrent,
            capacity = config.queue.capacity,
            work_dir = %config.queue.work_dir.display(),
            "Media downloader initialized"
        );

        Ok(Self {
            limiter: std::sync::Arc::new(RateLimiter::new(config.rate_limit.clone())),
            policy: std::sync::Arc::new(ContentPolicy::new(&config.content)),
            config: std::sync::Arc::new(config),
            fetcher,
            sink,
            history,
            queue_state,
            artifacts: ArtifactStore::default(),
            event_tx,
        })
    }

    /// Subscribe to request events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Events are buffered, but if a subscriber falls behind by more than 1000 events,
    /// it will receive a `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use media_queue::{Config, MediaDownloader};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = MediaDownloader::open(Config::default()).await?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             tracing::info!(?event, "request event");
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> std::sync::Arc<Config> {
        std::sync::Arc::clone(&self.config)
    }

    /// History database, if this downloader records into one
    pub fn history(&self) -> Option<&std::sync::Arc<Database>> {
        self.history.as_ref()
    }

    /// Rate limiter consulted by [`submit`](Self::submit)
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Name of the fetch implementation in use
    pub fn fetcher_name(&self) -> &'static str {
        self.fetcher.name()
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    /// Working directory of a request
    pub(crate) fn request_dir(&self, id: RequestId) -> PathBuf {
        self.config.queue.work_dir.join(id.to_string())
    }

    /// Spawn the REST API server in a background task
    pub fn spawn_api_server(self: &std::sync::Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let downloader = self.clone();
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(downloader, config).await })
    }
}
