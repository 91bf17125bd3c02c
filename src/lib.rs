//! # media-queue
//!
//! Bounded, fair download queue for chat-bot media fetching.
//!
//! Users submit media URLs; the queue validates them, applies a per-user
//! sliding-window rate limit, admits them up to a global capacity and runs
//! them on a fixed pool of workers. Transient fetch failures are retried with
//! exponential backoff, requests can be cancelled at any point, finished files
//! are kept for a retention window until delivery is confirmed, and the whole
//! queue drains cleanly on shutdown.
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_queue::{Config, MediaDownloader, Submission};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = MediaDownloader::open(Config::default()).await?;
//!     downloader.start().await;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let handle = downloader
//!         .submit(Submission::new("alice", "https://youtu.be/dQw4w9WgXcQ"))
//!         .await?;
//!     println!("queued at position {}", handle.position());
//!
//!     let record = handle.wait().await?;
//!     if let Some(artifact) = record.result.artifact() {
//!         println!("fetched {}", artifact.path.display());
//!         downloader.confirm_delivery(record.id).await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Media fetch implementations
pub mod fetch;
/// Platform allowlist and content policy
pub mod platforms;
/// Per-user sliding-window rate limiting
pub mod rate_limiter;
/// Retry logic with exponential backoff
pub mod retry;
/// Completion record sinks
pub mod sink;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{
    ApiConfig, Config, ContentPolicyConfig, FetchConfig, PersistenceConfig, QueueConfig,
    RateLimitConfig, RetentionConfig, RetryConfig,
};
pub use db::Database;
pub use downloader::MediaDownloader;
pub use error::{
    ApiError, DatabaseError, DownloadError, Error, ErrorDetail, FailureKind, FetchError,
    Rejection, Result, ToHttpStatus,
};
pub use fetch::{FetchOperation, FetchRequest, NoOpFetcher, YtDlpFetcher};
pub use platforms::{ContentPolicy, Platform};
pub use rate_limiter::{RateDecision, RateLimiter};
pub use sink::{ResultSink, TracingSink};
pub use types::{
    Artifact, ArtifactRemoval, CompletionRecord, DrainReport, Event, HistoryEntry,
    PlatformStats, PreferencesUpdate, Quality, QueueSnapshot, RequestHandle, RequestId,
    RequestResult, RequestState, RequestView, Submission, UserId, UserLoad, UserPreferences,
};

/// Helper function to run the queue with graceful signal handling.
///
/// Waits for a termination signal and then calls
/// [`drain_and_stop`](MediaDownloader::drain_and_stop) with the given deadline.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_queue::{Config, MediaDownloader, run_with_shutdown};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = MediaDownloader::open(Config::default()).await?;
///     downloader.start().await;
///
///     // Run with automatic signal handling
///     let report = run_with_shutdown(&downloader, Duration::from_secs(30)).await;
///     println!("{} requests still blocked", report.still_blocked);
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(
    downloader: &MediaDownloader,
    deadline: std::time::Duration,
) -> DrainReport {
    wait_for_signal().await;
    downloader.drain_and_stop(deadline).await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
