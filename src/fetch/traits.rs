//! Traits and types for the fetch operation

use crate::error::FetchError;
use crate::platforms::Platform;
use crate::types::{Artifact, Quality, RequestId};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Everything a fetcher needs for one attempt
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Request being fetched
    pub id: RequestId,
    /// Media URL (already validated)
    pub url: String,
    /// Platform the URL matched
    pub platform: Platform,
    /// Quality preset
    pub quality: Quality,
    /// Duration ceiling in seconds the requesting user asked for, on top of
    /// any ceiling the fetcher enforces itself
    pub max_duration_secs: Option<u64>,
    /// Directory owned by this request; the artifact must be written inside it
    pub dest_dir: PathBuf,
    /// Attempt number (1-based)
    pub attempt: u32,
}

/// Trait for fetching media
///
/// The queue calls [`fetch`](FetchOperation::fetch) from a worker with a fresh
/// per-request directory and a cancellation token. Implementations should stop
/// promptly once the token fires and return a [`FailureKind::Cancelled`] error;
/// the queue enforces its own time budget around the call and classifies the
/// overrun as a timeout.
///
/// Errors must be classified: `Transient` and `Timeout` failures are retried,
/// everything else is terminal.
///
/// [`FailureKind::Cancelled`]: crate::error::FailureKind::Cancelled
///
/// # Examples
///
/// ```
/// use media_queue::fetch::{FetchOperation, FetchRequest};
/// use media_queue::{Artifact, FetchError};
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
///
/// struct AlwaysGone;
///
/// #[async_trait]
/// impl FetchOperation for AlwaysGone {
///     async fn fetch(
///         &self,
///         _request: &FetchRequest,
///         _cancel: CancellationToken,
///     ) -> Result<Artifact, FetchError> {
///         Err(FetchError::permanent("Video unavailable"))
///     }
///
///     fn name(&self) -> &'static str {
///         "always-gone"
///     }
/// }
/// ```
#[async_trait]
pub trait FetchOperation: Send + Sync {
    /// Fetch the media at `request.url` into `request.dest_dir`
    ///
    /// # Errors
    ///
    /// Returns a classified [`FetchError`] when the attempt fails.
    async fn fetch(
        &self,
        request: &FetchRequest,
        cancel: CancellationToken,
    ) -> Result<Artifact, FetchError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
