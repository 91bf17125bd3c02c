//! No-op fetcher for graceful degradation

use super::traits::{FetchOperation, FetchRequest};
use crate::error::FetchError;
use crate::types::Artifact;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Fetcher used when no yt-dlp binary is available
///
/// Every attempt fails as `Unsupported`, so requests finish immediately
/// without retries instead of sitting in the queue.
///
/// # Examples
///
/// ```
/// use media_queue::fetch::{FetchOperation, FetchRequest, NoOpFetcher};
/// use media_queue::{FailureKind, Platform, Quality, RequestId};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() {
/// let request = FetchRequest {
///     id: RequestId(1),
///     url: "https://youtu.be/abc".into(),
///     platform: Platform::Youtube,
///     quality: Quality::default(),
///     max_duration_secs: None,
///     dest_dir: std::env::temp_dir(),
///     attempt: 1,
/// };
/// let err = NoOpFetcher.fetch(&request, CancellationToken::new()).await.unwrap_err();
/// assert_eq!(err.kind, FailureKind::Unsupported);
/// # }
/// ```
pub struct NoOpFetcher;

#[async_trait]
impl FetchOperation for NoOpFetcher {
    async fn fetch(
        &self,
        _request: &FetchRequest,
        _cancel: CancellationToken,
    ) -> Result<Artifact, FetchError> {
        Err(FetchError::unsupported(
            "Fetching requires the external yt-dlp binary. \
             Configure fetch.ytdlp_path or ensure yt-dlp is in PATH.",
        ))
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
