//! Media fetching
//!
//! The queue is agnostic to how media is fetched: it drives any
//! [`FetchOperation`] with a per-request directory, a cancellation token and a
//! time budget. Two implementations are provided:
//!
//! - [`YtDlpFetcher`]: runs the external `yt-dlp` binary
//! - [`NoOpFetcher`]: fails every attempt as unsupported when yt-dlp is unavailable
//!
//! ## Usage
//!
//! ```no_run
//! use media_queue::fetch::{FetchOperation, NoOpFetcher, YtDlpFetcher};
//! use std::sync::Arc;
//!
//! let fetcher: Arc<dyn FetchOperation> = match YtDlpFetcher::from_path() {
//!     Some(ytdlp) => Arc::new(ytdlp),
//!     None => Arc::new(NoOpFetcher),
//! };
//! println!("fetching with {}", fetcher.name());
//! ```

mod noop;
mod parser;
mod traits;
mod ytdlp;

use crate::config::FetchConfig;
use std::sync::Arc;

pub use noop::NoOpFetcher;
pub use parser::{MediaMetadata, classify_failure, parse_metadata};
pub use traits::{FetchOperation, FetchRequest};
pub use ytdlp::YtDlpFetcher;

/// Pick the fetcher for a configuration, degrading to [`NoOpFetcher`] without yt-dlp
pub fn fetcher_from_config(config: &FetchConfig) -> Arc<dyn FetchOperation> {
    match YtDlpFetcher::from_config(config) {
        Some(fetcher) => {
            tracing::info!(binary = %fetcher.binary_path().display(), "Using yt-dlp fetcher");
            Arc::new(fetcher)
        }
        None => {
            tracing::warn!("yt-dlp not found; every request will fail as unsupported");
            Arc::new(NoOpFetcher)
        }
    }
}
