//! Application state for the API server

use crate::{Config, MediaDownloader};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The queue the routes operate on
    pub downloader: Arc<MediaDownloader>,

    /// Configuration snapshot the router was built with
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(downloader: Arc<MediaDownloader>, config: Arc<Config>) -> Self {
        Self { downloader, config }
    }

    /// Upper bound on history rows per request
    pub fn history_limit(&self, requested: Option<usize>) -> usize {
        let max = self.config.persistence.max_history_limit.max(1);
        requested.unwrap_or(max).clamp(1, max)
    }
}
