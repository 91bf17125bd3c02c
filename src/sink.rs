//! Result sink
//!
//! Every request that reaches a terminal state produces exactly one
//! [`CompletionRecord`], handed to the configured [`ResultSink`] from a
//! background task. A slow or failing sink never blocks a worker; failures
//! are logged and dropped.

use crate::error::Result;
use crate::types::CompletionRecord;
use async_trait::async_trait;

/// Destination for completion records
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Record one finished request
    ///
    /// Called at most once per request ID.
    async fn record(&self, record: &CompletionRecord) -> Result<()>;
}

/// Sink that only logs completions
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl ResultSink for TracingSink {
    async fn record(&self, record: &CompletionRecord) -> Result<()> {
        tracing::info!(
            request_id = record.id.0,
            user_id = %record.user_id,
            platform = %record.platform,
            state = %record.state(),
            attempts = record.attempts,
            "Request finished"
        );
        Ok(())
    }
}
