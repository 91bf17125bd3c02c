//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`downloads`] - Submitting, inspecting, cancelling and confirming requests
//! - [`queue`] - Queue-wide statistics
//! - [`history`] - Per-user history and platform statistics
//! - [`system`] - Health, events, OpenAPI

use crate::types::RequestId;
use serde::{Deserialize, Serialize};

mod downloads;
mod history;
mod queue;
mod system;

// Re-export all handlers so `routes::function_name` continues to work
pub use downloads::*;
pub use history::*;
pub use queue::*;
pub use system::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Response body for POST /downloads
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SubmitResponse {
    /// Assigned request ID
    pub id: RequestId,
    /// 1-based queue position at admission
    pub position: usize,
}

/// Query parameters for GET /history/:user_id
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Maximum number of entries to return (capped by `persistence.max_history_limit`)
    pub limit: Option<usize>,
}

/// Response body for GET /history/:user_id
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct HistoryResponse {
    /// Most recent entries first
    pub items: Vec<crate::types::HistoryEntry>,
    /// Total entries stored for the user
    pub total: i64,
}

/// Response body for DELETE /users/:user_id/downloads
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct CancelUserResponse {
    /// Queued or running requests that were cancelled
    pub cancelled: usize,
}
