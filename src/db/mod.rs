//! Database layer for media-queue
//!
//! SQLite persistence for finished requests. The queue itself is in-memory;
//! this database only receives [`CompletionRecord`](crate::types::CompletionRecord)s
//! through its [`ResultSink`](crate::sink::ResultSink) implementation.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`history`] - Completion records, per-user history, platform statistics
//! - [`preferences`] - Per-user quality and duration defaults

use crate::types::{HistoryEntry, PlatformStats, RequestId, RequestState, UserId, UserPreferences};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};

mod history;
mod migrations;
mod preferences;

/// History record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    /// Unique database ID
    pub id: i64,
    /// Request ID within the run that processed it
    pub request_id: i64,
    /// Requesting user
    pub user_id: String,
    /// Display name
    pub username: Option<String>,
    /// Media URL
    pub url: String,
    /// Platform name
    pub platform: String,
    /// Quality preset
    pub quality: String,
    /// Terminal state name
    pub state: String,
    /// Media title
    pub title: Option<String>,
    /// Artifact size in bytes
    pub file_size: Option<i64>,
    /// Media duration in seconds
    pub duration_secs: Option<f64>,
    /// Failure classification
    pub error_kind: Option<String>,
    /// Failure detail
    pub error_message: Option<String>,
    /// Fetch attempts made
    pub attempts: i64,
    /// Unix timestamp (milliseconds) of admission
    pub submitted_at: i64,
    /// Unix timestamp (milliseconds) of completion
    pub finished_at: i64,
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        HistoryEntry {
            id: row.id,
            request_id: RequestId(row.request_id as u64),
            user_id: UserId(row.user_id),
            username: row.username,
            url: row.url,
            platform: row.platform,
            quality: row.quality,
            state: row.state.parse().unwrap_or(RequestState::Failed),
            title: row.title,
            size_bytes: row.file_size.map(|s| s as u64),
            duration_s: row.duration_secs,
            error_kind: row.error_kind,
            error_message: row.error_message,
            attempts: row.attempts as u32,
            submitted_at: from_millis(row.submitted_at),
            finished_at: from_millis(row.finished_at),
        }
    }
}

/// Platform statistics record from database
#[derive(Debug, Clone, FromRow)]
pub struct PlatformStatsRow {
    /// Platform name
    pub platform: String,
    /// Finished requests
    pub total: i64,
    /// Succeeded requests
    pub succeeded: i64,
    /// Failed requests
    pub failed: i64,
    /// Cancelled requests
    pub cancelled: i64,
    /// Bytes delivered
    pub total_bytes: i64,
    /// Unix timestamp (milliseconds) of the last completion
    pub last_used: i64,
}

impl From<PlatformStatsRow> for PlatformStats {
    fn from(row: PlatformStatsRow) -> Self {
        PlatformStats {
            platform: row.platform,
            total: row.total as u64,
            succeeded: row.succeeded as u64,
            failed: row.failed as u64,
            cancelled: row.cancelled as u64,
            total_bytes: row.total_bytes as u64,
            last_used: from_millis(row.last_used),
        }
    }
}

/// User preferences record from database
#[derive(Debug, Clone, FromRow)]
pub struct PreferencesRow {
    /// User ID
    pub user_id: String,
    /// Quality preset spelling
    pub preferred_quality: Option<String>,
    /// Duration ceiling in seconds
    pub max_duration_secs: Option<i64>,
    /// Unix timestamp (milliseconds) of the last change
    pub updated_at: i64,
}

impl From<PreferencesRow> for UserPreferences {
    fn from(row: PreferencesRow) -> Self {
        UserPreferences {
            user_id: UserId(row.user_id),
            // written from a parsed Quality, so only a hand-edited row fails here
            preferred_quality: row.preferred_quality.and_then(|q| q.parse().ok()),
            max_duration_secs: row.max_duration_secs.map(|d| d.max(0) as u64),
            updated_at: from_millis(row.updated_at),
        }
    }
}

/// Database handle for media-queue
pub struct Database {
    pool: SqlitePool,
}
