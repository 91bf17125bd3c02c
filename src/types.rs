//! Core types for media-queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::oneshot;
use utoipa::ToSchema;

use crate::error::{Error, FailureKind, FetchError, Rejection, Result};
use crate::platforms::Platform;

/// Unique identifier for a request, assigned monotonically at admission
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl RequestId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RequestId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}

/// Opaque identifier of the requesting user
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Borrow the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fetch quality preset
///
/// Accepted spellings: `best`, `worst`, `small`, `720p`/`480p`/`360p`, and
/// `best[height<=N]` for the same heights. Serializes to its canonical spelling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Quality {
    /// Best available format
    Best,
    /// Smallest available format
    Worst,
    /// Prefer 480p, fall back to 720p, then anything
    Small,
    /// Best format no taller than the given height, falling back to best
    MaxHeight(u32),
}

/// Heights accepted by the capped presets
const CAPPED_HEIGHTS: [u32; 3] = [720, 480, 360];

impl Default for Quality {
    fn default() -> Self {
        Quality::MaxHeight(720)
    }
}

impl Quality {
    /// yt-dlp `-f` format selector for this preset
    pub fn format_selector(&self) -> String {
        match self {
            Quality::Best => "best".to_string(),
            Quality::Worst => "worst".to_string(),
            Quality::Small => "best[height<=480]/best[height<=720]/best".to_string(),
            Quality::MaxHeight(h) => format!("best[height<={}]/best", h),
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quality::Best => f.write_str("best"),
            Quality::Worst => f.write_str("worst"),
            Quality::Small => f.write_str("small"),
            Quality::MaxHeight(h) => write!(f, "best[height<={}]", h),
        }
    }
}

impl std::str::FromStr for Quality {
    type Err = Rejection;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim().to_ascii_lowercase();
        let invalid = || Rejection::InvalidQuality {
            quality: s.to_string(),
        };

        let height = match trimmed.as_str() {
            "best" => return Ok(Quality::Best),
            "worst" => return Ok(Quality::Worst),
            "small" => return Ok(Quality::Small),
            other => {
                if let Some(h) = other.strip_suffix('p') {
                    h
                } else if let Some(h) = other
                    .strip_prefix("best[height<=")
                    .and_then(|rest| rest.strip_suffix(']'))
                {
                    h
                } else {
                    return Err(invalid());
                }
            }
        };

        let height: u32 = height.parse().map_err(|_| invalid())?;
        if CAPPED_HEIGHTS.contains(&height) {
            Ok(Quality::MaxHeight(height))
        } else {
            Err(invalid())
        }
    }
}

impl TryFrom<String> for Quality {
    type Error = Rejection;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Quality> for String {
    fn from(q: Quality) -> Self {
        q.to_string()
    }
}

/// Request lifecycle state
///
/// `Queued -> Running -> Succeeded | Failed | Cancelled`. A scheduled retry
/// moves a request from `Running` back to `Queued` with a strictly larger
/// attempt count; terminal states are final.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Waiting for a worker (possibly waiting out a retry backoff)
    Queued,
    /// A worker is fetching it
    Running,
    /// Fetch produced an artifact
    Succeeded,
    /// Fetch failed permanently or exhausted its attempts
    Failed,
    /// Cancelled by the user or by shutdown
    Cancelled,
}

impl RequestState {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Succeeded | RequestState::Failed | RequestState::Cancelled
        )
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestState::Queued => "queued",
            RequestState::Running => "running",
            RequestState::Succeeded => "succeeded",
            RequestState::Failed => "failed",
            RequestState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for RequestState {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "queued" => Ok(RequestState::Queued),
            "running" => Ok(RequestState::Running),
            "succeeded" => Ok(RequestState::Succeeded),
            "failed" => Ok(RequestState::Failed),
            "cancelled" => Ok(RequestState::Cancelled),
            other => Err(Error::Other(format!("unknown request state '{}'", other))),
        }
    }
}

/// Artifact produced by a successful fetch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Artifact {
    /// Location of the fetched file inside the request's working directory
    #[schema(value_type = String)]
    pub path: PathBuf,
    /// Media title reported by the fetcher
    pub title: String,
    /// File size in bytes
    pub size_bytes: u64,
    /// Media duration in seconds, when known
    pub duration_s: Option<f64>,
}

/// Terminal outcome of a request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RequestResult {
    /// Fetch succeeded
    Succeeded {
        /// The produced artifact
        artifact: Artifact,
    },
    /// Fetch failed
    Failed {
        /// Classified failure of the last attempt
        error: FetchError,
    },
    /// Request was cancelled
    Cancelled,
}

impl RequestResult {
    /// The terminal state this outcome corresponds to
    pub fn state(&self) -> RequestState {
        match self {
            RequestResult::Succeeded { .. } => RequestState::Succeeded,
            RequestResult::Failed { .. } => RequestState::Failed,
            RequestResult::Cancelled => RequestState::Cancelled,
        }
    }

    /// The artifact, if the fetch succeeded
    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            RequestResult::Succeeded { artifact } => Some(artifact),
            _ => None,
        }
    }

    /// Failure classification, if the fetch failed
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            RequestResult::Failed { error } => Some(error.kind),
            _ => None,
        }
    }
}

/// A submission before admission
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Submission {
    /// Requesting user
    #[schema(value_type = String)]
    pub user_id: UserId,
    /// Display name stored with history (optional)
    #[serde(default)]
    pub username: Option<String>,
    /// Media URL
    pub url: String,
    /// Quality preset; the configured default applies when absent
    #[serde(default)]
    pub quality: Option<String>,
}

impl Submission {
    /// Create a submission with the default quality
    pub fn new(user_id: impl Into<UserId>, url: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: None,
            url: url.into(),
            quality: None,
        }
    }

    /// Set the quality preset
    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    /// Set the display name recorded in history
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Read-only view of a request, as returned by `status`
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RequestView {
    /// Request ID
    pub id: RequestId,
    /// Requesting user
    #[schema(value_type = String)]
    pub user_id: UserId,
    /// Media URL
    pub url: String,
    /// Platform the URL matched
    pub platform: Platform,
    /// Quality preset
    #[schema(value_type = String)]
    pub quality: Quality,
    /// When the request was admitted
    #[schema(value_type = String, format = DateTime)]
    pub submitted_at: DateTime<Utc>,
    /// Current state
    pub state: RequestState,
    /// Fetch attempts made so far
    pub attempt_count: u32,
    /// 1-based position among queued requests (queued only)
    pub position: Option<usize>,
    /// Terminal outcome (terminal states only)
    pub result: Option<RequestResult>,
}

/// Per-user load counters in a [`QueueSnapshot`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserLoad {
    /// User
    #[schema(value_type = String)]
    pub user_id: UserId,
    /// Requests waiting for a worker
    pub queued: usize,
    /// Requests on a worker
    pub running: usize,
}

/// Point-in-time view of the queue, computed on demand
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct QueueSnapshot {
    /// Requests waiting for a worker (including those in retry backoff)
    pub queued: usize,
    /// Subset of `queued` waiting out a retry backoff
    pub waiting_retry: usize,
    /// Requests on a worker
    pub running: usize,
    /// Succeeded since start
    pub succeeded: u64,
    /// Failed since start
    pub failed: u64,
    /// Cancelled since start
    pub cancelled: u64,
    /// Admission time of the oldest queued request
    #[schema(value_type = Option<String>, format = DateTime)]
    pub oldest_queued_at: Option<DateTime<Utc>>,
    /// Per-user counts for users with outstanding requests
    pub per_user: Vec<UserLoad>,
    /// Worker slots
    pub workers: usize,
    /// Global capacity (queued + running)
    pub capacity: usize,
    /// Whether new submissions are admitted
    pub accepting: bool,
}

impl QueueSnapshot {
    /// Queued plus running requests, the figure compared against capacity
    pub fn outstanding(&self) -> usize {
        self.queued + self.running
    }
}

/// Record handed to the result sink and to the request handle when a request finishes
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CompletionRecord {
    /// Request ID
    pub id: RequestId,
    /// Requesting user
    #[schema(value_type = String)]
    pub user_id: UserId,
    /// Display name, if the submitter provided one
    pub username: Option<String>,
    /// Media URL
    pub url: String,
    /// Platform the URL matched
    pub platform: Platform,
    /// Quality preset
    #[schema(value_type = String)]
    pub quality: Quality,
    /// Fetch attempts made
    pub attempts: u32,
    /// When the request was admitted
    #[schema(value_type = String, format = DateTime)]
    pub submitted_at: DateTime<Utc>,
    /// When the request reached its terminal state
    #[schema(value_type = String, format = DateTime)]
    pub finished_at: DateTime<Utc>,
    /// Terminal outcome
    pub result: RequestResult,
}

impl CompletionRecord {
    /// Terminal state of the request
    pub fn state(&self) -> RequestState {
        self.result.state()
    }
}

/// Handle returned on admission
///
/// Resolves to the request's [`CompletionRecord`] once it reaches a terminal state.
#[derive(Debug)]
pub struct RequestHandle {
    id: RequestId,
    position: usize,
    completion: oneshot::Receiver<CompletionRecord>,
}

impl RequestHandle {
    pub(crate) fn new(
        id: RequestId,
        position: usize,
        completion: oneshot::Receiver<CompletionRecord>,
    ) -> Self {
        Self {
            id,
            position,
            completion,
        }
    }

    /// Assigned request ID
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// 1-based queue position at admission
    pub fn position(&self) -> usize {
        self.position
    }

    /// Wait for the request to finish
    ///
    /// Returns [`Error::Other`] if the request was dropped without ever
    /// reaching a terminal state.
    pub async fn wait(self) -> Result<CompletionRecord> {
        let id = self.id;
        self.completion
            .await
            .map_err(|_| Error::Other(format!("request {id} abandoned")))
    }
}

/// Why an artifact was removed from working storage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRemoval {
    /// Delivery was confirmed
    Delivered,
    /// Retention window elapsed
    Expired,
    /// Queue shut down
    Shutdown,
}

/// Event emitted during the request lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Request admitted
    Queued {
        /// Request ID
        id: RequestId,
        /// Requesting user
        #[schema(value_type = String)]
        user_id: UserId,
        /// 1-based queue position at admission
        position: usize,
    },

    /// A worker started a fetch attempt
    Started {
        /// Request ID
        id: RequestId,
        /// Attempt number (1-based)
        attempt: u32,
    },

    /// A transient failure was re-queued with backoff
    RetryScheduled {
        /// Request ID
        id: RequestId,
        /// Attempt that failed
        attempt: u32,
        /// Backoff before the next attempt, in milliseconds
        delay_ms: u64,
        /// The failure
        error: FetchError,
    },

    /// Request succeeded
    Succeeded {
        /// Request ID
        id: RequestId,
        /// The produced artifact
        artifact: Artifact,
    },

    /// Request failed
    Failed {
        /// Request ID
        id: RequestId,
        /// The failure of the last attempt
        error: FetchError,
        /// Attempts made
        attempts: u32,
    },

    /// Request cancelled
    Cancelled {
        /// Request ID
        id: RequestId,
    },

    /// Artifact deleted from working storage
    ArtifactRemoved {
        /// Request ID
        id: RequestId,
        /// Why it was removed
        reason: ArtifactRemoval,
    },

    /// Queue drained and stopped
    Shutdown,
}

impl Event {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            Event::Queued { .. } => "queued",
            Event::Started { .. } => "started",
            Event::RetryScheduled { .. } => "retry_scheduled",
            Event::Succeeded { .. } => "succeeded",
            Event::Failed { .. } => "failed",
            Event::Cancelled { .. } => "cancelled",
            Event::ArtifactRemoved { .. } => "artifact_removed",
            Event::Shutdown => "shutdown",
        }
    }
}

/// A finished request as stored in the history database
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntry {
    /// Database row ID
    pub id: i64,
    /// Request ID within the run that processed it
    pub request_id: RequestId,
    /// Requesting user
    #[schema(value_type = String)]
    pub user_id: UserId,
    /// Display name, if known
    pub username: Option<String>,
    /// Media URL
    pub url: String,
    /// Platform name
    pub platform: String,
    /// Quality preset
    pub quality: String,
    /// Terminal state
    pub state: RequestState,
    /// Media title (success only)
    pub title: Option<String>,
    /// Artifact size in bytes (success only)
    pub size_bytes: Option<u64>,
    /// Media duration in seconds (success only)
    pub duration_s: Option<f64>,
    /// Failure classification (failure only)
    pub error_kind: Option<String>,
    /// Failure detail (failure only)
    pub error_message: Option<String>,
    /// Fetch attempts made
    pub attempts: u32,
    /// When the request was admitted
    #[schema(value_type = String, format = DateTime)]
    pub submitted_at: DateTime<Utc>,
    /// When the request finished
    #[schema(value_type = String, format = DateTime)]
    pub finished_at: DateTime<Utc>,
}

/// Defaults a user stored for their submissions
///
/// `preferred_quality` applies when a submission names no quality;
/// `max_duration_secs` tightens the fetcher's duration ceiling for every
/// request of the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserPreferences {
    /// User
    #[schema(value_type = String)]
    pub user_id: UserId,
    /// Quality used when a submission names none
    #[schema(value_type = Option<String>)]
    pub preferred_quality: Option<Quality>,
    /// Longest media the user wants, in seconds
    pub max_duration_secs: Option<u64>,
    /// Last change
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: DateTime<Utc>,
}

/// Partial update of [`UserPreferences`]; absent fields keep their stored value
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PreferencesUpdate {
    /// New preferred quality
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub preferred_quality: Option<Quality>,
    /// New duration ceiling in seconds
    #[serde(default)]
    pub max_duration_secs: Option<u64>,
}

/// Per-platform counters accumulated by the history database
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlatformStats {
    /// Platform name
    pub platform: String,
    /// Finished requests
    pub total: u64,
    /// Succeeded requests
    pub succeeded: u64,
    /// Failed requests
    pub failed: u64,
    /// Cancelled requests
    pub cancelled: u64,
    /// Bytes delivered
    pub total_bytes: u64,
    /// Last time a request for this platform finished
    #[schema(value_type = String, format = DateTime)]
    pub last_used: DateTime<Utc>,
}

impl PlatformStats {
    /// Fraction of finished requests that succeeded, 0.0 when none finished
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }
}

/// Outcome of [`drain_and_stop`](crate::MediaDownloader::drain_and_stop)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DrainReport {
    /// Queued requests cancelled without running
    pub cancelled_queued: usize,
    /// Running requests that finished before the deadline
    pub finished_in_time: usize,
    /// Running requests cancelled at the deadline
    pub cancelled_running: usize,
    /// Running requests still blocked in their fetch when the drain returned
    pub still_blocked: usize,
}
