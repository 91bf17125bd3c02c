//! Error types for media-queue
//!
//! This module provides the error taxonomy for the library:
//! - Admission rejections ([`Rejection`]): validation vs capacity, with retry hints
//! - Classified fetch failures ([`FetchError`] / [`FailureKind`])
//! - Queue operation errors ([`DownloadError`]) and persistence errors ([`DatabaseError`])
//! - HTTP status code mapping for API integration via [`ToHttpStatus`]

use crate::types::{RequestId, RequestState};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for media-queue operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-queue
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "queue.max_concurrent")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Queue operation on a specific request failed
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Request was not admitted to the queue
    #[error("request rejected: {0}")]
    Rejected(#[from] Rejection),

    /// Fetch operation failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Operation not supported (missing binary, not implemented, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Errors returned by operations on an existing request
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Request is neither in the queue nor in the recent-terminal window
    #[error("request {id} not found")]
    NotFound {
        /// The request ID that was not found
        id: RequestId,
    },

    /// Request already reached a terminal state
    #[error("request {id} is already {state}")]
    AlreadyTerminal {
        /// The request ID
        id: RequestId,
        /// The terminal state it finished in
        state: RequestState,
    },

    /// No finished artifact is held for this request
    #[error("no artifact held for request {id}")]
    NoArtifact {
        /// The request ID
        id: RequestId,
    },
}

/// Reason a submission was not admitted
///
/// Rejections fall into two groups that calling surfaces present differently:
/// validation problems ("this link isn't supported") and capacity problems
/// ("try again later"). Capacity rejections carry a retry hint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    /// URL could not be parsed or uses a non-HTTP scheme
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The submitted URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// URL host is not on the platform allowlist
    #[error("unsupported platform for URL '{url}'")]
    UnsupportedPlatform {
        /// The submitted URL
        url: String,
    },

    /// URL host is blocked by content policy
    #[error("domain '{domain}' is blocked by content policy")]
    BlockedDomain {
        /// The matching blocked domain
        domain: String,
    },

    /// Quality preset string was not recognized
    #[error("unknown quality preset '{quality}'")]
    InvalidQuality {
        /// The submitted quality string
        quality: String,
    },

    /// Global queue capacity reached
    #[error("queue is full ({capacity} requests outstanding)")]
    QueueFull {
        /// Configured global capacity
        capacity: usize,
        /// Suggested wait before resubmitting
        retry_after: Duration,
    },

    /// User already has too many queued or running requests
    #[error("user {user_id} already has {limit} outstanding requests")]
    UserLimit {
        /// The requesting user
        user_id: String,
        /// Configured per-user ceiling
        limit: usize,
        /// Suggested wait before resubmitting
        retry_after: Duration,
    },

    /// User exceeded the sliding-window admission rate
    #[error("rate limited, retry in {}s", ceil_secs(.retry_after))]
    RateLimited {
        /// Time until the oldest admission leaves the window
        retry_after: Duration,
    },

    /// Queue is draining for shutdown
    #[error("queue is shutting down")]
    ShuttingDown,
}

impl Rejection {
    /// Whether the submission itself is unacceptable (never worth resubmitting unchanged)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Rejection::InvalidUrl { .. }
                | Rejection::UnsupportedPlatform { .. }
                | Rejection::BlockedDomain { .. }
                | Rejection::InvalidQuality { .. }
        )
    }

    /// Whether the submission was refused because of load or limits
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            Rejection::QueueFull { .. } | Rejection::UserLimit { .. } | Rejection::RateLimited { .. }
        )
    }

    /// Suggested delay before resubmitting, for capacity rejections
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Rejection::QueueFull { retry_after, .. }
            | Rejection::UserLimit { retry_after, .. }
            | Rejection::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// [`retry_after`](Self::retry_after) in whole seconds, rounded up and at least 1
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after().map(|d| ceil_secs(&d))
    }
}

/// Whole seconds a client has to wait so that `d` has fully elapsed
fn ceil_secs(d: &Duration) -> u64 {
    (d.as_secs() + u64::from(d.subsec_nanos() > 0)).max(1)
}

/// Classification of a failed fetch attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network or platform hiccup; retried per policy
    Transient,
    /// Content removed, private, too large, or policy violation; never retried
    Permanent,
    /// Fetch exceeded its time budget; retried until the attempt ceiling
    Timeout,
    /// The fetcher cannot handle this URL
    Unsupported,
    /// Fetch was aborted through its cancellation token
    Cancelled,
    /// Unexpected failure inside the queue (panic, working-dir I/O)
    Internal,
}

impl FailureKind {
    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transient => "transient",
            FailureKind::Permanent => "permanent",
            FailureKind::Timeout => "timeout",
            FailureKind::Unsupported => "unsupported",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified fetch failure
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[error("{kind}: {message}")]
pub struct FetchError {
    /// Failure classification driving the retry decision
    pub kind: FailureKind,
    /// Human-readable detail
    pub message: String,
}

impl FetchError {
    /// Create a fetch error of the given kind
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Retryable network/platform failure
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, message)
    }

    /// Non-retryable failure
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Permanent, message)
    }

    /// Time budget exceeded
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    /// URL not handled by this fetcher
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unsupported, message)
    }

    /// Aborted via cancellation token
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Cancelled, message)
    }

    /// Unexpected internal failure
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Internal, message)
    }
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "rate_limited",
///     "message": "request rejected: rate limited, retry in 42s",
///     "details": { "retry_after_secs": 42 }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "queue_full")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Rejection {
    fn status_code(&self) -> u16 {
        match self {
            Rejection::InvalidUrl { .. } | Rejection::InvalidQuality { .. } => 400,
            Rejection::BlockedDomain { .. } => 403,
            Rejection::UnsupportedPlatform { .. } => 422,
            Rejection::UserLimit { .. } | Rejection::RateLimited { .. } => 429,
            Rejection::QueueFull { .. } | Rejection::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Rejection::InvalidUrl { .. } => "invalid_url",
            Rejection::UnsupportedPlatform { .. } => "unsupported_platform",
            Rejection::BlockedDomain { .. } => "blocked_domain",
            Rejection::InvalidQuality { .. } => "invalid_quality",
            Rejection::QueueFull { .. } => "queue_full",
            Rejection::UserLimit { .. } => "user_limit",
            Rejection::RateLimited { .. } => "rate_limited",
            Rejection::ShuttingDown => "shutting_down",
        }
    }
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Error::Config { .. } => 400,

            // Admission decisions carry their own mapping
            Error::Rejected(r) => r.status_code(),

            // 404 Not Found
            Error::NotFound(_) => 404,
            Error::Download(DownloadError::NotFound { .. }) => 404,
            Error::Download(DownloadError::NoArtifact { .. }) => 404,

            // 409 Conflict
            Error::Download(DownloadError::AlreadyTerminal { .. }) => 409,

            // 502 Bad Gateway - the external fetch tool failed
            Error::Fetch(_) => 502,

            // 500 Internal Server Error
            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // 501 Not Implemented
            Error::NotSupported(_) => 501,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) => "database_error",
            Error::Sqlx(_) => "database_error",
            Error::Download(e) => match e {
                DownloadError::NotFound { .. } => "request_not_found",
                DownloadError::AlreadyTerminal { .. } => "already_terminal",
                DownloadError::NoArtifact { .. } => "no_artifact",
            },
            Error::Rejected(r) => r.error_code(),
            Error::Fetch(_) => "fetch_failed",
            Error::Io(_) => "io_error",
            Error::NotFound(_) => "not_found",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::NotSupported(_) => "not_supported",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Download(DownloadError::NotFound { id })
            | Error::Download(DownloadError::NoArtifact { id }) => Some(serde_json::json!({
                "request_id": id,
            })),
            Error::Download(DownloadError::AlreadyTerminal { id, state }) => {
                Some(serde_json::json!({
                    "request_id": id,
                    "state": state,
                }))
            }
            Error::Rejected(r) => r
                .retry_after_secs()
                .map(|secs| serde_json::json!({ "retry_after_secs": secs })),
            Error::Fetch(e) => Some(serde_json::json!({
                "kind": e.kind,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            _ => None,
        };

        match details {
            Some(d) => ApiError::with_details(code, message, d),
            None => ApiError::new(code, message),
        }
    }
}
