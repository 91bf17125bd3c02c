//! Configuration types for media-queue

use crate::error::{Error, Result};
use crate::types::Quality;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Queue and worker pool configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Working directory; each request fetches into `<work_dir>/<request id>/` (default: "./downloads")
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Number of worker slots (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Global ceiling on queued + running requests (default: 50)
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Per-user ceiling on queued + running requests (default: 3)
    #[serde(default = "default_max_outstanding_per_user")]
    pub max_outstanding_per_user: usize,

    /// Time budget for a single fetch attempt (default: 300 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub fetch_timeout: Duration,

    /// Retry hint returned with queue-full and per-user-limit rejections (default: 30 seconds)
    #[serde(default = "default_capacity_retry_hint", with = "duration_serde")]
    pub capacity_retry_hint: Duration,

    /// Number of finished requests kept for `status` lookups (default: 256)
    #[serde(default = "default_recent_capacity")]
    pub recent_capacity: usize,

    /// Worker idle poll interval in milliseconds (default: 100)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Quality preset used when a submission does not name one
    #[serde(default)]
    pub default_quality: Quality,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            max_concurrent: default_max_concurrent(),
            capacity: default_capacity(),
            max_outstanding_per_user: default_max_outstanding_per_user(),
            fetch_timeout: default_fetch_timeout(),
            capacity_retry_hint: default_capacity_retry_hint(),
            recent_capacity: default_recent_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
            default_quality: Quality::default(),
        }
    }
}

impl QueueConfig {
    /// Worker idle poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Per-user sliding-window admission limits
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Admissions allowed per user inside one window (default: 3)
    #[serde(default = "default_rate_requests")]
    pub requests: u32,

    /// Window length (default: 60 seconds)
    #[serde(default = "default_rate_window", with = "duration_serde")]
    pub window: Duration,

    /// How often idle per-user windows are swept (default: 300 seconds)
    #[serde(default = "default_rate_sweep_interval", with = "duration_serde")]
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: default_rate_requests(),
            window: default_rate_window(),
            sweep_interval: default_rate_sweep_interval(),
        }
    }
}

/// Retry configuration for transient fetch failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total fetch attempts per request, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Artifact retention configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Time a finished artifact stays on disk awaiting delivery confirmation (default: 300 seconds)
    #[serde(default = "default_retention", with = "duration_serde")]
    pub retention: Duration,

    /// How often the retention sweep runs (default: 30 seconds)
    #[serde(default = "default_retention_sweep_interval", with = "duration_serde")]
    pub sweep_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention: default_retention(),
            sweep_interval: default_retention_sweep_interval(),
        }
    }
}

/// External fetch tool configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Path to the yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Whether to search PATH for yt-dlp if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Largest artifact accepted, in bytes (default: 8 MiB, None = unlimited)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: Option<u64>,

    /// Longest media accepted, in seconds (default: 600, None = unlimited)
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: Option<u64>,

    /// Extra arguments appended to every yt-dlp invocation
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            search_path: true,
            max_file_size: default_max_file_size(),
            max_duration_secs: default_max_duration_secs(),
            extra_args: vec![],
        }
    }
}

/// Content policy applied at admission
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentPolicyConfig {
    /// Domains rejected regardless of platform (subdomains included)
    #[serde(default = "default_blocked_domains")]
    pub blocked_domains: Vec<String>,
}

impl Default for ContentPolicyConfig {
    fn default() -> Self {
        Self {
            blocked_domains: default_blocked_domains(),
        }
    }
}

/// History database configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./media-queue.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Upper bound on history rows returned per query (default: 20)
    #[serde(default = "default_max_history_limit")]
    pub max_history_limit: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            max_history_limit: default_max_history_limit(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for [`MediaDownloader`](crate::MediaDownloader)
///
/// Every sub-config has sensible defaults, so an empty document deserializes
/// into a working configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Queue, worker pool and working directory
    #[serde(default)]
    pub queue: QueueConfig,

    /// Per-user admission rate
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Retry/backoff for transient fetch failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Finished artifact retention
    #[serde(default)]
    pub retention: RetentionConfig,

    /// External fetch tool
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Admission content policy
    #[serde(default)]
    pub content: ContentPolicyConfig,

    /// History database
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// REST API
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Reject configurations the queue cannot run with
    pub fn validate(&self) -> Result<()> {
        fn invalid(key: &str, message: &str) -> Error {
            Error::Config {
                message: message.to_string(),
                key: Some(key.to_string()),
            }
        }

        if self.queue.max_concurrent == 0 {
            return Err(invalid("queue.max_concurrent", "at least one worker is required"));
        }
        if self.queue.capacity == 0 {
            return Err(invalid("queue.capacity", "capacity must be at least 1"));
        }
        if self.queue.max_outstanding_per_user == 0 {
            return Err(invalid(
                "queue.max_outstanding_per_user",
                "per-user limit must be at least 1",
            ));
        }
        if self.queue.fetch_timeout.is_zero() {
            return Err(invalid("queue.fetch_timeout", "fetch timeout must be non-zero"));
        }
        if self.queue.poll_interval_ms == 0 {
            return Err(invalid("queue.poll_interval_ms", "poll interval must be non-zero"));
        }
        if self.rate_limit.requests == 0 {
            return Err(invalid("rate_limit.requests", "at least one request per window"));
        }
        if self.rate_limit.window.is_zero() {
            return Err(invalid("rate_limit.window", "window must be non-zero"));
        }
        if self.rate_limit.sweep_interval.is_zero() {
            return Err(invalid("rate_limit.sweep_interval", "sweep interval must be non-zero"));
        }
        if self.retention.sweep_interval.is_zero() {
            return Err(invalid("retention.sweep_interval", "sweep interval must be non-zero"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "at least one attempt is required"));
        }
        if self.retry.backoff_multiplier.is_nan() || self.retry.backoff_multiplier < 1.0 {
            return Err(invalid(
                "retry.backoff_multiplier",
                "backoff multiplier must be >= 1.0",
            ));
        }
        if self.retry.max_delay < self.retry.initial_delay {
            return Err(invalid(
                "retry.max_delay",
                "max_delay must not be smaller than initial_delay",
            ));
        }
        Ok(())
    }
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_capacity() -> usize {
    50
}

fn default_max_outstanding_per_user() -> usize {
    3
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_capacity_retry_hint() -> Duration {
    Duration::from_secs(30)
}

fn default_recent_capacity() -> usize {
    256
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_rate_requests() -> u32 {
    3
}

fn default_rate_window() -> Duration {
    Duration::from_secs(60)
}

fn default_rate_sweep_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_retention() -> Duration {
    Duration::from_secs(300)
}

fn default_retention_sweep_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_max_file_size() -> Option<u64> {
    Some(8 * 1024 * 1024)
}

fn default_max_duration_secs() -> Option<u64> {
    Some(600)
}

fn default_blocked_domains() -> Vec<String> {
    ["onlyfans.com", "pornhub.com", "xvideos.com"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./media-queue.db")
}

fn default_max_history_limit() -> usize {
    20
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper (seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.queue.max_concurrent, 3);
        assert_eq!(config.queue.capacity, 50);
        assert_eq!(config.rate_limit.requests, 3);
        assert_eq!(config.rate_limit.window, Duration::from_secs(60));
        assert_eq!(config.retention.retention, Duration::from_secs(300));
        assert_eq!(config.fetch.max_file_size, Some(8 * 1024 * 1024));
        assert_eq!(config.queue.default_quality, Quality::MaxHeight(720));
        assert!(
            config
                .content
                .blocked_domains
                .contains(&"pornhub.com".to_string())
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_durations_deserialize_from_seconds() {
        let config: Config = serde_json::from_str(
            r#"{ "rate_limit": { "window": 10 }, "retry": { "initial_delay": 5, "max_delay": 40 } }"#,
        )
        .unwrap();
        assert_eq!(config.rate_limit.window, Duration::from_secs(10));
        assert_eq!(config.retry.initial_delay, Duration::from_secs(5));
        assert_eq!(config.retry.max_delay, Duration::from_secs(40));
        // untouched fields keep defaults
        assert_eq!(config.rate_limit.requests, 3);
    }

    #[test]
    fn test_quality_parses_in_config() {
        let config: Config =
            serde_json::from_str(r#"{ "queue": { "default_quality": "small" } }"#).unwrap();
        assert_eq!(config.queue.default_quality, Quality::Small);

        let bad = serde_json::from_str::<Config>(r#"{ "queue": { "default_quality": "8k" } }"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.queue.max_concurrent = 0;
        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("queue.max_concurrent"))
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_shrinking_backoff() {
        let mut config = Config::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.backoff_multiplier = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.max_delay = Duration::from_secs(1);
        config.retry.initial_delay = Duration::from_secs(5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_round_trip_preserves_durations() {
        let mut config = Config::default();
        config.queue.fetch_timeout = Duration::from_secs(90);
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.queue.fetch_timeout, Duration::from_secs(90));
    }
}
