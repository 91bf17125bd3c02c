//! CLI-based fetcher using the external yt-dlp binary

use super::parser::{MediaMetadata, classify_failure, parse_metadata};
use super::traits::{FetchOperation, FetchRequest};
use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::platforms::Platform;
use crate::types::{Artifact, Quality};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Suffixes of yt-dlp's intermediate files, never reported as the artifact
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp", ".json", ".tmp"];

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const BROWSER_HEADERS: &[&str] = &[
    "Accept:text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    "Accept-Language:en-US,en;q=0.5",
];

/// `-f` selector for a platform, `None` for image hosts where yt-dlp picks the file
///
/// An explicit lower height or the `small` preset is honored everywhere.
/// Otherwise TikTok and Instagram are held to 720p, and Facebook also falls
/// back to any MP4 before taking whatever is offered.
fn format_selector(platform: Platform, quality: Quality) -> Option<String> {
    if platform.is_image_only() {
        return None;
    }
    let uncapped = matches!(
        quality,
        Quality::Best | Quality::Worst | Quality::MaxHeight(720)
    );
    let selector = match platform {
        Platform::Facebook if uncapped => "best[height<=720]/best[ext=mp4]/best".to_string(),
        Platform::Tiktok | Platform::Instagram if uncapped => "best[height<=720]/best".to_string(),
        _ => quality.format_selector(),
    };
    Some(selector)
}

/// Whether the platform turns away yt-dlp's default client
fn needs_browser_identity(platform: Platform) -> bool {
    matches!(
        platform,
        Platform::Facebook | Platform::Instagram | Platform::Twitter | Platform::Reddit
    )
}

/// CLI-based fetcher using the external yt-dlp binary
///
/// Each attempt runs one yt-dlp process writing into the request's directory.
/// The process is killed when the cancellation token fires or when the
/// attempt future is dropped.
///
/// # Examples
///
/// ```no_run
/// use media_queue::fetch::YtDlpFetcher;
/// use std::path::PathBuf;
///
/// // Create with explicit path
/// let fetcher = YtDlpFetcher::new(PathBuf::from("/usr/local/bin/yt-dlp"));
///
/// // Or auto-discover from PATH
/// let fetcher = YtDlpFetcher::from_path().expect("yt-dlp not found in PATH");
/// ```
pub struct YtDlpFetcher {
    binary_path: PathBuf,
    max_file_size: Option<u64>,
    max_duration_secs: Option<u64>,
    extra_args: Vec<String>,
}

impl YtDlpFetcher {
    /// Create a new fetcher with an explicit binary path and no size or duration limits
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            max_file_size: None,
            max_duration_secs: None,
            extra_args: Vec::new(),
        }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }

    /// Build a fetcher from configuration
    ///
    /// Uses `ytdlp_path` when set, otherwise searches PATH if allowed.
    /// Returns `None` when no binary is available.
    pub fn from_config(config: &FetchConfig) -> Option<Self> {
        let fetcher = match &config.ytdlp_path {
            Some(path) => Self::new(path.clone()),
            None if config.search_path => Self::from_path()?,
            None => return None,
        };
        Some(
            fetcher
                .with_limits(config.max_file_size, config.max_duration_secs)
                .with_extra_args(config.extra_args.clone()),
        )
    }

    /// Set the artifact size and media duration ceilings
    pub fn with_limits(mut self, max_file_size: Option<u64>, max_duration_secs: Option<u64>) -> Self {
        self.max_file_size = max_file_size;
        self.max_duration_secs = max_duration_secs;
        self
    }

    /// Append extra arguments to every invocation
    pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }

    /// Path of the binary in use
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    fn build_args(&self, request: &FetchRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(selector) = format_selector(request.platform, request.quality) {
            args.push("-f".into());
            args.push(selector.into());
        }
        args.extend::<[OsString; 10]>([
            "-o".into(),
            request.dest_dir.join("%(id)s.%(ext)s").into_os_string(),
            "--no-playlist".into(),
            "--no-warnings".into(),
            "--no-color".into(),
            "--no-progress".into(),
            "--geo-bypass".into(),
            "--restrict-filenames".into(),
            "--dump-json".into(),
            "--no-simulate".into(),
        ]);
        if needs_browser_identity(request.platform) {
            args.push("--user-agent".into());
            args.push(BROWSER_USER_AGENT.into());
            for header in BROWSER_HEADERS {
                args.push("--add-header".into());
                args.push((*header).into());
            }
        }
        if request.platform == Platform::Facebook {
            args.push("--extractor-args".into());
            args.push("facebook:skip=dash,hls".into());
        }
        if let Some(max) = self.max_file_size {
            args.push("--max-filesize".into());
            args.push(max.to_string().into());
        }
        args.extend(self.extra_args.iter().map(OsString::from));
        args.push("--".into());
        args.push(request.url.clone().into());
        args
    }

    /// Tighter of the configured and the requesting user's duration ceiling
    fn duration_limit(&self, request: &FetchRequest) -> Option<u64> {
        match (self.max_duration_secs, request.max_duration_secs) {
            (Some(configured), Some(requested)) => Some(configured.min(requested)),
            (configured, requested) => configured.or(requested),
        }
    }

    /// Turn a successful run into an artifact, enforcing the configured limits
    async fn finish(
        &self,
        request: &FetchRequest,
        metadata: MediaMetadata,
    ) -> Result<Artifact, FetchError> {
        let path = locate_artifact(&request.dest_dir, metadata.output_path())
            .await
            .ok_or_else(|| {
                FetchError::permanent(match self.max_file_size {
                    Some(max) => format!(
                        "yt-dlp produced no media file (it may exceed the {} byte limit)",
                        max
                    ),
                    None => "yt-dlp produced no media file".to_string(),
                })
            })?;

        let size_bytes = tokio::fs::metadata(&path)
            .await
            .map_err(|e| FetchError::internal(format!("Failed to stat {}: {}", path.display(), e)))?
            .len();

        if let Some(max) = self.max_file_size
            && size_bytes > max
        {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(FetchError::permanent(format!(
                "File too large ({} bytes, max {})",
                size_bytes, max
            )));
        }

        if let (Some(max), Some(duration)) = (self.duration_limit(request), metadata.duration)
            && duration > max as f64
        {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(FetchError::permanent(format!(
                "Media too long ({:.0}s, max {}s)",
                duration, max
            )));
        }

        let title = metadata.title.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        Ok(Artifact {
            path,
            title,
            size_bytes,
            duration_s: metadata.duration,
        })
    }
}

#[async_trait]
impl FetchOperation for YtDlpFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        cancel: CancellationToken,
    ) -> Result<Artifact, FetchError> {
        let child = Command::new(&self.binary_path)
            .args(self.build_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FetchError::internal(format!("Failed to execute yt-dlp: {}", e)))?;

        tracing::debug!(
            request_id = request.id.0,
            attempt = request.attempt,
            pid = child.id(),
            "yt-dlp started"
        );

        let output = tokio::select! {
            output = child.wait_with_output() => output
                .map_err(|e| FetchError::internal(format!("Failed to wait for yt-dlp: {}", e)))?,
            // dropping the wait future drops the child, which kills it
            _ = cancel.cancelled() => {
                tracing::debug!(request_id = request.id.0, "yt-dlp killed on cancellation");
                return Err(FetchError::cancelled("fetch cancelled"));
            }
        };

        if !output.status.success() {
            let err = classify_failure(&output.stderr, output.status.code());
            tracing::debug!(
                request_id = request.id.0,
                kind = %err.kind,
                message = %err.message,
                "yt-dlp failed"
            );
            return Err(err);
        }

        let metadata = parse_metadata(&output.stdout).unwrap_or_default();
        self.finish(request, metadata).await
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

fn is_partial(path: &Path) -> bool {
    let name = path.to_string_lossy();
    PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Find the fetched file inside `dest_dir`
///
/// Prefers the path yt-dlp reported when it exists inside the directory,
/// otherwise picks the largest finished file.
async fn locate_artifact(dest_dir: &Path, reported: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = reported
        && path.starts_with(dest_dir)
        && !is_partial(path)
        && tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file())
    {
        return Some(path.clone());
    }

    let mut entries = tokio::fs::read_dir(dest_dir).await.ok()?;
    let mut best: Option<(u64, PathBuf)> = None;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if is_partial(&path) {
            continue;
        }
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        if best.as_ref().is_none_or(|(size, _)| meta.len() > *size) {
            best = Some((meta.len(), path));
        }
    }
    best.map(|(_, path)| path)
}
