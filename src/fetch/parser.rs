//! Parser for yt-dlp output

use crate::error::{FailureKind, FetchError};
use serde::Deserialize;
use std::path::PathBuf;
use std::str;

/// Subset of the info JSON yt-dlp prints with `--dump-json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaMetadata {
    /// Media title
    #[serde(default)]
    pub title: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Final output path, when yt-dlp reports it
    #[serde(default)]
    pub filename: Option<PathBuf>,
    /// Legacy spelling of `filename`
    #[serde(default, rename = "_filename")]
    pub legacy_filename: Option<PathBuf>,
    /// Size reported by the extractor
    #[serde(default)]
    pub filesize: Option<u64>,
}

impl MediaMetadata {
    /// Output path reported by yt-dlp, under either spelling
    pub fn output_path(&self) -> Option<&PathBuf> {
        self.filename.as_ref().or(self.legacy_filename.as_ref())
    }
}

/// Parse the last JSON object on yt-dlp's stdout
///
/// yt-dlp prints one info object per downloaded entry; with `--no-playlist`
/// there is exactly one, but progress noise may precede it.
pub fn parse_metadata(stdout: &[u8]) -> Option<MediaMetadata> {
    let output = str::from_utf8(stdout).unwrap_or_default();
    output
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str(line).ok())
}

const UNSUPPORTED_MARKERS: &[&str] = &["unsupported url", "no suitable extractor"];

const PERMANENT_MARKERS: &[&str] = &[
    "private video",
    "this video is private",
    "video unavailable",
    "has been removed",
    "account has been terminated",
    "copyright",
    "sign in to confirm your age",
    "age-restricted",
    "members-only",
    "not available in your country",
    "requested format is not available",
    "http error 404",
    "http error 410",
    "does not exist",
    "max-filesize",
    "file is larger than max-filesize",
];

/// Classify a failed yt-dlp run from its stderr
///
/// Only the `ERROR:` lines are considered when present. Anything that is not
/// recognisably unsupported or permanent (throttling, 5xx, resets, timeouts,
/// unknown output) is transient and gets the bounded retry budget.
pub fn classify_failure(stderr: &[u8], exit_code: Option<i32>) -> FetchError {
    let error_output = str::from_utf8(stderr).unwrap_or_default();

    let error_lines: Vec<&str> = error_output
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("ERROR:"))
        .collect();
    let message = match error_lines.last() {
        Some(line) => line.trim_start_matches("ERROR:").trim().to_string(),
        None => error_output
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| match exit_code {
                Some(code) => format!("yt-dlp exited with status {}", code),
                None => "yt-dlp terminated by signal".to_string(),
            }),
    };

    let haystack = if error_lines.is_empty() {
        error_output.to_ascii_lowercase()
    } else {
        error_lines.join("\n").to_ascii_lowercase()
    };

    let kind = if UNSUPPORTED_MARKERS.iter().any(|m| haystack.contains(m)) {
        FailureKind::Unsupported
    } else if PERMANENT_MARKERS.iter().any(|m| haystack.contains(m)) {
        FailureKind::Permanent
    } else {
        FailureKind::Transient
    };

    FetchError::new(kind, message)
}
