//! Error types shared by the content analyzer and extraction backends.
//!
//! Errors are classified where they happen: next to the subprocess call
//! ([`classify_tool_failure`]) or the HTTP response ([`ExtractError::from_status`]).
//! Callers further up only propagate them.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while analyzing or fetching content.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Content belongs to a private account.
    #[error("content {identifier} is private\n  Suggestion: only public content can be downloaded")]
    PrivateAccount { identifier: String },

    /// Content does not exist or was removed.
    #[error("content {identifier} was not found: {detail}")]
    ContentNotFound { identifier: String, detail: String },

    /// The platform throttled the request.
    #[error("{backend} was rate limited{}", retry_after_suffix(.retry_after.as_ref()))]
    RateLimited {
        backend: String,
        /// Server-provided wait, if any.
        retry_after: Option<Duration>,
    },

    /// Credentials were rejected or the content requires a login.
    #[error("{backend} authentication failed: {detail}\n  Suggestion: {suggestion}")]
    Authentication {
        backend: String,
        detail: String,
        suggestion: &'static str,
    },

    /// The platform or tool returned something this crate cannot interpret.
    #[error("{backend} returned an unexpected structure: {detail}")]
    BackendStructure { backend: String, detail: String },

    /// The content shape could not be determined without logging in.
    #[error("could not analyze {identifier}: {detail}")]
    AnalysisUnavailable { identifier: String, detail: String },

    /// One call exceeded the per-call timeout.
    #[error("{backend} timed out after {}s", .after.as_secs())]
    Timeout { backend: String, after: Duration },

    /// Connection-level failure (DNS, reset, refused, TLS).
    #[error("network error in {backend}: {detail}")]
    Network { backend: String, detail: String },

    /// Unexpected HTTP status from an API or media CDN.
    #[error("HTTP {status} from {backend}")]
    HttpStatus { backend: String, status: u16 },

    /// The external tool is missing or could not be started.
    #[error("failed to run {tool}: {detail}\n  Suggestion: install yt-dlp or set SNS_YTDLP_PATH")]
    Tool { tool: String, detail: String },

    /// Local file system failure.
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every retry attempt failed; wraps the last error.
    #[error("download failed after {attempts} attempt(s): {last}")]
    DownloadFailed {
        attempts: u32,
        #[source]
        last: Box<ExtractError>,
    },
}

fn retry_after_suffix(retry_after: Option<&Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {}s)", d.as_secs()))
        .unwrap_or_default()
}

/// Where a tool failure happened; decides how login prompts are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStage {
    /// Metadata probe before routing.
    Probe,
    /// Media download.
    Fetch,
}

impl ExtractError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn structure(backend: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::BackendStructure {
            backend: backend.into(),
            detail: detail.into(),
        }
    }

    pub fn network(backend: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Network {
            backend: backend.into(),
            detail: detail.into(),
        }
    }

    pub fn timeout(backend: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            backend: backend.into(),
            after,
        }
    }

    pub fn not_found(identifier: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ContentNotFound {
            identifier: identifier.into(),
            detail: detail.into(),
        }
    }

    /// Maps a reqwest transport error.
    pub fn from_reqwest(backend: &str, error: &reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::timeout(backend, timeout)
        } else {
            Self::network(backend, error.to_string())
        }
    }

    /// Maps a non-success HTTP status from a platform API.
    ///
    /// `retry_after` is the parsed `Retry-After` header, used for 429 only.
    pub fn from_status(
        backend: &str,
        identifier: &str,
        status: u16,
        retry_after: Option<Duration>,
    ) -> Self {
        match status {
            401 | 403 => Self::Authentication {
                backend: backend.to_string(),
                detail: format!("HTTP {status}"),
                suggestion: "Check INSTAGRAM_GRAPH_API_TOKEN; it may be expired or lack permissions",
            },
            404 | 410 => Self::not_found(identifier, format!("HTTP {status}")),
            429 => Self::RateLimited {
                backend: backend.to_string(),
                retry_after,
            },
            _ => Self::HttpStatus {
                backend: backend.to_string(),
                status,
            },
        }
    }

    /// Maps a non-success HTTP status from a media CDN.
    ///
    /// Signed media URLs answer 401/403 once expired, which says nothing about
    /// the API token, so those stay plain [`ExtractError::HttpStatus`] errors.
    pub fn from_media_status(backend: &str, identifier: &str, status: u16) -> Self {
        match status {
            404 | 410 => Self::not_found(identifier, format!("media URL returned HTTP {status}")),
            429 => Self::RateLimited {
                backend: backend.to_string(),
                retry_after: None,
            },
            _ => Self::HttpStatus {
                backend: backend.to_string(),
                status,
            },
        }
    }
}

/// Classifies a failed extraction tool run from its stderr text.
///
/// Matching is case-insensitive and ordered: login prompts first (yt-dlp
/// folds "rate-limit reached" into its login message), then throttling,
/// privacy, absence and finally structural breakage. Anything left
/// is reported as a transient network failure.
#[must_use]
pub fn classify_tool_failure(
    backend: &str,
    identifier: &str,
    stage: ToolStage,
    stderr: &str,
) -> ExtractError {
    let lower = stderr.to_lowercase();
    let detail = last_error_line(stderr);
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["login required", "log in", "login to", "requested content is not available"]) {
        return match stage {
            ToolStage::Probe => ExtractError::AnalysisUnavailable {
                identifier: identifier.to_string(),
                detail,
            },
            ToolStage::Fetch => ExtractError::Authentication {
                backend: backend.to_string(),
                detail,
                suggestion: "Set INSTAGRAM_USERNAME/INSTAGRAM_PASSWORD or INSTAGRAM_COOKIES_FILE, or refresh the cookies file",
            },
        };
    }
    if has(&["429", "too many requests", "rate limit", "rate-limit"]) {
        return ExtractError::RateLimited {
            backend: backend.to_string(),
            retry_after: None,
        };
    }
    if has(&["private"]) {
        return ExtractError::PrivateAccount {
            identifier: identifier.to_string(),
        };
    }
    if reports_no_video(&lower) {
        return match stage {
            ToolStage::Probe => ExtractError::AnalysisUnavailable {
                identifier: identifier.to_string(),
                detail,
            },
            ToolStage::Fetch => ExtractError::structure(backend, detail),
        };
    }
    if has(&["404", "not found", "does not exist", "removed", "deleted"]) {
        return ExtractError::not_found(identifier, detail);
    }
    if has(&["unable to extract", "unsupported url"]) {
        return ExtractError::structure(backend, detail);
    }
    if has(&["timed out", "timeout"]) {
        return ExtractError::Network {
            backend: backend.to_string(),
            detail: format!("tool reported timeout: {detail}"),
        };
    }
    ExtractError::network(backend, detail)
}

/// True when yt-dlp refused an image-only post for lacking a video.
pub(crate) fn reports_no_video(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    ["no video in this post", "no video formats"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// The most useful line of tool output: the last `ERROR:` line, else the last non-empty line.
fn last_error_line(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map_or_else(|| "no error output".to_string(), |l| (*l).to_string())
}
