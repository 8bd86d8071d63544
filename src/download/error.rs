//! Caller-facing error for the `download(url)` operation.
//!
//! Every failure is reduced to one [`ErrorKind`] with a fixed HTTP status, so
//! a collaborator (HTTP layer, CLI) can render it without knowing which
//! backend produced it.

use serde::Serialize;
use thiserror::Error;

use crate::backend::ExtractError;
use crate::parser::ParseError;
use crate::router::CREDENTIALS_REMEDIATION;

/// Errors returned by [`crate::download::Downloader::download`].
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The input was not a supported content URL.
    #[error(transparent)]
    InvalidUrl(#[from] ParseError),

    /// No configured backend can serve this content.
    #[error("no backend available for {identifier}\n  Suggestion: {remediation}")]
    NoBackendAvailable {
        identifier: String,
        remediation: String,
    },

    /// Analysis or extraction failed.
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Stable, serializable error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidUrl,
    PrivateAccount,
    ContentNotFound,
    RateLimited,
    DownloadFailed,
    BackendStructure,
    NoBackendAvailable,
    Authentication,
    AnalysisUnavailable,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::PrivateAccount => "private_account",
            Self::ContentNotFound => "content_not_found",
            Self::RateLimited => "rate_limited",
            Self::DownloadFailed => "download_failed",
            Self::BackendStructure => "backend_structure",
            Self::NoBackendAvailable => "no_backend_available",
            Self::Authentication => "authentication",
            Self::AnalysisUnavailable => "analysis_unavailable",
        }
    }

    /// HTTP status a web collaborator should answer with.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidUrl => 400,
            Self::PrivateAccount => 403,
            Self::ContentNotFound => 404,
            Self::RateLimited => 429,
            Self::DownloadFailed => 500,
            Self::BackendStructure
            | Self::NoBackendAvailable
            | Self::Authentication
            | Self::AnalysisUnavailable => 503,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn extract_kind(error: &ExtractError) -> ErrorKind {
    match error {
        ExtractError::PrivateAccount { .. } => ErrorKind::PrivateAccount,
        ExtractError::ContentNotFound { .. } => ErrorKind::ContentNotFound,
        ExtractError::RateLimited { .. } => ErrorKind::RateLimited,
        ExtractError::Authentication { .. } => ErrorKind::Authentication,
        ExtractError::BackendStructure { .. } => ErrorKind::BackendStructure,
        ExtractError::AnalysisUnavailable { .. } => ErrorKind::AnalysisUnavailable,
        // Exhausted throttling stays visible as 429
        ExtractError::DownloadFailed { last, .. } => match last.as_ref() {
            ExtractError::RateLimited { .. } => ErrorKind::RateLimited,
            _ => ErrorKind::DownloadFailed,
        },
        ExtractError::Timeout { .. }
        | ExtractError::Network { .. }
        | ExtractError::HttpStatus { .. }
        | ExtractError::Tool { .. }
        | ExtractError::Io { .. } => ErrorKind::DownloadFailed,
    }
}

impl DownloadError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl(_) => ErrorKind::InvalidUrl,
            Self::NoBackendAvailable { .. } => ErrorKind::NoBackendAvailable,
            Self::Extract(error) => extract_kind(error),
        }
    }

    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.kind().http_status()
    }

    /// Actionable hint for the caller, when one exists.
    #[must_use]
    pub fn remediation(&self) -> Option<String> {
        match self {
            Self::InvalidUrl(ParseError::InvalidUrl { suggestion, .. }) => Some(suggestion.clone()),
            Self::InvalidUrl(ParseError::UrlTooLong { .. }) => {
                Some("Paste the share link without extra tracking text".to_string())
            }
            Self::NoBackendAvailable { remediation, .. } => Some(remediation.clone()),
            Self::Extract(error) => extract_remediation(error),
        }
    }
}

fn extract_remediation(error: &ExtractError) -> Option<String> {
    match error {
        ExtractError::Authentication { suggestion, .. } => Some((*suggestion).to_string()),
        ExtractError::AnalysisUnavailable { .. } => Some(CREDENTIALS_REMEDIATION.to_string()),
        ExtractError::RateLimited { retry_after, .. } => Some(match retry_after {
            Some(wait) => format!("Wait {}s before retrying", wait.as_secs()),
            None => "Wait a few minutes before retrying".to_string(),
        }),
        ExtractError::Tool { .. } => Some("Install yt-dlp or set SNS_YTDLP_PATH".to_string()),
        ExtractError::DownloadFailed { last, .. } => extract_remediation(last),
        _ => None,
    }
}
