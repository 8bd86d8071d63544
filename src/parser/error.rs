//! Error types for URL classification.

use thiserror::Error;

/// Maximum URL length to accept (standard browser limit).
/// URLs longer than this are rejected to prevent memory issues.
pub const MAX_URL_LENGTH: usize = 2000;

/// Errors that can occur while classifying a content URL.
///
/// Every variant maps to the single caller-facing `invalid_url` error kind.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// URL is malformed, uses an unsupported scheme, or does not point at content
    #[error("invalid URL '{url}': {reason}\n  Suggestion: {suggestion}")]
    InvalidUrl {
        /// The URL that failed validation
        url: String,
        /// Why the URL is invalid
        reason: String,
        /// How to fix the issue
        suggestion: String,
    },

    /// URL exceeds maximum allowed length
    #[error(
        "URL too long ({length} chars, max {max}): {url_preview}...\n  Suggestion: Paste the share link without extra tracking text"
    )]
    UrlTooLong {
        /// Truncated URL for display
        url_preview: String,
        /// Actual length
        length: usize,
        /// Maximum allowed
        max: usize,
    },
}

impl ParseError {
    /// Creates an `InvalidUrl` error for empty input.
    #[must_use]
    pub fn empty() -> Self {
        Self::InvalidUrl {
            url: String::new(),
            reason: "URL is empty".to_string(),
            suggestion: "Provide an Instagram or YouTube content URL".to_string(),
        }
    }

    /// Creates an `InvalidUrl` error for a non-web URL scheme.
    #[must_use]
    pub fn unsupported_scheme(url: &str, scheme: &str) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: format!("scheme '{scheme}' is not supported"),
            suggestion: "Use http:// or https:// URLs".to_string(),
        }
    }

    /// Creates an `InvalidUrl` error for a malformed URL.
    #[must_use]
    pub fn malformed(url: &str, parse_error: &str) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: parse_error.to_string(),
            suggestion: "Check the URL format and try again".to_string(),
        }
    }

    /// Creates an `InvalidUrl` error for a URL without a host.
    #[must_use]
    pub fn no_host(url: &str) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: "URL has no host".to_string(),
            suggestion: "Ensure the URL includes a domain (e.g., instagram.com)".to_string(),
        }
    }

    /// Creates an `InvalidUrl` error for a host that belongs to no supported platform.
    #[must_use]
    pub fn unsupported_platform(url: &str, host: &str) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: format!("host '{host}' is not a supported platform"),
            suggestion: "Use an instagram.com, instagr.am, youtube.com or youtu.be link"
                .to_string(),
        }
    }

    /// Creates an `InvalidUrl` error for a supported host whose path is not a content page.
    #[must_use]
    pub fn unrecognized_path(url: &str, platform: &str, examples: &str) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: format!("path does not point at {platform} content"),
            suggestion: format!("Use a content link such as {examples}"),
        }
    }

    /// Creates an `InvalidUrl` error for an identifier that fails the platform's format rules.
    #[must_use]
    pub fn invalid_identifier(url: &str, identifier: &str, rule: &str) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: format!("identifier '{identifier}' is not valid ({rule})"),
            suggestion: "Copy the share link again; the identifier looks truncated or altered"
                .to_string(),
        }
    }

    /// Creates a `UrlTooLong` error for URLs exceeding the maximum length.
    #[must_use]
    pub fn too_long(url: &str) -> Self {
        Self::UrlTooLong {
            url_preview: url.chars().take(50).collect(),
            length: url.len(),
            max: MAX_URL_LENGTH,
        }
    }
}
