//! Generic web URL validation shared by the platform classifiers.

use tracing::trace;
use url::Url;

use super::error::{MAX_URL_LENGTH, ParseError};

/// Validates that `raw` is an absolute http(s) URL with a host.
///
/// Input is trimmed first; the returned [`Url`] is the parsed form so callers
/// can inspect host, path segments and query pairs without re-parsing.
///
/// # Errors
///
/// Returns [`ParseError`] when the input is empty, too long, unparseable,
/// uses a non-web scheme, or has no host.
pub(crate) fn validate_url(raw: &str) -> Result<Url, ParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ParseError::empty());
    }

    // Check URL length first (prevents memory issues with very long URLs)
    if raw.len() > MAX_URL_LENGTH {
        return Err(ParseError::too_long(raw));
    }

    let parsed = Url::parse(raw).map_err(|e| ParseError::malformed(raw, &e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(ParseError::unsupported_scheme(raw, scheme)),
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(ParseError::no_host(raw));
    }

    trace!(url = %parsed, "URL passed generic validation");
    Ok(parsed)
}

/// Lowercases a host and strips a trailing dot.
pub(crate) fn canonical_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Returns the non-empty path segments of `url`.
pub(crate) fn path_segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}
