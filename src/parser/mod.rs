//! URL classification for supported social-media platforms.
//!
//! Turns a raw, user-supplied URL into a [`ContentReference`]: the platform,
//! the content identifier, what the path declares the content to be, and an
//! optional carousel item selector. Tracking parameters are dropped.
//!
//! # Supported shapes
//!
//! - Instagram: `/reel/{id}`, `/reels/{id}`, `/p/{id}`, `/tv/{id}`,
//!   `/{username}/reel/{id}`, `/{username}/p/{id}` on `instagram.com`,
//!   `www.`/`m.` subdomains and `instagr.am`
//! - YouTube: `/watch?v={id}`, `/shorts/{id}`, `/embed/{id}`, `/live/{id}`
//!   and `youtu.be/{id}`
//!
//! # Example
//!
//! ```
//! use sns_downloader_core::parser::{Platform, classify};
//!
//! let reference = classify("https://www.instagram.com/reel/ABC12345/?igsh=x").unwrap();
//! assert_eq!(reference.platform(), Platform::Instagram);
//! assert_eq!(reference.identifier(), "ABC12345");
//! ```

mod error;
mod instagram;
mod reference;
mod url;
mod youtube;

pub use error::{MAX_URL_LENGTH, ParseError};
pub use reference::{ContentReference, DeclaredKind, Platform, ShapeHint};

use tracing::debug;

/// Classifies a raw URL into a [`ContentReference`].
///
/// Classification either fully succeeds or fails; there is no partial result.
///
/// # Errors
///
/// Returns [`ParseError`] for malformed URLs, unsupported hosts, unknown
/// path shapes and identifiers that fail the platform's format rules.
#[tracing::instrument(skip(raw), fields(input_len = raw.len()))]
pub fn classify(raw: &str) -> Result<ContentReference, ParseError> {
    let parsed = url::validate_url(raw)?;
    let raw = raw.trim();
    let host = url::canonical_host(parsed.host_str().unwrap_or_default());

    if instagram::is_instagram_host(&host) {
        instagram::classify(raw, &parsed)
    } else if youtube::is_youtube_host(&host) {
        youtube::classify(raw, &parsed, &host)
    } else {
        debug!(host = %host, "unsupported platform host");
        Err(ParseError::unsupported_platform(raw, &host))
    }
}

/// Returns true when `raw` classifies successfully.
#[must_use]
pub fn is_supported_url(raw: &str) -> bool {
    classify(raw).is_ok()
}
