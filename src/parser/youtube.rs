//! YouTube video URL classification.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use url::Url;

use super::error::ParseError;
use super::reference::{ContentReference, DeclaredKind, Platform};
use super::url::path_segments;

const HOSTS: [&str; 5] = [
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

const PATH_EXAMPLES: &str = "https://www.youtube.com/watch?v={id} or https://youtu.be/{id}";

const VIDEO_ID_RULE: &str = "exactly 11 characters of letters, digits, '_' or '-'";

#[allow(clippy::expect_used)]
static VIDEO_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("video id regex is valid") // Static pattern, safe to panic
});

pub(super) fn is_youtube_host(host: &str) -> bool {
    HOSTS.contains(&host)
}

/// Classifies an already validated YouTube URL.
pub(super) fn classify(raw: &str, url: &Url, host: &str) -> Result<ContentReference, ParseError> {
    let segments = path_segments(url);

    let found = if host == "youtu.be" {
        segments
            .first()
            .map(|id| ((*id).to_string(), DeclaredKind::Video))
    } else {
        match segments.as_slice() {
            ["watch", ..] => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, v)| (v.into_owned(), DeclaredKind::Video)),
            ["shorts", id, ..] => Some(((*id).to_string(), DeclaredKind::Shorts)),
            ["embed" | "live", id, ..] => Some(((*id).to_string(), DeclaredKind::Video)),
            _ => None,
        }
    };

    let Some((video_id, kind)) = found else {
        return Err(ParseError::unrecognized_path(raw, "YouTube", PATH_EXAMPLES));
    };

    if !VIDEO_ID_PATTERN.is_match(&video_id) {
        return Err(ParseError::invalid_identifier(raw, &video_id, VIDEO_ID_RULE));
    }

    debug!(video_id = %video_id, ?kind, "classified YouTube URL");
    Ok(ContentReference::new(Platform::YouTube, video_id, kind, None))
}
