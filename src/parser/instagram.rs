//! Instagram content URL classification.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use url::Url;

use super::error::ParseError;
use super::reference::{ContentReference, DeclaredKind, Platform};
use super::url::path_segments;

const HOSTS: [&str; 4] = [
    "instagram.com",
    "www.instagram.com",
    "m.instagram.com",
    "instagr.am",
];

const PATH_EXAMPLES: &str = "https://www.instagram.com/reel/{shortcode}/ or /p/{shortcode}/";

const SHORTCODE_RULE: &str = "8-15 characters of letters, digits, '_' or '-'";

#[allow(clippy::expect_used)]
static SHORTCODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{8,15}$").expect("shortcode regex is valid") // Static pattern, safe to panic
});

pub(super) fn is_instagram_host(host: &str) -> bool {
    HOSTS.contains(&host)
}

/// Maps a path keyword to the kind it declares.
fn kind_for(keyword: &str) -> Option<DeclaredKind> {
    match keyword {
        "reel" | "reels" => Some(DeclaredKind::Reel),
        "p" => Some(DeclaredKind::Post),
        "tv" => Some(DeclaredKind::Tv),
        _ => None,
    }
}

/// Classifies an already validated Instagram URL.
pub(super) fn classify(raw: &str, url: &Url) -> Result<ContentReference, ParseError> {
    let segments = path_segments(url);

    // `/{kind}/{id}` first, then `/{username}/{reel|p}/{id}`
    let (kind, shortcode) = match segments.as_slice() {
        [keyword, id, ..] if kind_for(keyword).is_some() => (kind_for(keyword), *id),
        [_user, keyword @ ("reel" | "p"), id, ..] => (kind_for(keyword), *id),
        _ => (None, ""),
    };
    let Some(kind) = kind else {
        return Err(ParseError::unrecognized_path(raw, "Instagram", PATH_EXAMPLES));
    };

    if !SHORTCODE_PATTERN.is_match(shortcode) {
        return Err(ParseError::invalid_identifier(raw, shortcode, SHORTCODE_RULE));
    }

    let item_index = item_index(url);
    debug!(shortcode, ?kind, ?item_index, "classified Instagram URL");
    Ok(ContentReference::new(
        Platform::Instagram,
        shortcode,
        kind,
        item_index,
    ))
}

/// Reads the 1-based `img_index` carousel selector; malformed values are ignored.
fn item_index(url: &Url) -> Option<u32> {
    url.query_pairs()
        .find(|(key, _)| key == "img_index")
        .and_then(|(_, value)| value.parse::<u32>().ok())
        .filter(|index| *index >= 1)
}
