//! The classified, immutable description of a piece of remote content.

use std::fmt;

use serde::Serialize;

/// Supported source platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    #[serde(rename = "youtube")]
    YouTube,
}

impl Platform {
    /// Lowercase platform name used in logs, metadata and responses.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Instagram => "instagram",
            Self::YouTube => "youtube",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the URL path claims the content is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclaredKind {
    /// Instagram `/reel/` or `/reels/`
    Reel,
    /// Instagram `/p/` (video, photo or carousel)
    Post,
    /// Instagram `/tv/` (IGTV)
    Tv,
    /// YouTube `/shorts/`
    Shorts,
    /// YouTube watch, embed, live or short link
    Video,
    /// Kind not stated by the URL. [`classify`](super::classify) always
    /// resolves a concrete kind, so this only appears in references built
    /// elsewhere; it is treated like a post and probed.
    Unknown,
}

/// Shape the content is known to have from the URL alone, when it is decidable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeHint {
    /// URL guarantees a single video.
    Video,
    /// Needs a probe to tell video, photo and carousel apart.
    Unknown,
}

/// A platform-qualified content identifier produced by [`classify`](super::classify).
///
/// Fields are private; a `ContentReference` is never modified after
/// classification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentReference {
    platform: Platform,
    identifier: String,
    declared_kind: DeclaredKind,
    item_index: Option<u32>,
}

impl ContentReference {
    pub(crate) fn new(
        platform: Platform,
        identifier: impl Into<String>,
        declared_kind: DeclaredKind,
        item_index: Option<u32>,
    ) -> Self {
        Self {
            platform,
            identifier: identifier.into(),
            declared_kind,
            item_index,
        }
    }

    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Shortcode (Instagram) or video id (YouTube).
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    #[must_use]
    pub fn declared_kind(&self) -> DeclaredKind {
        self.declared_kind
    }

    /// 1-based carousel item requested via `img_index`, if any.
    #[must_use]
    pub fn item_index(&self) -> Option<u32> {
        self.item_index
    }

    /// Rebuilds the tracking-free URL handed to extraction tools.
    #[must_use]
    pub fn canonical_url(&self) -> String {
        match (self.platform, self.declared_kind) {
            (Platform::Instagram, DeclaredKind::Reel) => {
                format!("https://www.instagram.com/reel/{}/", self.identifier)
            }
            (Platform::Instagram, DeclaredKind::Tv) => {
                format!("https://www.instagram.com/tv/{}/", self.identifier)
            }
            (Platform::Instagram, _) => {
                format!("https://www.instagram.com/p/{}/", self.identifier)
            }
            (Platform::YouTube, DeclaredKind::Shorts) => {
                format!("https://www.youtube.com/shorts/{}", self.identifier)
            }
            (Platform::YouTube, _) => {
                format!("https://www.youtube.com/watch?v={}", self.identifier)
            }
        }
    }

    /// Directory and file-name stem used for persisted media.
    ///
    /// Instagram content is keyed by its bare shortcode; YouTube ids are
    /// prefixed so the two namespaces never collide.
    #[must_use]
    pub fn storage_key(&self) -> String {
        match self.platform {
            Platform::Instagram => self.identifier.clone(),
            Platform::YouTube => format!("youtube_{}", self.identifier),
        }
    }

    /// Whether the URL alone decides the content shape.
    #[must_use]
    pub fn shape_hint(&self) -> ShapeHint {
        match (self.platform, self.declared_kind) {
            (Platform::YouTube, _)
            | (Platform::Instagram, DeclaredKind::Reel | DeclaredKind::Tv) => ShapeHint::Video,
            (Platform::Instagram, _) => ShapeHint::Unknown,
        }
    }
}

impl fmt::Display for ContentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.identifier)
    }
}
