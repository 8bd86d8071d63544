//! Extraction backends: interchangeable strategies that fetch media for a
//! [`ContentReference`].
//!
//! Every backend honours the same contract:
//!
//! - files are written into a [`StagingDir`] and committed into
//!   `{download_dir}/{storage_key}/` only on success
//! - files are named by the stable layout: `{key}.{ext}` for single media,
//!   `{key}_{n}.{ext}` (1-based) for carousel items and `{key}_thumb.{ext}`
//!   for the thumbnail
//! - failures are returned as classified [`ExtractError`]s
//!
//! Implementations:
//! - [`YtDlpBackend`] - `yt-dlp` without an account, or with account
//!   credentials / a cookies file
//! - [`GraphApiBackend`] - Instagram Graph API (token owner's own media)

mod error;
mod graph_api;
mod http_client;
mod process;
mod staging;
mod ytdlp;

pub use error::{ExtractError, ToolStage, classify_tool_failure};
pub use graph_api::GraphApiBackend;
pub use process::{ToolOutput, run_tool};
pub use staging::{STAGING_DIR_NAME, StagingDir};
pub use ytdlp::{YtDlpBackend, YtDlpMode};

pub(crate) use error::reports_no_video;
pub(crate) use ytdlp::{common_args, entry_is_video, is_playlist};

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Serialize;

use crate::capability::BackendKind;
use crate::parser::{ContentReference, Platform};

/// The shape of the content as served to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Photo,
    Carousel,
}

impl MediaType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Photo => "photo",
            Self::Carousel => "carousel",
        }
    }
}

/// What a produced file is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    Primary,
    Thumbnail,
    CarouselItem,
}

/// One file produced by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub local_path: PathBuf,
    pub role: FileRole,
}

impl MediaFile {
    pub fn new(local_path: impl Into<PathBuf>, role: FileRole) -> Self {
        Self {
            local_path: local_path.into(),
            role,
        }
    }

    /// File name component, used to build public URLs.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.local_path.file_name().and_then(|n| n.to_str())
    }
}

/// Metadata common to all backends, plus platform-specific extras.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaMetadata {
    pub identifier: String,
    pub platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Total size of committed media files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Unix seconds.
    pub downloaded_at: u64,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MediaMetadata {
    /// Empty metadata for `reference`, stamped with the current time.
    #[must_use]
    pub fn for_reference(reference: &ContentReference) -> Self {
        Self {
            identifier: reference.identifier().to_string(),
            platform: reference.platform(),
            title: None,
            caption: None,
            uploader: None,
            permalink: None,
            duration_seconds: None,
            width: None,
            height: None,
            size_bytes: None,
            downloaded_at: unix_now(),
            extra: serde_json::Map::new(),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Output of one successful backend fetch, already committed to its final directory.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub backend: BackendKind,
    pub media_type: MediaType,
    /// Media files in source order, then the thumbnail if any.
    pub files: Vec<MediaFile>,
    pub metadata: MediaMetadata,
    /// Set when only part of the content was served; holds the warning text.
    pub degraded: Option<String>,
}

impl ExtractionResult {
    /// Removes every file of this result from disk.
    pub async fn discard(&self) {
        for file in &self.files {
            let _ = tokio::fs::remove_file(&file.local_path).await;
        }
    }
}

/// Trait that all extraction backends implement.
///
/// Uses `async_trait` so backends can be held as `Arc<dyn Backend>` and
/// selected at runtime by [`BackendKind`].
#[async_trait]
pub trait Backend: Send + Sync {
    /// Capability this backend provides.
    fn kind(&self) -> BackendKind;

    /// Short name for logs and error messages.
    fn name(&self) -> &str;

    /// Fetches and commits all media for `reference`.
    async fn fetch(&self, reference: &ContentReference) -> Result<ExtractionResult, ExtractError>;
}

/// Stable file name for the `n`th (1-based) media item, or the single item when `n` is `None`.
#[must_use]
pub fn media_file_name(storage_key: &str, n: Option<usize>, ext: &str) -> String {
    match n {
        Some(n) => format!("{storage_key}_{n}.{ext}"),
        None => format!("{storage_key}.{ext}"),
    }
}

/// Stable thumbnail file name.
#[must_use]
pub fn thumbnail_file_name(storage_key: &str, ext: &str) -> String {
    format!("{storage_key}_thumb.{ext}")
}

/// Paths of every non-thumbnail file, in order.
pub(crate) fn media_paths(files: &[MediaFile]) -> Vec<PathBuf> {
    files
        .iter()
        .filter(|f| f.role != FileRole::Thumbnail)
        .map(|f| f.local_path.clone())
        .collect()
}

/// Sums the sizes of `paths` that exist.
pub(crate) async fn total_size(paths: &[PathBuf]) -> u64 {
    let mut total = 0;
    for path in paths {
        if let Ok(meta) = tokio::fs::metadata(path).await {
            total += meta.len();
        }
    }
    total
}
