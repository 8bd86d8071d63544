//! Content analysis: decides what a reference points at before routing.
//!
//! Most YouTube and Instagram reel URLs say what they are. Everything else
//! (Instagram `/p/` posts) is probed with a metadata-only `yt-dlp` run.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::backend::{
    ExtractError, MediaType, ToolStage, classify_tool_failure, common_args, entry_is_video,
    is_playlist, reports_no_video, run_tool,
};
use crate::config::Settings;
use crate::parser::{ContentReference, ShapeHint};

const PROBE_NAME: &str = "yt-dlp-probe";

/// What the content is, as far as routing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContentShape {
    pub media_type: MediaType,
    /// Number of media items; at least 1.
    pub item_count: u32,
    /// Whether the unauthenticated backend is expected to fail.
    pub requires_login: bool,
}

impl ContentShape {
    /// A single public video.
    #[must_use]
    pub fn video() -> Self {
        Self {
            media_type: MediaType::Video,
            item_count: 1,
            requires_login: false,
        }
    }

    /// A single photo; served only with a login.
    #[must_use]
    pub fn photo() -> Self {
        Self {
            media_type: MediaType::Photo,
            item_count: 1,
            requires_login: true,
        }
    }

    /// A carousel of `item_count` media items.
    #[must_use]
    pub fn carousel(item_count: u32) -> Self {
        Self {
            media_type: MediaType::Carousel,
            item_count: item_count.max(1),
            requires_login: true,
        }
    }
}

/// Determines the [`ContentShape`] of a reference.
#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    /// # Errors
    ///
    /// `ContentNotFound`, `PrivateAccount`, `AnalysisUnavailable`, or a
    /// transient kind (network, timeout, rate limit) the caller may retry.
    async fn analyze(&self, reference: &ContentReference) -> Result<ContentShape, ExtractError>;
}

/// Analyzer backed by `yt-dlp -J --skip-download`.
#[derive(Debug, Clone)]
pub struct YtDlpAnalyzer {
    program: PathBuf,
    user_agent: String,
    timeout: Duration,
}

impl YtDlpAnalyzer {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            program: settings.ytdlp_path.clone(),
            user_agent: settings.user_agent.clone(),
            timeout: settings.request_timeout,
        }
    }

    fn probe_args(&self, reference: &ContentReference) -> Vec<OsString> {
        let mut args = common_args(&self.user_agent, self.timeout);
        // Image-only posts have no formats; keep the JSON instead of failing
        args.extend(["-J", "--skip-download", "--ignore-no-formats-error", "--"].map(OsString::from));
        args.push(reference.canonical_url().into());
        args
    }
}

#[async_trait]
impl ContentAnalyzer for YtDlpAnalyzer {
    #[instrument(skip(self, reference), fields(identifier = reference.identifier()))]
    async fn analyze(&self, reference: &ContentReference) -> Result<ContentShape, ExtractError> {
        if reference.shape_hint() == ShapeHint::Video {
            debug!("shape decided by URL");
            return Ok(ContentShape::video());
        }

        let output = run_tool(
            &self.program,
            self.probe_args(reference),
            self.timeout,
            PROBE_NAME,
        )
        .await?;
        if !output.success {
            if reports_no_video(&output.stderr) {
                debug!("probe found no video, treating as photo");
                return Ok(ContentShape::photo());
            }
            return Err(classify_tool_failure(
                PROBE_NAME,
                reference.identifier(),
                ToolStage::Probe,
                &output.stderr,
            ));
        }

        let info: Value = serde_json::from_str(output.stdout.trim())
            .map_err(|e| ExtractError::structure(PROBE_NAME, format!("invalid probe JSON: {e}")))?;
        let shape = shape_from_info(&info);
        debug!(media_type = shape.media_type.as_str(), items = shape.item_count, "probe finished");
        Ok(shape)
    }
}

/// Maps probe JSON to a shape.
#[must_use]
pub fn shape_from_info(info: &Value) -> ContentShape {
    if is_playlist(info) {
        let count = info
            .get("entries")
            .and_then(Value::as_array)
            .map(Vec::len)
            .or_else(|| {
                info.get("playlist_count")
                    .and_then(Value::as_u64)
                    .and_then(|n| usize::try_from(n).ok())
            })
            .unwrap_or(1);
        return ContentShape::carousel(u32::try_from(count).unwrap_or(u32::MAX));
    }
    if entry_is_video(info) {
        ContentShape::video()
    } else {
        ContentShape::photo()
    }
}
