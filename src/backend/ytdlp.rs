//! `yt-dlp` backed extraction, with or without an Instagram account.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::error::{ExtractError, ToolStage, classify_tool_failure};
use super::process::run_tool;
use super::staging::StagingDir;
use super::{
    Backend, ExtractionResult, FileRole, MediaFile, MediaMetadata, MediaType, media_file_name,
    media_paths, thumbnail_file_name, total_size,
};
use crate::capability::BackendKind;
use crate::config::Settings;
use crate::parser::ContentReference;

/// Extensions yt-dlp uses for video containers.
pub(crate) const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "webm", "mov", "mkv"];

const MEDIA_PREFIX: &str = "item_";
const THUMB_PREFIX: &str = "thumb_";
const FORMAT_SELECTOR: &str = "best[ext=mp4]/best";
const NETRC_FILE: &str = ".netrc";
/// Machine name yt-dlp's Instagram extractor looks up in a netrc file.
const NETRC_MACHINE: &str = "instagram";

/// How yt-dlp authenticates.
#[derive(Clone)]
pub enum YtDlpMode {
    /// No account; serves one media item.
    Unauthenticated,
    /// Logs in with account credentials, handed over in a netrc file.
    Account { username: String, password: String },
    /// Reuses a browser session exported as a Netscape cookies file.
    Cookies(PathBuf),
}

impl fmt::Debug for YtDlpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => f.write_str("Unauthenticated"),
            Self::Account { username, .. } => f
                .debug_struct("Account")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Cookies(path) => f.debug_tuple("Cookies").field(path).finish(),
        }
    }
}

/// Backend running the `yt-dlp` binary.
#[derive(Debug, Clone)]
pub struct YtDlpBackend {
    mode: YtDlpMode,
    program: PathBuf,
    download_dir: PathBuf,
    user_agent: String,
    timeout: Duration,
}

impl YtDlpBackend {
    /// Backend without an account.
    #[must_use]
    pub fn unauthenticated(settings: &Settings) -> Self {
        Self::with_mode(settings, YtDlpMode::Unauthenticated)
    }

    /// Backend logged in with the configured cookies file or account.
    ///
    /// A cookies file wins over username/password when both are set.
    /// Returns `None` when neither is configured.
    #[must_use]
    pub fn authenticated(settings: &Settings) -> Option<Self> {
        let mode = if let Some(cookies) = &settings.instagram_cookies_file {
            YtDlpMode::Cookies(cookies.clone())
        } else if let (Some(username), Some(password)) =
            (&settings.instagram_username, &settings.instagram_password)
        {
            YtDlpMode::Account {
                username: username.clone(),
                password: password.clone(),
            }
        } else {
            return None;
        };
        Some(Self::with_mode(settings, mode))
    }

    fn with_mode(settings: &Settings, mode: YtDlpMode) -> Self {
        Self {
            mode,
            program: settings.ytdlp_path.clone(),
            download_dir: settings.download_dir.clone(),
            user_agent: settings.user_agent.clone(),
            timeout: settings.request_timeout,
        }
    }

    #[must_use]
    pub fn mode(&self) -> &YtDlpMode {
        &self.mode
    }
}

#[async_trait]
impl Backend for YtDlpBackend {
    fn kind(&self) -> BackendKind {
        match self.mode {
            YtDlpMode::Unauthenticated => BackendKind::Unauthenticated,
            YtDlpMode::Account { .. } | YtDlpMode::Cookies(_) => BackendKind::Authenticated,
        }
    }

    fn name(&self) -> &str {
        match self.mode {
            YtDlpMode::Unauthenticated => "yt-dlp",
            YtDlpMode::Account { .. } | YtDlpMode::Cookies(_) => "yt-dlp-authenticated",
        }
    }

    #[instrument(skip(self, reference), fields(backend = self.name(), identifier = reference.identifier()))]
    async fn fetch(&self, reference: &ContentReference) -> Result<ExtractionResult, ExtractError> {
        let key = reference.storage_key();
        let staging = StagingDir::create(&self.download_dir, &key).await?;
        if let YtDlpMode::Account { username, password } = &self.mode {
            write_netrc(&staging.path().join(NETRC_FILE), username, password).await?;
        }

        let args = build_fetch_args(
            &self.mode,
            reference,
            staging.path(),
            &self.user_agent,
            self.timeout,
        );
        let output = run_tool(&self.program, &args, self.timeout, self.name()).await?;
        if !output.success {
            debug!(code = ?output.code, "yt-dlp exited with failure");
            return Err(classify_tool_failure(
                self.name(),
                reference.identifier(),
                ToolStage::Fetch,
                &output.stderr,
            ));
        }

        let info: Value = serde_json::from_str(output.stdout.trim())
            .map_err(|e| ExtractError::structure(self.name(), format!("invalid JSON output: {e}")))?;
        if info.get("is_live").and_then(Value::as_bool) == Some(true) {
            return Err(ExtractError::structure(
                self.name(),
                "live streams cannot be downloaded until they end",
            ));
        }
        let is_playlist = is_playlist(&info);

        let scanned = scan_outputs(staging.path()).await?;
        let arranged = arrange_outputs(&key, is_playlist, scanned);
        if !arranged.iter().any(|f| f.role != FileRole::Thumbnail) {
            return Err(ExtractError::structure(
                self.name(),
                "yt-dlp finished without producing a media file",
            ));
        }

        let mut staged = Vec::with_capacity(arranged.len());
        for file in &arranged {
            let target = staging.path().join(&file.target_name);
            if file.source != target {
                tokio::fs::rename(&file.source, &target)
                    .await
                    .map_err(|e| ExtractError::io(&target, e))?;
            }
            staged.push(target);
        }

        let committed = staging.commit(&staged).await?;
        let files: Vec<MediaFile> = committed
            .into_iter()
            .zip(arranged.iter())
            .map(|(path, file)| MediaFile::new(path, file.role))
            .collect();

        let media_type = if is_playlist {
            MediaType::Carousel
        } else if entry_is_video(&info) {
            MediaType::Video
        } else {
            MediaType::Photo
        };

        let mut metadata = metadata_from_info(reference, &info);
        let media_files = media_paths(&files);
        metadata.size_bytes = Some(total_size(&media_files).await);

        info!(
            media_type = media_type.as_str(),
            files = files.len(),
            "yt-dlp fetch completed"
        );
        Ok(ExtractionResult {
            backend: self.kind(),
            media_type,
            files,
            metadata,
            degraded: None,
        })
    }
}

/// Arguments for a download run writing into `staging`.
///
/// Media lands as `item_{playlist_index}.{ext}` and thumbnails as
/// `thumb_{playlist_index}.{ext}`; [`arrange_outputs`] renames them to the
/// stable layout afterwards.
pub(crate) fn build_fetch_args(
    mode: &YtDlpMode,
    reference: &ContentReference,
    staging: &Path,
    user_agent: &str,
    timeout: Duration,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = common_args(user_agent, timeout);
    args.extend(
        [
            "--dump-single-json",
            "--no-simulate",
            "--write-thumbnail",
            "--format",
            FORMAT_SELECTOR,
        ]
        .map(OsString::from),
    );

    let mut media_template = OsString::from(staging.join(MEDIA_PREFIX).as_os_str());
    media_template.push("%(playlist_index)s.%(ext)s");
    let mut thumb_template = OsString::from("thumbnail:");
    thumb_template.push(staging.join(THUMB_PREFIX).as_os_str());
    thumb_template.push("%(playlist_index)s.%(ext)s");
    args.push("--output".into());
    args.push(media_template);
    args.push("--output".into());
    args.push(thumb_template);

    match mode {
        YtDlpMode::Unauthenticated => {
            let item = reference.item_index().unwrap_or(1);
            args.push("--playlist-items".into());
            args.push(item.to_string().into());
        }
        YtDlpMode::Account { .. } => {
            args.push("--netrc".into());
            args.push("--netrc-location".into());
            args.push(staging.join(NETRC_FILE).into());
        }
        YtDlpMode::Cookies(path) => {
            args.push("--cookies".into());
            args.push(path.into());
        }
    }

    args.push("--".into());
    args.push(reference.canonical_url().into());
    args
}

/// Writes account credentials as an owner-only netrc file, keeping them out of the child's argv.
async fn write_netrc(path: &Path, username: &str, password: &str) -> Result<(), ExtractError> {
    use tokio::io::AsyncWriteExt;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options
        .open(path)
        .await
        .map_err(|e| ExtractError::io(path, e))?;
    file.write_all(netrc_entry(username, password).as_bytes())
        .await
        .map_err(|e| ExtractError::io(path, e))?;
    file.flush().await.map_err(|e| ExtractError::io(path, e))
}

fn netrc_entry(username: &str, password: &str) -> String {
    format!(
        "machine {NETRC_MACHINE} login {} password {}\n",
        netrc_token(username),
        netrc_token(password)
    )
}

/// Quotes a token only when netrc's whitespace tokenizer would split it.
fn netrc_token(value: &str) -> String {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\') {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        value.to_string()
    }
}

/// Flags shared by probe and download runs.
pub(crate) fn common_args(user_agent: &str, timeout: Duration) -> Vec<OsString> {
    vec![
        "--ignore-config".into(),
        "--no-warnings".into(),
        "--no-progress".into(),
        "--socket-timeout".into(),
        timeout.as_secs().max(1).to_string().into(),
        "--user-agent".into(),
        user_agent.into(),
    ]
}

/// True when yt-dlp describes a multi-item container rather than one media.
pub(crate) fn is_playlist(info: &Value) -> bool {
    info.get("_type").and_then(Value::as_str) == Some("playlist")
        || info
            .get("entries")
            .and_then(Value::as_array)
            .is_some_and(|entries| !entries.is_empty())
}

/// True when a single yt-dlp entry describes a video.
pub(crate) fn entry_is_video(entry: &Value) -> bool {
    let ext_is_video = entry
        .get("ext")
        .and_then(Value::as_str)
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
    let has_vcodec = entry
        .get("vcodec")
        .and_then(Value::as_str)
        .is_some_and(|codec| codec != "none");
    let has_duration = entry
        .get("duration")
        .and_then(Value::as_f64)
        .is_some_and(|d| d > 0.0);
    ext_is_video || has_vcodec || has_duration
}

fn metadata_from_info(reference: &ContentReference, info: &Value) -> MediaMetadata {
    let text = |key: &str| {
        info.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let dimension = |key: &str| {
        info.get(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    };

    let mut metadata = MediaMetadata::for_reference(reference);
    metadata.title = text("title");
    metadata.caption = text("description");
    metadata.uploader = text("uploader").or_else(|| text("channel"));
    metadata.permalink = text("webpage_url");
    metadata.duration_seconds = info.get("duration").and_then(Value::as_f64);
    metadata.width = dimension("width");
    metadata.height = dimension("height");
    for key in ["upload_date", "view_count", "like_count", "comment_count", "uploader_id"] {
        if let Some(value) = info.get(key).filter(|v| !v.is_null()) {
            metadata.extra.insert(key.to_string(), value.clone());
        }
    }
    if let Some(entries) = info.get("entries").and_then(Value::as_array) {
        metadata
            .extra
            .insert("item_count".to_string(), Value::from(entries.len()));
    }
    metadata
}

/// A file yt-dlp left in the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScannedFile {
    pub(crate) path: PathBuf,
    pub(crate) thumbnail: bool,
    pub(crate) index: usize,
    pub(crate) ext: String,
}

/// Planned rename of a scanned file into the stable layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ArrangedFile {
    pub(crate) source: PathBuf,
    pub(crate) target_name: String,
    pub(crate) role: FileRole,
}

async fn scan_outputs(dir: &Path) -> Result<Vec<ScannedFile>, ExtractError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ExtractError::io(dir, e))?;
    let mut scanned = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| ExtractError::io(dir, e))? {
        if let Some(file) = parse_output_name(&entry.path()) {
            scanned.push(file);
        }
    }
    Ok(scanned)
}

/// Parses `item_{n}.{ext}` / `thumb_{n}.{ext}`; leftovers such as `.part` files are ignored.
pub(crate) fn parse_output_name(path: &Path) -> Option<ScannedFile> {
    let name = path.file_name()?.to_str()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if matches!(ext, "part" | "ytdl" | "json" | "temp") {
        return None;
    }
    let (thumbnail, raw_index) = if let Some(rest) = stem.strip_prefix(THUMB_PREFIX) {
        (true, rest)
    } else if let Some(rest) = stem.strip_prefix(MEDIA_PREFIX) {
        (false, rest)
    } else {
        return None;
    };
    // Single videos have no playlist index ("NA")
    let index = raw_index.parse::<usize>().unwrap_or(1).max(1);
    Some(ScannedFile {
        path: path.to_path_buf(),
        thumbnail,
        index,
        ext: ext.to_ascii_lowercase(),
    })
}

/// Maps scanned outputs onto stable names: media first (ordered by index), then one thumbnail.
pub(crate) fn arrange_outputs(
    storage_key: &str,
    is_playlist: bool,
    mut scanned: Vec<ScannedFile>,
) -> Vec<ArrangedFile> {
    scanned.sort_by_key(|f| (f.thumbnail, f.index));

    let mut arranged = Vec::new();
    let mut thumbnail_taken = false;
    for file in scanned {
        if file.thumbnail {
            if thumbnail_taken {
                continue;
            }
            thumbnail_taken = true;
            arranged.push(ArrangedFile {
                target_name: thumbnail_file_name(storage_key, &file.ext),
                source: file.path,
                role: FileRole::Thumbnail,
            });
        } else if is_playlist {
            arranged.push(ArrangedFile {
                target_name: media_file_name(storage_key, Some(file.index), &file.ext),
                source: file.path,
                role: FileRole::CarouselItem,
            });
        } else {
            arranged.push(ArrangedFile {
                target_name: media_file_name(storage_key, None, &file.ext),
                source: file.path,
                role: FileRole::Primary,
            });
        }
    }
    arranged
}
