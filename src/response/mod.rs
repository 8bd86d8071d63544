//! Caller-facing response documents.
//!
//! [`Normalizer`] turns a backend's [`ExtractionResult`] into the uniform
//! [`NormalizedResponse`]; [`ErrorResponse`] is its failure counterpart and
//! [`HealthReport`] the service status. All serialize to JSON with optional
//! fields omitted rather than null.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::{ExtractError, ExtractionResult, FileRole, MediaFile, MediaMetadata, MediaType};
use crate::capability::BackendKind;
use crate::download::{DownloadError, ErrorKind};

const NAME: &str = "normalizer";

/// Successful download, ready to hand to a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedResponse {
    pub status: &'static str,
    pub media_url: String,
    /// Every carousel item in source order; set only for more than one item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_urls: Option<Vec<String>>,
    pub media_type: MediaType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub metadata: MediaMetadata,
    pub backend: BackendKind,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Failed download, ready to hand to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub error_type: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    pub http_status: u16,
}

impl From<&DownloadError> for ErrorResponse {
    fn from(error: &DownloadError) -> Self {
        let kind = error.kind();
        Self {
            status: "error",
            error_type: kind,
            message: error.to_string(),
            remediation: error.remediation(),
            http_status: kind.http_status(),
        }
    }
}

/// Overall service state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Individual health checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthChecks {
    pub download_dir_writable: bool,
    pub unauthenticated_backend: bool,
    pub authenticated_backend: bool,
    pub official_api_backend: bool,
}

/// Service health, as printed by `--health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: &'static str,
    pub checks: HealthChecks,
}

impl HealthReport {
    /// Healthy when the download directory is writable and at least one backend is usable.
    #[must_use]
    pub fn from_checks(checks: HealthChecks) -> Self {
        let any_backend = checks.unauthenticated_backend
            || checks.authenticated_backend
            || checks.official_api_backend;
        let status = if checks.download_dir_writable && any_backend {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        Self {
            status,
            version: env!("CARGO_PKG_VERSION"),
            checks,
        }
    }
}

/// Builds public URLs and response documents from committed results.
#[derive(Debug, Clone)]
pub struct Normalizer {
    media_url_prefix: String,
}

impl Normalizer {
    #[must_use]
    pub fn new(media_url_prefix: &str) -> Self {
        Self {
            media_url_prefix: media_url_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Converts `result` into a response.
    ///
    /// # Errors
    ///
    /// [`ExtractError::BackendStructure`] when the result holds no media file;
    /// the result's files are removed in that case.
    pub async fn normalize(
        &self,
        result: ExtractionResult,
    ) -> Result<NormalizedResponse, ExtractError> {
        let items: Vec<&MediaFile> = result
            .files
            .iter()
            .filter(|f| f.role == FileRole::CarouselItem)
            .collect();
        let primary = result.files.iter().find(|f| f.role == FileRole::Primary);

        let (media_url, media_urls) = if items.len() > 1 {
            let urls = items
                .iter()
                .filter_map(|f| self.public_url(f))
                .collect::<Vec<_>>();
            if urls.len() != items.len() {
                return Err(self.reject(&result, "carousel item has no usable file name").await);
            }
            (urls[0].clone(), Some(urls))
        } else {
            match primary.or_else(|| items.first().copied()).and_then(|f| self.public_url(f)) {
                Some(url) => (url, None),
                None => return Err(self.reject(&result, "no media file was produced").await),
            }
        };

        let mut thumbnail_url = None;
        if let Some(thumb) = result.files.iter().find(|f| f.role == FileRole::Thumbnail) {
            if file_exists(&thumb.local_path).await {
                thumbnail_url = self.public_url(thumb);
            } else {
                debug!(path = %thumb.local_path.display(), "thumbnail missing on disk, omitting");
            }
        }

        Ok(NormalizedResponse {
            status: "success",
            media_url,
            media_urls,
            media_type: result.media_type,
            thumbnail_url,
            metadata: result.metadata,
            backend: result.backend,
            degraded: result.degraded.is_some(),
            warning: result.degraded,
        })
    }

    /// `{prefix}/{storage_key}/{file_name}`; the storage key is the committed directory name.
    fn public_url(&self, file: &MediaFile) -> Option<String> {
        let name = file.file_name()?;
        let key = file
            .local_path
            .parent()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())?;
        Some(format!("{}/{key}/{name}", self.media_url_prefix))
    }

    async fn reject(&self, result: &ExtractionResult, detail: &str) -> ExtractError {
        warn!(
            backend = result.backend.as_str(),
            identifier = %result.metadata.identifier,
            detail,
            "discarding unusable extraction result"
        );
        result.discard().await;
        ExtractError::structure(NAME, detail)
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;
    use crate::parser::classify;

    async fn write(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        tokio::fs::write(&path, b"data").await.unwrap();
        path
    }

    async fn key_dir(root: &TempDir, key: &str) -> PathBuf {
        let dir = root.path().join(key);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        dir
    }

    fn result(media_type: MediaType, files: Vec<MediaFile>) -> ExtractionResult {
        let reference = classify("https://www.instagram.com/p/ABC12345/").unwrap();
        ExtractionResult {
            backend: BackendKind::Authenticated,
            media_type,
            files,
            metadata: MediaMetadata::for_reference(&reference),
            degraded: None,
        }
    }

    // ==================== Single Media Tests ====================

    #[tokio::test]
    async fn test_single_video_with_thumbnail() {
        let root = TempDir::new().unwrap();
        let dir = key_dir(&root, "ABC12345").await;
        let video = write(&dir, "ABC12345.mp4").await;
        let thumb = write(&dir, "ABC12345_thumb.jpg").await;

        let response = Normalizer::new("/downloads/")
            .normalize(result(
                MediaType::Video,
                vec![
                    MediaFile::new(video, FileRole::Primary),
                    MediaFile::new(thumb, FileRole::Thumbnail),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(response.status, "success");
        assert_eq!(response.media_url, "/downloads/ABC12345/ABC12345.mp4");
        assert_eq!(
            response.thumbnail_url.as_deref(),
            Some("/downloads/ABC12345/ABC12345_thumb.jpg")
        );
        assert!(response.media_urls.is_none());
        assert!(!response.degraded);
    }

    #[tokio::test]
    async fn test_missing_thumbnail_is_omitted() {
        let root = TempDir::new().unwrap();
        let dir = key_dir(&root, "ABC12345").await;
        let video = write(&dir, "ABC12345.mp4").await;

        let response = Normalizer::new("/downloads")
            .normalize(result(
                MediaType::Video,
                vec![
                    MediaFile::new(video, FileRole::Primary),
                    MediaFile::new(dir.join("ABC12345_thumb.jpg"), FileRole::Thumbnail),
                ],
            ))
            .await
            .unwrap();

        assert!(response.thumbnail_url.is_none());
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("thumbnail_url").is_none());
        assert!(json.get("warning").is_none());
    }

    // ==================== Carousel Tests ====================

    #[tokio::test]
    async fn test_carousel_lists_every_item_in_order() {
        let root = TempDir::new().unwrap();
        let dir = key_dir(&root, "ABC12345").await;
        let mut files = Vec::new();
        for (n, ext) in [(1, "jpg"), (2, "mp4"), (3, "jpg")] {
            let path = write(&dir, &format!("ABC12345_{n}.{ext}")).await;
            files.push(MediaFile::new(path, FileRole::CarouselItem));
        }

        let response = Normalizer::new("/downloads")
            .normalize(result(MediaType::Carousel, files))
            .await
            .unwrap();

        let urls = response.media_urls.unwrap();
        assert_eq!(
            urls,
            [
                "/downloads/ABC12345/ABC12345_1.jpg",
                "/downloads/ABC12345/ABC12345_2.mp4",
                "/downloads/ABC12345/ABC12345_3.jpg",
            ]
        );
        assert_eq!(response.media_url, urls[0]);
    }

    #[tokio::test]
    async fn test_degraded_single_item_carousel() {
        let root = TempDir::new().unwrap();
        let dir = key_dir(&root, "ABC12345").await;
        let item = write(&dir, "ABC12345_1.jpg").await;
        let mut extraction = result(
            MediaType::Carousel,
            vec![MediaFile::new(item, FileRole::CarouselItem)],
        );
        extraction.backend = BackendKind::Unauthenticated;
        extraction.degraded = Some("only item 1 was downloaded".into());

        let response = Normalizer::new("/downloads").normalize(extraction).await.unwrap();

        assert_eq!(response.media_url, "/downloads/ABC12345/ABC12345_1.jpg");
        assert!(response.media_urls.is_none());
        assert!(response.degraded);
        assert_eq!(response.warning.as_deref(), Some("only item 1 was downloaded"));
        assert_eq!(response.status, "success");
    }

    // ==================== Failure Tests ====================

    #[tokio::test]
    async fn test_no_media_is_structure_error_and_discards() {
        let root = TempDir::new().unwrap();
        let dir = key_dir(&root, "ABC12345").await;
        let thumb = write(&dir, "ABC12345_thumb.jpg").await;

        let err = Normalizer::new("/downloads")
            .normalize(result(
                MediaType::Photo,
                vec![MediaFile::new(&thumb, FileRole::Thumbnail)],
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::BackendStructure { .. }));
        assert!(!thumb.exists());
    }

    #[test]
    fn test_error_response_from_download_error() {
        let error = DownloadError::from(classify("not-a-url").unwrap_err());
        let response = ErrorResponse::from(&error);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error_type"], "invalid_url");
        assert_eq!(json["http_status"], 400);
    }

    #[test]
    fn test_health_report_status() {
        let mut checks = HealthChecks {
            download_dir_writable: true,
            unauthenticated_backend: true,
            authenticated_backend: false,
            official_api_backend: false,
        };
        assert_eq!(HealthReport::from_checks(checks).status, HealthStatus::Healthy);
        checks.download_dir_writable = false;
        let report = HealthReport::from_checks(checks);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(serde_json::to_value(&report).unwrap()["status"], "degraded");
    }
}
