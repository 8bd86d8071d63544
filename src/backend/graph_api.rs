//! Instagram Graph API backend.
//!
//! The Graph API addresses media by numeric id, not by shortcode, and only
//! exposes the token owner's own media. The backend therefore pages through
//! `/me/media` looking for the item whose permalink carries the shortcode,
//! then streams its media (and carousel children) from the returned CDN URLs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::error::ExtractError;
use super::http_client::{build_http_client, download_media};
use super::staging::StagingDir;
use super::{
    Backend, ExtractionResult, FileRole, MediaFile, MediaMetadata, MediaType, media_file_name,
    media_paths, thumbnail_file_name, total_size,
};
use crate::capability::BackendKind;
use crate::config::Settings;
use crate::download::parse_retry_after;
use crate::parser::ContentReference;
use crate::user_agent;

const NAME: &str = "graph-api";

/// Pages of `/me/media` searched before giving up.
pub const MAX_PAGES: usize = 5;

const PAGE_SIZE: &str = "50";

const MEDIA_FIELDS: &str = "id,media_type,media_url,thumbnail_url,permalink,caption,timestamp,username,children{id,media_type,media_url,thumbnail_url}";

/// Graph API error code for invalid or expired access tokens.
const OAUTH_ERROR_CODE: i64 = 190;

#[derive(Debug, Deserialize)]
struct MediaPage {
    #[serde(default)]
    data: Vec<GraphMedia>,
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphMedia {
    id: String,
    media_type: String,
    media_url: Option<String>,
    thumbnail_url: Option<String>,
    permalink: Option<String>,
    caption: Option<String>,
    timestamp: Option<String>,
    username: Option<String>,
    children: Option<Children>,
}

#[derive(Debug, Clone, Deserialize)]
struct Children {
    #[serde(default)]
    data: Vec<GraphMedia>,
}

/// Official API backend; needs `INSTAGRAM_GRAPH_API_TOKEN`.
pub struct GraphApiBackend {
    client: Client,
    base_url: String,
    token: String,
    download_dir: std::path::PathBuf,
    timeout: Duration,
}

impl std::fmt::Debug for GraphApiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphApiBackend")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("download_dir", &self.download_dir)
            .finish_non_exhaustive()
    }
}

impl GraphApiBackend {
    /// Builds the backend from settings; `None` when no token is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Network`] when the HTTP client cannot be built.
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>, ExtractError> {
        let Some(token) = settings.graph_api_token.clone() else {
            return Ok(None);
        };
        let client = build_http_client(
            NAME,
            &user_agent::default_api_user_agent(),
            settings.request_timeout,
        )?;
        Ok(Some(Self {
            client,
            base_url: settings.graph_api_base_url.trim_end_matches('/').to_string(),
            token,
            download_dir: settings.download_dir.clone(),
            timeout: settings.request_timeout,
        }))
    }

    fn first_page_url(&self) -> Result<Url, ExtractError> {
        let mut url = Url::parse(&format!("{}/me/media", self.base_url))
            .map_err(|e| ExtractError::structure(NAME, format!("invalid API base URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("fields", MEDIA_FIELDS)
            .append_pair("limit", PAGE_SIZE)
            .append_pair("access_token", &self.token);
        Ok(url)
    }

    /// Pages through `/me/media` until the shortcode's media is found.
    async fn find_media(&self, shortcode: &str) -> Result<GraphMedia, ExtractError> {
        let mut next = Some(self.first_page_url()?.to_string());
        let mut pages = 0;

        while let Some(page_url) = next.take() {
            if pages >= MAX_PAGES {
                break;
            }
            pages += 1;
            let page = self.get_page(&page_url, shortcode).await?;
            debug!(page = pages, items = page.data.len(), "searched media page");

            if let Some(media) = page.data.into_iter().find(|m| permalink_matches(m, shortcode)) {
                return Ok(media);
            }
            next = page.paging.and_then(|p| p.next);
        }

        Err(ExtractError::not_found(
            shortcode,
            format!(
                "not among the token owner's media (searched {pages} page(s)); the Graph API only serves the account's own posts"
            ),
        ))
    }

    async fn get_page(&self, page_url: &str, shortcode: &str) -> Result<MediaPage, ExtractError> {
        debug!(endpoint = %redact_url(page_url), "requesting media page");
        let response = self
            .client
            .get(page_url)
            .send()
            .await
            .map_err(|e| ExtractError::from_reqwest(NAME, &e.without_url(), self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_failure(shortcode, status.as_u16(), retry_after, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ExtractError::from_reqwest(NAME, &e.without_url(), self.timeout))?;
        serde_json::from_str(&body)
            .map_err(|e| ExtractError::structure(NAME, format!("malformed media page: {e}")))
    }
}

#[async_trait]
impl Backend for GraphApiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::OfficialApi
    }

    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip(self, reference), fields(backend = NAME, identifier = reference.identifier()))]
    async fn fetch(&self, reference: &ContentReference) -> Result<ExtractionResult, ExtractError> {
        let shortcode = reference.identifier();
        let media = self.find_media(shortcode).await?;
        info!(media_id = %media.id, media_type = %media.media_type, "media located via Graph API");

        let key = reference.storage_key();
        let staging = StagingDir::create(&self.download_dir, &key).await?;

        let (media_type, items) = plan_downloads(&media)?;
        let mut staged = Vec::new();
        let mut roles = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let Some(source) = item.media_url.as_deref() else {
                return Err(ExtractError::structure(
                    NAME,
                    format!("media {} has no media_url (possibly copyright restricted)", item.id),
                ));
            };
            let ext = extension_for(source, &item.media_type);
            let (name, role) = if media_type == MediaType::Carousel {
                (media_file_name(&key, Some(index + 1), &ext), FileRole::CarouselItem)
            } else {
                (media_file_name(&key, None, &ext), FileRole::Primary)
            };
            let dest = staging.path().join(name);
            download_media(&self.client, NAME, shortcode, source, &dest, self.timeout).await?;
            staged.push(dest);
            roles.push(role);
        }

        let thumbnail_source = media
            .thumbnail_url
            .as_deref()
            .or_else(|| items.first().and_then(|c| c.thumbnail_url.as_deref()));
        if let Some(source) = thumbnail_source {
            let dest = staging
                .path()
                .join(thumbnail_file_name(&key, &extension_for(source, "IMAGE")));
            // A missing thumbnail does not fail the fetch
            match download_media(&self.client, NAME, shortcode, source, &dest, self.timeout).await {
                Ok(_) => {
                    staged.push(dest);
                    roles.push(FileRole::Thumbnail);
                }
                Err(error) => warn!(%error, "thumbnail download failed; continuing without it"),
            }
        }

        let committed = staging.commit(&staged).await?;
        let files: Vec<MediaFile> = committed
            .into_iter()
            .zip(roles)
            .map(|(path, role)| MediaFile::new(path, role))
            .collect();

        let mut metadata = MediaMetadata::for_reference(reference);
        metadata.caption = media.caption.clone();
        metadata.uploader = media.username.clone();
        metadata.permalink = media.permalink.clone();
        metadata
            .extra
            .insert("media_id".to_string(), Value::from(media.id.clone()));
        if let Some(timestamp) = &media.timestamp {
            metadata
                .extra
                .insert("timestamp".to_string(), Value::from(timestamp.clone()));
        }
        let media_files = media_paths(&files);
        metadata.size_bytes = Some(total_size(&media_files).await);

        Ok(ExtractionResult {
            backend: BackendKind::OfficialApi,
            media_type,
            files,
            metadata,
            degraded: None,
        })
    }
}

fn permalink_matches(media: &GraphMedia, shortcode: &str) -> bool {
    media.permalink.as_deref().is_some_and(|permalink| {
        permalink
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .is_some_and(|last| last == shortcode)
    })
}

/// Decides the media type and the ordered list of items to download.
fn plan_downloads(media: &GraphMedia) -> Result<(MediaType, Vec<GraphMedia>), ExtractError> {
    match media.media_type.as_str() {
        "VIDEO" => Ok((MediaType::Video, vec![media.clone()])),
        "IMAGE" => Ok((MediaType::Photo, vec![media.clone()])),
        "CAROUSEL_ALBUM" => {
            let children = media
                .children
                .as_ref()
                .map(|c| c.data.clone())
                .unwrap_or_default();
            if children.is_empty() {
                return Err(ExtractError::structure(
                    NAME,
                    format!("carousel {} has no children", media.id),
                ));
            }
            Ok((MediaType::Carousel, children))
        }
        other => Err(ExtractError::structure(
            NAME,
            format!("unknown media_type '{other}'"),
        )),
    }
}

/// File extension from the CDN URL path, falling back to the media type.
fn extension_for(media_url: &str, media_type: &str) -> String {
    let from_path = Url::parse(media_url).ok().and_then(|url| {
        url.path()
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()))
    });
    from_path.unwrap_or_else(|| {
        let fallback = if media_type == "VIDEO" { "mp4" } else { "jpg" };
        fallback.to_string()
    })
}

/// Maps a failed API response, looking inside the Graph error body for token errors.
fn classify_api_failure(
    shortcode: &str,
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> ExtractError {
    let code = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/code").and_then(Value::as_i64));
    if code == Some(OAUTH_ERROR_CODE) {
        return ExtractError::from_status(NAME, shortcode, 401, None);
    }
    ExtractError::from_status(NAME, shortcode, status, retry_after)
}

/// Drops the query string so tokens never reach the logs.
fn redact_url(raw: &str) -> String {
    Url::parse(raw).map_or_else(
        |_| "<unparseable url>".to_string(),
        |mut url| {
            url.set_query(None);
            url.to_string()
        },
    )
}
