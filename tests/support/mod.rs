//! Shared helpers for integration tests: scripted analyzer and backend fakes
//! that write real files under a temporary download directory.

#![allow(dead_code)]

pub mod socket_guard;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use sns_downloader_core::analyzer::{ContentAnalyzer, ContentShape};
use sns_downloader_core::backend::{
    Backend, ExtractError, ExtractionResult, FileRole, MediaFile, MediaMetadata, MediaType,
    media_file_name, thumbnail_file_name,
};
use sns_downloader_core::capability::BackendKind;
use sns_downloader_core::parser::ContentReference;

/// Analyzer returning queued errors first, then a fixed shape.
pub struct ScriptedAnalyzer {
    shape: ContentShape,
    failures: Mutex<VecDeque<ExtractError>>,
    pub calls: AtomicU32,
}

impl ScriptedAnalyzer {
    pub fn new(shape: ContentShape) -> Self {
        Self {
            shape,
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing_first(self, error: ExtractError) -> Self {
        self.failures.lock().unwrap().push_back(error);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, _reference: &ContentReference) -> Result<ContentShape, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(self.shape)
    }
}

/// Backend returning queued errors first, then writing `items` media files
/// (plus a thumbnail) into `{root}/{storage_key}/`.
pub struct ScriptedBackend {
    kind: BackendKind,
    root: PathBuf,
    media_type: MediaType,
    items: usize,
    failures: Mutex<VecDeque<ExtractError>>,
    calls: AtomicU32,
}

impl ScriptedBackend {
    pub fn new(kind: BackendKind, root: impl Into<PathBuf>, media_type: MediaType, items: usize) -> Self {
        Self {
            kind,
            root: root.into(),
            media_type,
            items,
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing_first(self, error: ExtractError) -> Self {
        self.failures.lock().unwrap().push_back(error);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn name(&self) -> &str {
        self.kind.as_str()
    }

    async fn fetch(&self, reference: &ContentReference) -> Result<ExtractionResult, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let key = reference.storage_key();
        let dir = self.root.join(&key);
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let ext = if self.media_type == MediaType::Video { "mp4" } else { "jpg" };
        let mut files = Vec::new();
        if self.media_type == MediaType::Carousel {
            for n in 1..=self.items {
                let path = dir.join(media_file_name(&key, Some(n), ext));
                tokio::fs::write(&path, format!("item {n}")).await.unwrap();
                files.push(MediaFile::new(path, FileRole::CarouselItem));
            }
        } else {
            let path = dir.join(media_file_name(&key, None, ext));
            tokio::fs::write(&path, b"media").await.unwrap();
            files.push(MediaFile::new(path, FileRole::Primary));
        }
        let thumb = dir.join(thumbnail_file_name(&key, "jpg"));
        tokio::fs::write(&thumb, b"thumb").await.unwrap();
        files.push(MediaFile::new(thumb, FileRole::Thumbnail));

        Ok(ExtractionResult {
            backend: self.kind,
            media_type: self.media_type,
            files,
            metadata: MediaMetadata::for_reference(reference),
            degraded: None,
        })
    }
}

pub fn rate_limited() -> ExtractError {
    ExtractError::RateLimited {
        backend: "scripted".into(),
        retry_after: None,
    }
}
