//! End-to-end pipeline tests for `Downloader::download`.
//!
//! Backends and analyzers are scripted fakes that write real files into a
//! temporary download directory, so routing, retries, normalization and the
//! metadata sidecar all run for real.

mod support;

use std::sync::Arc;
use std::time::Duration;

use sns_downloader_core::analyzer::{ContentShape, YtDlpAnalyzer};
use sns_downloader_core::backend::{Backend, ExtractError, MediaType};
use sns_downloader_core::capability::{BackendKind, CapabilitySet};
use sns_downloader_core::config::Settings;
use sns_downloader_core::download::{DownloadError, Downloader, ErrorKind, RetryPolicy};
use sns_downloader_core::response::ErrorResponse;
use tempfile::TempDir;

use support::{ScriptedAnalyzer, ScriptedBackend, rate_limited};

fn settings(root: &TempDir) -> Arc<Settings> {
    Arc::new(Settings {
        download_dir: root.path().to_path_buf(),
        ..Settings::default()
    })
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::with_max_attempts(3)
        .base_delay(Duration::ZERO)
        .jitter(Duration::ZERO)
}

// ==================== Scenario A: public reel ====================

/// A reel without credentials routes to the unauthenticated backend.
#[tokio::test]
async fn test_reel_without_credentials_uses_unauthenticated_backend() {
    let root = TempDir::new().unwrap();
    let settings = settings(&root);
    let backend = Arc::new(ScriptedBackend::new(
        BackendKind::Unauthenticated,
        root.path(),
        MediaType::Video,
        1,
    ));
    let downloader = Downloader::builder(Arc::clone(&settings))
        .capabilities(CapabilitySet::new(true, false, false))
        .analyzer(Arc::new(YtDlpAnalyzer::from_settings(&settings)))
        .backend(Arc::clone(&backend) as Arc<dyn Backend>)
        .retry_policy(fast_policy())
        .build()
        .unwrap();

    let response = downloader
        .download("https://www.instagram.com/reel/ABC12345/?igsh=abc")
        .await
        .unwrap();

    assert_eq!(response.status, "success");
    assert_eq!(response.media_url, "/downloads/ABC12345/ABC12345.mp4");
    assert_eq!(response.media_type, MediaType::Video);
    assert_eq!(response.backend, BackendKind::Unauthenticated);
    assert_eq!(
        response.thumbnail_url.as_deref(),
        Some("/downloads/ABC12345/ABC12345_thumb.jpg")
    );
    assert!(!response.degraded);
    assert_eq!(backend.calls(), 1);
    assert!(root.path().join("ABC12345/ABC12345.mp4").exists());
    assert!(root.path().join("ABC12345/ABC12345_metadata.json").exists());
}

// ==================== Scenario B: photo without credentials ====================

/// A photo post without credentials is refused with a configuration hint.
#[tokio::test]
async fn test_photo_without_credentials_is_no_backend_available() {
    let root = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::new(
        BackendKind::Unauthenticated,
        root.path(),
        MediaType::Photo,
        1,
    ));
    let downloader = Downloader::builder(settings(&root))
        .capabilities(CapabilitySet::new(true, false, false))
        .analyzer(Arc::new(ScriptedAnalyzer::new(ContentShape::photo())))
        .backend(Arc::clone(&backend) as Arc<dyn Backend>)
        .retry_policy(fast_policy())
        .build()
        .unwrap();

    let err = downloader
        .download("https://www.instagram.com/p/ABC12345/")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoBackendAvailable);
    assert_eq!(err.http_status(), 503);
    let remediation = err.remediation().unwrap();
    assert!(remediation.contains("INSTAGRAM_USERNAME"));
    assert!(remediation.contains("INSTAGRAM_COOKIES_FILE"));
    assert_eq!(backend.calls(), 0);

    let json = serde_json::to_value(ErrorResponse::from(&err)).unwrap();
    assert_eq!(json["error_type"], "no_backend_available");
    assert_eq!(json["http_status"], 503);
}

// ==================== Scenario C: full carousel ====================

/// A carousel with credentials yields every item in order.
#[tokio::test]
async fn test_carousel_with_credentials_lists_all_items() {
    let root = TempDir::new().unwrap();
    let backend = ScriptedBackend::new(BackendKind::Authenticated, root.path(), MediaType::Carousel, 3);
    let downloader = Downloader::builder(settings(&root))
        .capabilities(CapabilitySet::new(true, true, false))
        .analyzer(Arc::new(ScriptedAnalyzer::new(ContentShape::carousel(3))))
        .backend(Arc::new(backend))
        .retry_policy(fast_policy())
        .build()
        .unwrap();

    let response = downloader
        .download("https://www.instagram.com/p/ABC12345/")
        .await
        .unwrap();

    assert_eq!(response.media_type, MediaType::Carousel);
    assert_eq!(response.backend, BackendKind::Authenticated);
    assert_eq!(
        response.media_urls.as_deref().unwrap(),
        [
            "/downloads/ABC12345/ABC12345_1.jpg",
            "/downloads/ABC12345/ABC12345_2.jpg",
            "/downloads/ABC12345/ABC12345_3.jpg",
        ]
    );
    assert_eq!(response.media_url, "/downloads/ABC12345/ABC12345_1.jpg");
    assert!(!response.degraded);
}

/// Without credentials a carousel falls back to one item, flagged degraded.
#[tokio::test]
async fn test_carousel_without_credentials_is_degraded_success() {
    let root = TempDir::new().unwrap();
    let backend = ScriptedBackend::new(BackendKind::Unauthenticated, root.path(), MediaType::Carousel, 1);
    let downloader = Downloader::builder(settings(&root))
        .capabilities(CapabilitySet::new(true, false, false))
        .analyzer(Arc::new(ScriptedAnalyzer::new(ContentShape::carousel(5))))
        .backend(Arc::new(backend))
        .retry_policy(fast_policy())
        .build()
        .unwrap();

    let response = downloader
        .download("https://www.instagram.com/p/ABC12345/")
        .await
        .unwrap();

    assert_eq!(response.status, "success");
    assert!(response.degraded);
    assert!(response.warning.as_deref().unwrap().contains("5 items"));
    assert!(response.media_urls.is_none());
    assert_eq!(response.media_url, "/downloads/ABC12345/ABC12345_1.jpg");
}

// ==================== Scenario D: rate limits then success ====================

/// Two rate limits are retried and the third attempt succeeds.
#[tokio::test]
async fn test_rate_limits_then_success() {
    let root = TempDir::new().unwrap();
    let backend = Arc::new(
        ScriptedBackend::new(BackendKind::Unauthenticated, root.path(), MediaType::Video, 1)
            .failing_first(rate_limited())
            .failing_first(rate_limited()),
    );
    let downloader = Downloader::builder(settings(&root))
        .capabilities(CapabilitySet::new(true, false, false))
        .analyzer(Arc::new(ScriptedAnalyzer::new(ContentShape::video())))
        .backend(Arc::clone(&backend) as Arc<dyn Backend>)
        .retry_policy(fast_policy())
        .build()
        .unwrap();

    let response = downloader
        .download("https://youtu.be/dQw4w9WgXcQ")
        .await
        .unwrap();

    assert_eq!(backend.calls(), 3);
    assert_eq!(
        response.media_url,
        "/downloads/youtube_dQw4w9WgXcQ/youtube_dQw4w9WgXcQ.mp4"
    );
}

/// Rate limits past the attempt budget surface as 429.
#[tokio::test]
async fn test_rate_limit_exhaustion_is_429() {
    let root = TempDir::new().unwrap();
    let mut backend = ScriptedBackend::new(BackendKind::Unauthenticated, root.path(), MediaType::Video, 1);
    for _ in 0..3 {
        backend = backend.failing_first(rate_limited());
    }
    let backend = Arc::new(backend);
    let downloader = Downloader::builder(settings(&root))
        .capabilities(CapabilitySet::new(true, false, false))
        .analyzer(Arc::new(ScriptedAnalyzer::new(ContentShape::video())))
        .backend(Arc::clone(&backend) as Arc<dyn Backend>)
        .retry_policy(fast_policy())
        .build()
        .unwrap();

    let err = downloader
        .download("https://youtu.be/dQw4w9WgXcQ")
        .await
        .unwrap_err();

    assert_eq!(backend.calls(), 3);
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(err.http_status(), 429);
    assert!(matches!(
        err,
        DownloadError::Extract(ExtractError::DownloadFailed { attempts: 3, .. })
    ));
}

/// Private content is reported once, without retries.
#[tokio::test]
async fn test_private_account_is_not_retried() {
    let root = TempDir::new().unwrap();
    let backend = Arc::new(
        ScriptedBackend::new(BackendKind::Unauthenticated, root.path(), MediaType::Video, 1)
            .failing_first(ExtractError::PrivateAccount {
                identifier: "ABC12345".into(),
            }),
    );
    let downloader = Downloader::builder(settings(&root))
        .capabilities(CapabilitySet::new(true, false, false))
        .analyzer(Arc::new(ScriptedAnalyzer::new(ContentShape::video())))
        .backend(Arc::clone(&backend) as Arc<dyn Backend>)
        .retry_policy(fast_policy())
        .build()
        .unwrap();

    let err = downloader
        .download("https://www.instagram.com/reel/ABC12345/")
        .await
        .unwrap_err();

    assert_eq!(backend.calls(), 1);
    assert_eq!(err.kind(), ErrorKind::PrivateAccount);
    assert_eq!(err.http_status(), 403);
}

// ==================== Scenario E: invalid URL ====================

/// An invalid URL fails before any analyzer or backend runs.
#[tokio::test]
async fn test_invalid_url_fails_before_any_backend() {
    let root = TempDir::new().unwrap();
    let analyzer = Arc::new(ScriptedAnalyzer::new(ContentShape::video()));
    let backend = Arc::new(ScriptedBackend::new(
        BackendKind::Unauthenticated,
        root.path(),
        MediaType::Video,
        1,
    ));
    let downloader = Downloader::builder(settings(&root))
        .capabilities(CapabilitySet::new(true, false, false))
        .analyzer(Arc::clone(&analyzer) as _)
        .backend(Arc::clone(&backend) as Arc<dyn Backend>)
        .build()
        .unwrap();

    let err = downloader.download("not-a-url").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidUrl);
    assert_eq!(err.http_status(), 400);
    assert_eq!(analyzer.calls(), 0);
    assert_eq!(backend.calls(), 0);
}

// ==================== Fallback Tests ====================

/// Media the token owner does not own falls through to the authenticated backend.
#[tokio::test]
async fn test_official_api_not_found_falls_back_to_authenticated() {
    let root = TempDir::new().unwrap();
    let official = Arc::new(
        ScriptedBackend::new(BackendKind::OfficialApi, root.path(), MediaType::Photo, 1)
            .failing_first(ExtractError::not_found("ABC12345", "not owned")),
    );
    let authenticated = Arc::new(ScriptedBackend::new(
        BackendKind::Authenticated,
        root.path(),
        MediaType::Photo,
        1,
    ));
    let downloader = Downloader::builder(settings(&root))
        .capabilities(CapabilitySet::new(true, true, true))
        .analyzer(Arc::new(ScriptedAnalyzer::new(ContentShape::photo())))
        .backend(Arc::clone(&official) as Arc<dyn Backend>)
        .backend(Arc::clone(&authenticated) as Arc<dyn Backend>)
        .retry_policy(fast_policy())
        .build()
        .unwrap();

    let response = downloader
        .download("https://www.instagram.com/p/ABC12345/")
        .await
        .unwrap();

    assert_eq!(official.calls(), 1);
    assert_eq!(authenticated.calls(), 1);
    assert_eq!(response.backend, BackendKind::Authenticated);
    assert_eq!(response.media_url, "/downloads/ABC12345/ABC12345.jpg");
}

/// When every entry fails, the last entry's error is surfaced.
#[tokio::test]
async fn test_last_backend_error_is_surfaced() {
    let root = TempDir::new().unwrap();
    let official = ScriptedBackend::new(BackendKind::OfficialApi, root.path(), MediaType::Photo, 1)
        .failing_first(ExtractError::not_found("ABC12345", "not owned"));
    let authenticated =
        ScriptedBackend::new(BackendKind::Authenticated, root.path(), MediaType::Photo, 1)
            .failing_first(ExtractError::structure("yt-dlp-authenticated", "page changed"));
    let downloader = Downloader::builder(settings(&root))
        .capabilities(CapabilitySet::new(false, true, true))
        .analyzer(Arc::new(ScriptedAnalyzer::new(ContentShape::photo())))
        .backend(Arc::new(official))
        .backend(Arc::new(authenticated))
        .retry_policy(fast_policy())
        .build()
        .unwrap();

    let err = downloader
        .download("https://www.instagram.com/p/ABC12345/")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BackendStructure);
    assert_eq!(err.http_status(), 503);
}

// ==================== Analyzer Tests ====================

/// A probe that needs a login routes straight to the authenticated backend.
#[tokio::test]
async fn test_analysis_unavailable_routes_to_authenticated() {
    let root = TempDir::new().unwrap();
    let analyzer = ScriptedAnalyzer::new(ContentShape::photo()).failing_first(
        ExtractError::AnalysisUnavailable {
            identifier: "ABC12345".into(),
            detail: "login required".into(),
        },
    );
    let downloader = Downloader::builder(settings(&root))
        .capabilities(CapabilitySet::new(true, true, false))
        .analyzer(Arc::new(analyzer))
        .backend(Arc::new(ScriptedBackend::new(
            BackendKind::Authenticated,
            root.path(),
            MediaType::Photo,
            1,
        )))
        .retry_policy(fast_policy())
        .build()
        .unwrap();

    let response = downloader
        .download("https://www.instagram.com/p/ABC12345/")
        .await
        .unwrap();

    assert_eq!(response.backend, BackendKind::Authenticated);
}

/// Without credentials an unanalyzable post is refused with remediation.
#[tokio::test]
async fn test_analysis_unavailable_without_credentials() {
    let root = TempDir::new().unwrap();
    let analyzer = ScriptedAnalyzer::new(ContentShape::photo()).failing_first(
        ExtractError::AnalysisUnavailable {
            identifier: "ABC12345".into(),
            detail: "login required".into(),
        },
    );
    let downloader = Downloader::builder(settings(&root))
        .capabilities(CapabilitySet::new(true, false, false))
        .analyzer(Arc::new(analyzer))
        .backend(Arc::new(ScriptedBackend::new(
            BackendKind::Unauthenticated,
            root.path(),
            MediaType::Photo,
            1,
        )))
        .retry_policy(fast_policy())
        .build()
        .unwrap();

    let err = downloader
        .download("https://www.instagram.com/p/ABC12345/")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoBackendAvailable);
    assert!(err.remediation().is_some());
}

/// Transient probe failures are retried like extraction.
#[tokio::test]
async fn test_transient_analysis_failure_is_retried() {
    let root = TempDir::new().unwrap();
    let analyzer = Arc::new(
        ScriptedAnalyzer::new(ContentShape::video())
            .failing_first(ExtractError::network("yt-dlp-probe", "connection reset")),
    );
    let downloader = Downloader::builder(settings(&root))
        .capabilities(CapabilitySet::new(true, false, false))
        .analyzer(Arc::clone(&analyzer) as _)
        .backend(Arc::new(ScriptedBackend::new(
            BackendKind::Unauthenticated,
            root.path(),
            MediaType::Video,
            1,
        )))
        .retry_policy(fast_policy())
        .build()
        .unwrap();

    downloader
        .download("https://www.instagram.com/p/ABC12345/")
        .await
        .unwrap();

    assert_eq!(analyzer.calls(), 2);
}

/// Content that does not exist is reported by the analyzer as 404.
#[tokio::test]
async fn test_missing_content_from_analyzer_is_404() {
    let root = TempDir::new().unwrap();
    let analyzer = ScriptedAnalyzer::new(ContentShape::photo())
        .failing_first(ExtractError::not_found("ABC12345", "removed"));
    let downloader = Downloader::builder(settings(&root))
        .capabilities(CapabilitySet::new(true, true, false))
        .analyzer(Arc::new(analyzer))
        .retry_policy(fast_policy())
        .build()
        .unwrap();

    let err = downloader
        .download("https://www.instagram.com/p/ABC12345/")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ContentNotFound);
    assert_eq!(err.http_status(), 404);
}
