//! Integration tests for the Graph API backend against a mock API server.

use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sns_downloader_core::backend::{Backend, ExtractError, FileRole, GraphApiBackend, MediaType};
use sns_downloader_core::capability::BackendKind;
use sns_downloader_core::config::Settings;
use sns_downloader_core::parser::classify;
mod support;
use support::socket_guard::start_mock_server_or_skip;

const POST_URL: &str = "https://www.instagram.com/p/ABC12345/";

fn backend(server: &MockServer, root: &TempDir) -> GraphApiBackend {
    let settings = Settings {
        graph_api_token: Some("test-token".into()),
        graph_api_base_url: server.uri(),
        download_dir: root.path().to_path_buf(),
        request_timeout: Duration::from_secs(5),
        ..Settings::default()
    };
    GraphApiBackend::from_settings(&settings).unwrap().unwrap()
}

async fn mount_cdn(server: &MockServer, file: &str, body: &'static [u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/cdn/{file}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

async fn mount_page(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/me/media"))
        .and(query_param("access_token", "test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[test]
fn test_backend_absent_without_token() {
    let settings = Settings::default();
    assert!(GraphApiBackend::from_settings(&settings).unwrap().is_none());
}

// ---- Successful fetches ----

#[tokio::test]
async fn test_fetch_owned_image_commits_files() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let root = TempDir::new().unwrap();
    let uri = server.uri();
    mount_page(
        &server,
        json!({
            "data": [
                {"id": "1", "media_type": "IMAGE", "permalink": "https://www.instagram.com/p/OTHER9999/",
                 "media_url": format!("{uri}/cdn/other.jpg")},
                {"id": "2", "media_type": "IMAGE", "permalink": POST_URL,
                 "media_url": format!("{uri}/cdn/a.jpg?sig=1"),
                 "caption": "hello", "username": "owner", "timestamp": "2024-01-01T00:00:00+0000"}
            ]
        }),
    )
    .await;
    mount_cdn(&server, "a.jpg", b"image-bytes").await;

    let reference = classify(POST_URL).unwrap();
    let result = backend(&server, &root).fetch(&reference).await.unwrap();

    assert_eq!(result.backend, BackendKind::OfficialApi);
    assert_eq!(result.media_type, MediaType::Photo);
    assert_eq!(result.files.len(), 1);
    let file = &result.files[0];
    assert_eq!(file.role, FileRole::Primary);
    assert_eq!(file.local_path, root.path().join("ABC12345/ABC12345.jpg"));
    assert_eq!(std::fs::read(&file.local_path).unwrap(), b"image-bytes");
    assert_eq!(result.metadata.caption.as_deref(), Some("hello"));
    assert_eq!(result.metadata.uploader.as_deref(), Some("owner"));
    assert_eq!(result.metadata.extra["media_id"], "2");
    assert_eq!(result.metadata.size_bytes, Some(11));
}

#[tokio::test]
async fn test_fetch_video_with_thumbnail() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let root = TempDir::new().unwrap();
    let uri = server.uri();
    mount_page(
        &server,
        json!({
            "data": [{"id": "7", "media_type": "VIDEO", "permalink": POST_URL,
                      "media_url": format!("{uri}/cdn/clip"),
                      "thumbnail_url": format!("{uri}/cdn/cover.jpg")}]
        }),
    )
    .await;
    mount_cdn(&server, "clip", b"video").await;
    mount_cdn(&server, "cover.jpg", b"thumb").await;

    let reference = classify(POST_URL).unwrap();
    let result = backend(&server, &root).fetch(&reference).await.unwrap();

    assert_eq!(result.media_type, MediaType::Video);
    let names: Vec<_> = result.files.iter().filter_map(|f| f.file_name()).collect();
    assert_eq!(names, ["ABC12345.mp4", "ABC12345_thumb.jpg"]);
    assert_eq!(result.files[1].role, FileRole::Thumbnail);
}

#[tokio::test]
async fn test_fetch_carousel_downloads_children_in_order() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let root = TempDir::new().unwrap();
    let uri = server.uri();
    mount_page(
        &server,
        json!({
            "data": [{"id": "1", "media_type": "CAROUSEL_ALBUM", "permalink": POST_URL,
                      "children": {"data": [
                          {"id": "11", "media_type": "IMAGE", "media_url": format!("{uri}/cdn/one.jpg")},
                          {"id": "12", "media_type": "VIDEO", "media_url": format!("{uri}/cdn/two.mp4")},
                          {"id": "13", "media_type": "IMAGE", "media_url": format!("{uri}/cdn/three.png")}
                      ]}}]
        }),
    )
    .await;
    mount_cdn(&server, "one.jpg", b"1").await;
    mount_cdn(&server, "two.mp4", b"2").await;
    mount_cdn(&server, "three.png", b"3").await;

    let reference = classify(POST_URL).unwrap();
    let result = backend(&server, &root).fetch(&reference).await.unwrap();

    assert_eq!(result.media_type, MediaType::Carousel);
    let names: Vec<_> = result.files.iter().filter_map(|f| f.file_name()).collect();
    assert_eq!(names, ["ABC12345_1.jpg", "ABC12345_2.mp4", "ABC12345_3.png"]);
    assert!(result.files.iter().all(|f| f.role == FileRole::CarouselItem));
}

#[tokio::test]
async fn test_fetch_follows_paging() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let root = TempDir::new().unwrap();
    let uri = server.uri();
    mount_page(
        &server,
        json!({
            "data": [{"id": "1", "media_type": "IMAGE", "permalink": "https://www.instagram.com/p/OTHER9999/"}],
            "paging": {"next": format!("{uri}/page2?after=abc")}
        }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "2", "media_type": "IMAGE", "permalink": POST_URL,
                      "media_url": format!("{uri}/cdn/a.jpg")}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_cdn(&server, "a.jpg", b"x").await;

    let reference = classify(POST_URL).unwrap();
    let result = backend(&server, &root).fetch(&reference).await.unwrap();
    assert_eq!(result.files[0].file_name(), Some("ABC12345.jpg"));
}

// ---- Failures ----

#[tokio::test]
async fn test_media_not_owned_is_not_found() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let root = TempDir::new().unwrap();
    mount_page(
        &server,
        json!({"data": [{"id": "1", "media_type": "IMAGE", "permalink": "https://www.instagram.com/p/OTHER9999/"}]}),
    )
    .await;

    let reference = classify(POST_URL).unwrap();
    let err = backend(&server, &root).fetch(&reference).await.unwrap_err();
    assert!(matches!(err, ExtractError::ContentNotFound { .. }), "{err:?}");
    assert!(!root.path().join("ABC12345").exists());
}

#[tokio::test]
async fn test_expired_token_is_authentication_error() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let root = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path("/me/media"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"message": "Error validating access token", "type": "OAuthException", "code": 190}
        })))
        .mount(&server)
        .await;

    let reference = classify(POST_URL).unwrap();
    let err = backend(&server, &root).fetch(&reference).await.unwrap_err();
    assert!(matches!(err, ExtractError::Authentication { .. }), "{err:?}");
    assert!(!err.to_string().contains("test-token"));
}

#[tokio::test]
async fn test_unauthorized_status_is_authentication_error() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let root = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path("/me/media"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let reference = classify(POST_URL).unwrap();
    let err = backend(&server, &root).fetch(&reference).await.unwrap_err();
    assert!(matches!(err, ExtractError::Authentication { .. }), "{err:?}");
}

#[tokio::test]
async fn test_throttled_api_carries_retry_after() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let root = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path("/me/media"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let reference = classify(POST_URL).unwrap();
    let err = backend(&server, &root).fetch(&reference).await.unwrap_err();
    assert!(
        matches!(
            err,
            ExtractError::RateLimited { retry_after: Some(d), .. } if d == Duration::from_secs(7)
        ),
        "{err:?}"
    );
}

#[tokio::test]
async fn test_malformed_page_is_structure_error() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let root = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path("/me/media"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let reference = classify(POST_URL).unwrap();
    let err = backend(&server, &root).fetch(&reference).await.unwrap_err();
    assert!(matches!(err, ExtractError::BackendStructure { .. }), "{err:?}");
}

#[tokio::test]
async fn test_failed_media_download_leaves_no_files() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let root = TempDir::new().unwrap();
    let uri = server.uri();
    mount_page(
        &server,
        json!({
            "data": [{"id": "1", "media_type": "CAROUSEL_ALBUM", "permalink": POST_URL,
                      "children": {"data": [
                          {"id": "11", "media_type": "IMAGE", "media_url": format!("{uri}/cdn/one.jpg")},
                          {"id": "12", "media_type": "IMAGE", "media_url": format!("{uri}/cdn/gone.jpg")}
                      ]}}]
        }),
    )
    .await;
    mount_cdn(&server, "one.jpg", b"1").await;
    Mock::given(method("GET"))
        .and(path("/cdn/gone.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let reference = classify(POST_URL).unwrap();
    let err = backend(&server, &root).fetch(&reference).await.unwrap_err();
    assert!(matches!(err, ExtractError::ContentNotFound { .. }), "{err:?}");
    assert!(!root.path().join("ABC12345/ABC12345_1.jpg").exists());
}
