//! Integration tests for link resolution through the public service API.
//!
//! Provider endpoints are served by wiremock; every test points the Disk and
//! Imgur bases at the mock server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use linkproxy_core::{LinkKind, classify, proxy_token};
use tokio::time::Instant;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, Request, Respond, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;
use support::{config_for, service_for, service_with};

const ALBUM_LINK: &str = "https://imgur.com/a/AbCdE12";
const IMAGE_PAGE_LINK: &str = "https://imgur.com/AbCdE12";

fn album_body(link: &str) -> serde_json::Value {
    serde_json::json!({
        "data": [{"id": "img1", "type": "image/png", "link": link}],
        "success": true,
        "status": 200
    })
}

/// Records when each request arrived.
#[derive(Clone, Default)]
struct ArrivalRecorder {
    arrivals: Arc<Mutex<Vec<Instant>>>,
    body: serde_json::Value,
}

impl Respond for ArrivalRecorder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        ResponseTemplate::new(200).set_body_json(self.body.clone())
    }
}

// ==================== Pass-through ====================

#[tokio::test]
async fn test_direct_image_link_is_returned_unchanged() {
    let (service, cache) = service_for("http://127.0.0.1:1");
    let raw = "https://site.example/img/abc.jpg";

    assert_eq!(classify(raw).kind, LinkKind::DirectImage);
    assert_eq!(service.resolve_image_reference(raw).await, raw);
    assert!(cache.is_empty(), "direct links are not cached");
}

#[tokio::test]
async fn test_unknown_link_passes_through() {
    let (service, _cache) = service_for("http://127.0.0.1:1");
    assert_eq!(
        service
            .resolve_image_reference("https://example.org/gallery?id=7")
            .await,
        "https://example.org/gallery?id=7"
    );
}

#[tokio::test]
async fn test_blank_link_yields_placeholder() {
    let (service, _cache) = service_for("http://127.0.0.1:1");
    assert_eq!(service.resolve_image_reference("   ").await, "/placeholder.jpg");
}

#[tokio::test]
async fn test_insecure_direct_link_is_relayed() {
    let (service, _cache) = service_for("http://127.0.0.1:1");
    let reference = service
        .resolve_image_reference("http://cdn.example/a.png")
        .await;
    assert_eq!(reference, "/image-proxy?url=http%3A%2F%2Fcdn.example%2Fa.png");
}

// ==================== Caching ====================

#[tokio::test]
async fn test_album_resolution_is_cached_after_first_success() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/3/album/AbCdE12/images"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(album_body("https://i.imgur.com/img1.png")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let (service, cache) = service_for(&mock_server.uri());
    let first = service.resolve_image_reference(ALBUM_LINK).await;
    let second = service.resolve_image_reference(ALBUM_LINK).await;

    assert_eq!(first, "https://i.imgur.com/img1.png");
    assert_eq!(first, second, "resolution must be idempotent");
    let entry = cache.get(ALBUM_LINK);
    assert!(entry.is_some_and(|entry| entry.volatile));
}

#[tokio::test]
async fn test_cache_key_ignores_surrounding_whitespace() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/3/album/AbCdE12/images"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(album_body("https://i.imgur.com/img1.png")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let (service, _cache) = service_for(&mock_server.uri());
    let first = service.resolve_image_reference(ALBUM_LINK).await;
    let padded = service
        .resolve_image_reference(&format!("  {ALBUM_LINK}\n"))
        .await;
    assert_eq!(first, padded);
}

#[tokio::test]
async fn test_failed_resolution_is_not_cached() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/3/album/AbCdE12/images"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(path_regex(r"^/AbCdE12\.(jpg|png|jpeg|webp)$"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let (service, cache) = service_for(&mock_server.uri());
    assert_eq!(service.resolve_image_reference(ALBUM_LINK).await, "/placeholder.jpg");
    assert!(cache.get(ALBUM_LINK).is_none());

    // A later call retries the providers from scratch.
    assert_eq!(service.resolve_image_reference(ALBUM_LINK).await, "/placeholder.jpg");
}

#[tokio::test]
async fn test_album_api_timeout_and_failed_guesses_yield_placeholder() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    // Timeouts are transient: one retry, then the chain moves on.
    Mock::given(method("GET"))
        .and(path("/3/album/AbCdE12/images"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(album_body("https://i.imgur.com/img1.png"))
                .set_delay(Duration::from_secs(2)),
        )
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(path_regex(r"^/AbCdE12\.(jpg|png|jpeg|webp)$"))
        .respond_with(ResponseTemplate::new(404))
        .expect(4)
        .mount(&mock_server)
        .await;

    let (service, cache) = service_for(&mock_server.uri());
    assert_eq!(service.resolve_image_reference(ALBUM_LINK).await, "/placeholder.jpg");
    assert!(cache.get(ALBUM_LINK).is_none());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_stale_volatile_hit_is_invalidated_and_re_resolved() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let image = format!("{}/img1.png", mock_server.uri());
    Mock::given(method("GET"))
        .and(path("/3/album/AbCdE12/images"))
        .respond_with(ResponseTemplate::new(200).set_body_json(album_body(&image)))
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/img1.png"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = config_for(&mock_server.uri());
    config.volatile_recheck_after = Duration::ZERO;
    let (service, cache) = service_with(config);

    assert_eq!(service.resolve_image_reference(ALBUM_LINK).await, image);
    // The cached link no longer answers, so the album is listed again.
    assert_eq!(service.resolve_image_reference(ALBUM_LINK).await, image);
    assert!(cache.get(ALBUM_LINK).is_some_and(|entry| entry.volatile));
}

#[tokio::test]
async fn test_reachable_volatile_hit_is_restamped() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let image = format!("{}/img1.png", mock_server.uri());
    Mock::given(method("GET"))
        .and(path("/3/album/AbCdE12/images"))
        .respond_with(ResponseTemplate::new(200).set_body_json(album_body(&image)))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/img1.png"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/png"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = config_for(&mock_server.uri());
    config.volatile_recheck_after = Duration::ZERO;
    let (service, cache) = service_with(config);

    assert_eq!(service.resolve_image_reference(ALBUM_LINK).await, image);
    let first = cache.get(ALBUM_LINK).unwrap();
    assert_eq!(service.resolve_image_reference(ALBUM_LINK).await, image);
    let second = cache.get(ALBUM_LINK).unwrap();

    assert!(second.volatile);
    assert!(second.created_at > first.created_at, "probe success re-stamps the entry");
}

// ==================== Fallback order ====================

#[tokio::test]
async fn test_failed_album_api_falls_back_to_ordered_extension_guess() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/3/album/AbCdE12/images"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(path("/AbCdE12.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(path("/AbCdE12.png"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/png"))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(path_regex(r"^/AbCdE12\.(jpeg|webp)$"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/jpeg"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let (service, _cache) = service_for(&mock_server.uri());
    let reference = service.resolve_image_reference(ALBUM_LINK).await;
    assert_eq!(reference, format!("{}/AbCdE12.png", mock_server.uri()));
}

#[tokio::test]
async fn test_image_page_only_guesses_extensions() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(path_regex(r"^/3/album/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(path("/AbCdE12.jpg"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/jpeg"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (service, _cache) = service_for(&mock_server.uri());
    let reference = service.resolve_image_reference(IMAGE_PAGE_LINK).await;
    assert_eq!(reference, format!("{}/AbCdE12.jpg", mock_server.uri()));
}

#[tokio::test]
async fn test_missing_client_id_still_falls_back_to_guessing() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(path("/3/album/AbCdE12/images"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(path("/AbCdE12.jpg"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/jpeg"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = config_for(&mock_server.uri());
    config.providers.imgur_client_id = None;
    let (service, _cache) = service_with(config);

    let reference = service.resolve_image_reference(ALBUM_LINK).await;
    assert_eq!(reference, format!("{}/AbCdE12.jpg", mock_server.uri()));
}

// ==================== Disk ====================

#[tokio::test]
async fn test_disk_folder_resolves_to_opaque_proxy_reference() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let raw = "https://disk.yandex.ru/d/FolderKey1";
    Mock::given(method("GET"))
        .and(path("/v1/disk/public/resources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "type": "dir",
            "path": "/",
            "_embedded": {"items": [
                {"type": "file", "name": "cover.jpg", "mime_type": "image/jpeg", "path": "/cover.jpg"}
            ]}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/disk/public/resources/download"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "href": format!("{}/dl/cover.jpg", mock_server.uri())
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (service, cache) = service_for(&mock_server.uri());
    let reference = service.resolve_image_reference(raw).await;
    let token = proxy_token(raw);

    assert_eq!(reference, format!("/resolve/{token}"));
    assert!(!reference.contains("dl/cover.jpg"), "upstream handle must stay hidden");
    let target = service.proxy_target(&token);
    assert!(target.is_some_and(|target| target.upstream_url.ends_with("/dl/cover.jpg")));
    let entry = cache.get(raw);
    assert!(entry.is_some_and(|entry| entry.expires_at.is_some()));

    // Second call is a cache hit.
    assert_eq!(service.resolve_image_reference(raw).await, reference);
}

// ==================== Rate limiting ====================

#[tokio::test]
async fn test_concurrent_album_calls_are_spaced_per_provider() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let recorder = ArrivalRecorder {
        arrivals: Arc::default(),
        body: album_body("https://i.imgur.com/img1.png"),
    };
    Mock::given(method("GET"))
        .and(path_regex(r"^/3/album/[A-Za-z0-9]+/images$"))
        .respond_with(recorder.clone())
        .expect(2)
        .mount(&mock_server)
        .await;

    let mut config = config_for(&mock_server.uri());
    config.imgur_interval = Duration::from_millis(200);
    let (service, _cache) = service_with(config);

    let (first, second) = tokio::join!(
        service.resolve_image_reference("https://imgur.com/a/AlbumOne1"),
        service.resolve_image_reference("https://imgur.com/a/AlbumTwo2"),
    );
    assert_eq!(first, "https://i.imgur.com/img1.png");
    assert_eq!(second, "https://i.imgur.com/img1.png");

    let arrivals = recorder.arrivals.lock().unwrap().clone();
    assert_eq!(arrivals.len(), 2);
    let gap = arrivals[1].saturating_duration_since(arrivals[0]);
    assert!(
        gap >= Duration::from_millis(180),
        "API calls must be spaced by the provider interval, got {gap:?}"
    );
}
