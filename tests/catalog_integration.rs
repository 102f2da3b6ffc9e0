//! Integration tests for catalog assembly and `GET /api/containers`.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use linkproxy_core::{
    CatalogAssembler, CatalogRow, JsonFileRowSource, MemoryRowSource, StreamingProxy, build_router,
};
use tower::ServiceExt;

mod support;
use support::service_for;

fn row(name: &str, photo: &str) -> CatalogRow {
    CatalogRow::from([
        ("name".to_string(), name.to_string()),
        ("photo".to_string(), photo.to_string()),
    ])
}

#[tokio::test]
async fn test_page_resolves_direct_links_and_blank_photos() {
    let (service, _cache) = service_for("http://127.0.0.1:1");
    let source = MemoryRowSource::new(vec![
        row("crate-1", "https://site.example/img/one.jpg"),
        row("crate-2", ""),
        row("crate-3", "https://site.example/img/three.png"),
    ]);
    let catalog = CatalogAssembler::new(Arc::new(source), service);

    let page = tokio_test::assert_ok!(catalog.page(1, 2).await);
    assert!(page.success);
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.data[0]["photo"], "https://site.example/img/one.jpg");
    assert_eq!(page.data[1]["photo"], "/placeholder.jpg");
    assert_eq!(page.data[0]["name"], "crate-1");
    assert_eq!(page.pagination.total, 3);
    assert_eq!(page.pagination.total_pages, 2);
    assert!(page.pagination.has_next_page);

    let last = tokio_test::assert_ok!(catalog.page(2, 2).await);
    assert_eq!(last.data.len(), 1);
    assert!(!last.pagination.has_next_page);
}

#[tokio::test]
async fn test_containers_route_reads_json_file_with_custom_photo_field() {
    let dir = tempfile::tempdir().unwrap();
    let rows = dir.path().join("rows.json");
    std::fs::write(
        &rows,
        r#"[
            {"Номер": "A-1", "Фото": "https://site.example/a.jpg", "Вес": 12},
            {"Номер": "A-2", "Фото": "  ", "Вес": 7}
        ]"#,
    )
    .unwrap();

    let (service, _cache) = service_for("http://127.0.0.1:1");
    let catalog = Arc::new(
        CatalogAssembler::new(Arc::new(JsonFileRowSource::new(&rows)), Arc::clone(&service))
            .with_photo_field("Фото"),
    );
    let proxy = Arc::new(StreamingProxy::new(service).unwrap());
    let router = build_router(proxy, Some(catalog), None);

    let response = router
        .oneshot(
            Request::get("/api/containers?page=abc&limit=5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["pagination"]["page"], 1);
    assert_eq!(json["pagination"]["limit"], 5);
    assert_eq!(json["pagination"]["totalPages"], 1);
    assert_eq!(json["data"][0]["photo"], "https://site.example/a.jpg");
    assert_eq!(json["data"][0]["Вес"], "12");
    assert_eq!(json["data"][1]["photo"], "/placeholder.jpg");
    assert!(json["data"][0].get("Фото").is_none());
}

#[tokio::test]
async fn test_containers_route_reports_source_failure() {
    let dir = tempfile::tempdir().unwrap();
    let (service, _cache) = service_for("http://127.0.0.1:1");
    let catalog = Arc::new(CatalogAssembler::new(
        Arc::new(JsonFileRowSource::new(dir.path().join("missing.json"))),
        Arc::clone(&service),
    ));
    let proxy = Arc::new(StreamingProxy::new(service).unwrap());
    let router = build_router(proxy, Some(catalog), None);

    let response = router
        .oneshot(Request::get("/api/containers").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("missing.json"));
}
