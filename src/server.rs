//! Router composition for the HTTP surface.

use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use tower_http::services::ServeDir;
use tracing::debug;

use crate::catalog::CatalogAssembler;
use crate::proxy::StreamingProxy;

/// Builds the application router.
///
/// Always mounts the proxy routes and `GET /health`. The catalog route is
/// mounted when a row source is configured, and `static_dir` (front-end
/// assets and the placeholder image) is served as the fallback.
pub fn build_router(
    proxy: Arc<StreamingProxy>,
    catalog: Option<Arc<CatalogAssembler>>,
    static_dir: Option<PathBuf>,
) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .merge(proxy.routes());

    if let Some(catalog) = catalog {
        router = router.merge(catalog.routes());
    }
    if let Some(dir) = static_dir {
        debug!(dir = %dir.display(), "Serving static files");
        router = router.fallback_service(ServeDir::new(dir));
    }
    router
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
