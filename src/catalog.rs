//! Catalog assembly over an external row source.
//!
//! A [`RowSource`] yields pages of named string fields. The
//! [`CatalogAssembler`] resolves each row's image field through
//! [`ImageLinkService`] concurrently and serves the result as
//! `GET /api/containers?page=&limit=`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument};

use crate::service::ImageLinkService;

/// Default name of the row field holding the raw image link.
pub const DEFAULT_PHOTO_FIELD: &str = "photo";
/// Default page size.
pub const DEFAULT_PAGE_LIMIT: usize = 10;
/// Largest page size a caller may request.
pub const MAX_PAGE_LIMIT: usize = 100;

/// One catalog row: named string fields in a stable order.
pub type CatalogRow = BTreeMap<String, String>;

/// Errors raised by row sources.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The backing file could not be read.
    #[error("cannot read rows from {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The backing file is not a JSON array of objects.
    #[error("invalid row data in {path}: {message}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// What was wrong.
        message: String,
    },

    /// Any other row-source failure.
    #[error("row source failed: {0}")]
    Source(String),
}

/// A slice of rows plus the total row count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowPage {
    /// Rows in source order.
    pub rows: Vec<CatalogRow>,
    /// Total rows available in the source.
    pub total: usize,
}

/// External tabular data consumed by the catalog.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Returns up to `limit` rows starting at `offset`.
    async fn rows(&self, offset: usize, limit: usize) -> Result<RowPage, CatalogError>;
}

fn slice_rows(rows: &[CatalogRow], offset: usize, limit: usize) -> RowPage {
    RowPage {
        rows: rows.iter().skip(offset).take(limit).cloned().collect(),
        total: rows.len(),
    }
}

/// In-memory rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryRowSource {
    rows: Vec<CatalogRow>,
}

impl MemoryRowSource {
    /// Wraps prepared rows.
    #[must_use]
    pub fn new(rows: Vec<CatalogRow>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl RowSource for MemoryRowSource {
    async fn rows(&self, offset: usize, limit: usize) -> Result<RowPage, CatalogError> {
        Ok(slice_rows(&self.rows, offset, limit))
    }
}

/// Rows read from a JSON array of objects, re-read on every request.
///
/// Scalar values become strings; `null`, arrays and objects are skipped.
#[derive(Debug, Clone)]
pub struct JsonFileRowSource {
    path: PathBuf,
}

impl JsonFileRowSource {
    /// Reads rows from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self, bytes: &[u8]) -> Result<Vec<CatalogRow>, CatalogError> {
        let objects: Vec<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_slice(bytes).map_err(|error| CatalogError::Parse {
                path: self.path.clone(),
                message: error.to_string(),
            })?;
        Ok(objects
            .into_iter()
            .map(|object| {
                object
                    .into_iter()
                    .filter_map(|(key, value)| match value {
                        serde_json::Value::String(text) => Some((key, text)),
                        serde_json::Value::Number(number) => Some((key, number.to_string())),
                        serde_json::Value::Bool(flag) => Some((key, flag.to_string())),
                        _ => None,
                    })
                    .collect()
            })
            .collect())
    }
}

#[async_trait]
impl RowSource for JsonFileRowSource {
    async fn rows(&self, offset: usize, limit: usize) -> Result<RowPage, CatalogError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| CatalogError::Io {
                path: self.path.clone(),
                source,
            })?;
        let rows = self.parse(&bytes)?;
        Ok(slice_rows(&rows, offset, limit))
    }
}

/// Pagination block of a catalog response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// 1-based page number.
    pub page: usize,
    /// Page size.
    pub limit: usize,
    /// Total rows in the source.
    pub total: usize,
    /// Number of pages at this page size.
    pub total_pages: usize,
    /// Whether a later page exists.
    pub has_next_page: bool,
}

impl Pagination {
    fn new(page: usize, limit: usize, total: usize) -> Self {
        Self {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit),
            has_next_page: page.saturating_mul(limit) < total,
        }
    }
}

/// Successful catalog response body.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogPage {
    /// Always true.
    pub success: bool,
    /// Rows with the image field replaced by a resolved reference.
    pub data: Vec<CatalogRow>,
    /// Paging information.
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<String>,
    limit: Option<String>,
}

/// Parses a positive integer, falling back to `default` for anything else.
fn positive_or(value: Option<&str>, default: usize) -> usize {
    value
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

/// Resolves image links for pages of catalog rows.
pub struct CatalogAssembler {
    source: Arc<dyn RowSource>,
    service: Arc<ImageLinkService>,
    photo_field: String,
}

impl CatalogAssembler {
    /// Creates an assembler reading the image link from [`DEFAULT_PHOTO_FIELD`].
    #[must_use]
    pub fn new(source: Arc<dyn RowSource>, service: Arc<ImageLinkService>) -> Self {
        Self {
            source,
            service,
            photo_field: DEFAULT_PHOTO_FIELD.to_string(),
        }
    }

    /// Reads the raw image link from `field` instead.
    #[must_use]
    pub fn with_photo_field(mut self, field: impl Into<String>) -> Self {
        self.photo_field = field.into();
        self
    }

    /// Assembles one page. `page` is 1-based; `limit` is clamped to `1..=100`.
    ///
    /// # Errors
    ///
    /// Returns the row source's error; image resolution itself never fails.
    #[instrument(skip(self))]
    pub async fn page(&self, page: usize, limit: usize) -> Result<CatalogPage, CatalogError> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);
        let offset = (page - 1).saturating_mul(limit);

        let RowPage { rows, total } = self.source.rows(offset, limit).await?;
        debug!(rows = rows.len(), total, "Row page loaded");

        let data = join_all(rows.into_iter().map(|row| self.assemble_row(row))).await;
        Ok(CatalogPage {
            success: true,
            data,
            pagination: Pagination::new(page, limit, total),
        })
    }

    async fn assemble_row(&self, mut row: CatalogRow) -> CatalogRow {
        let raw = row.remove(&self.photo_field).unwrap_or_default();
        let photo = self.service.resolve_image_reference(&raw).await;
        row.insert(DEFAULT_PHOTO_FIELD.to_string(), photo);
        row
    }

    /// Route for `GET /api/containers`.
    pub fn routes(self: Arc<Self>) -> Router {
        Router::new()
            .route("/api/containers", get(containers_handler))
            .with_state(self)
    }
}

impl std::fmt::Debug for CatalogAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogAssembler")
            .field("photo_field", &self.photo_field)
            .finish_non_exhaustive()
    }
}

async fn containers_handler(
    State(catalog): State<Arc<CatalogAssembler>>,
    Query(query): Query<PageQuery>,
) -> Response {
    let page = positive_or(query.page.as_deref(), 1);
    let limit = positive_or(query.limit.as_deref(), DEFAULT_PAGE_LIMIT);
    match catalog.page(page, limit).await {
        Ok(body) => Json(body).into_response(),
        Err(err) => {
            error!(error = %err, "Catalog assembly failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "success": false, "error": err.to_string() })),
            )
                .into_response()
        }
    }
}
