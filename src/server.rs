//! HTTP server.
//!
//! Exposes the catalog facade as a JSON API. Handlers are thin: they parse
//! the request, call one facade operation and serialize its payload.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Catalog status, versions and counts |
//! | `GET`  | `/facets` | Organism and project labels with counts |
//! | `GET`  | `/studies` | Query via query string |
//! | `POST` | `/studies/search` | Query via JSON body |
//! | `GET`  | `/studies/{id}` | Merged study detail |
//! | `POST` | `/reload` | Rebuild from sources and swap the snapshot |
//! | `GET`  | `/spell-check` | Spelling suggestions for `q` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid page_size: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `reload_conflict`
//! (409), `source_unavailable` (503), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use catalog_core::payload::{CatalogStatus, FacetsResponse, QueryResponse, ReloadSummary, StudyDetail};
use catalog_core::spell::SpellCheckReport;
use catalog_core::{Catalog, CatalogError, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::ingest::open_catalog;

/// Starts the HTTP server.
///
/// Loads the catalog, binds to `[server].bind` and serves until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let cfg = config.clone();
    let catalog = tokio::task::spawn_blocking(move || open_catalog(&cfg)).await??;
    let app = router(Arc::new(catalog));

    println!("Catalog server listening on http://{}", bind_addr);
    info!(bind = %bind_addr, "server started");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// All routes over a shared catalog.
pub fn router(catalog: Arc<Catalog>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/facets", get(handle_facets))
        .route("/studies", get(handle_studies))
        .route("/studies/search", post(handle_search))
        .route("/studies/{id}", get(handle_get))
        .route("/reload", post(handle_reload))
        .route("/spell-check", get(handle_spell_check))
        .layer(cors)
        .with_state(catalog)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        let status = match &err {
            CatalogError::Validation { .. } => StatusCode::BAD_REQUEST,
            CatalogError::NotFound { .. } => StatusCode::NOT_FOUND,
            CatalogError::ReloadConflict => StatusCode::CONFLICT,
            CatalogError::SourceRead { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        let code = match &err {
            CatalogError::SourceRead { .. } => "source_unavailable",
            other => other.code(),
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health, GET /facets ============

async fn handle_health(State(catalog): State<Arc<Catalog>>) -> Json<CatalogStatus> {
    Json(catalog.status())
}

async fn handle_facets(State(catalog): State<Arc<Catalog>>) -> Json<FacetsResponse> {
    Json(catalog.facets())
}

// ============ GET /studies, POST /studies/search ============

/// Build a filter from `?organism=a&organism=b&q=...` style pairs.
///
/// List parameters may repeat; scalar parameters take their last value.
fn filter_from_pairs(pairs: Vec<(String, String)>) -> Result<QueryFilter, AppError> {
    let mut filter = QueryFilter::default();
    for (key, value) in pairs {
        match key.as_str() {
            "organism" => filter.organism.push(value),
            "project_type" => filter.project_type.push(value),
            "keywords" | "keyword" => filter.keywords.push(value),
            "q" | "query" => filter.q = value,
            "page" => {
                filter.page = value
                    .trim()
                    .parse()
                    .map_err(|_| bad_request(format!("invalid page: not an integer: {}", value)))?
            }
            "page_size" => {
                filter.page_size = value.trim().parse().map_err(|_| {
                    bad_request(format!("invalid page_size: not an integer: {}", value))
                })?
            }
            "compact" => {
                filter.compact = matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
            }
            _ => {}
        }
    }
    Ok(filter)
}

async fn handle_studies(
    State(catalog): State<Arc<Catalog>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<QueryResponse>, AppError> {
    let filter = filter_from_pairs(pairs)?;
    Ok(Json(catalog.query(&filter)?))
}

async fn handle_search(
    State(catalog): State<Arc<Catalog>>,
    body: Result<Json<QueryFilter>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(filter) = body.map_err(|e| bad_request(format!("invalid filter: {}", e.body_text())))?;
    Ok(Json(catalog.query(&filter)?))
}

// ============ GET /studies/{id} ============

async fn handle_get(
    State(catalog): State<Arc<Catalog>>,
    Path(id): Path<String>,
) -> Result<Json<StudyDetail>, AppError> {
    Ok(Json(catalog.get_by_id(&id)?))
}

// ============ POST /reload ============

async fn handle_reload(State(catalog): State<Arc<Catalog>>) -> Result<Json<ReloadSummary>, AppError> {
    let worker = catalog.clone();
    let result = tokio::task::spawn_blocking(move || worker.reload())
        .await
        .map_err(|e| internal(format!("reload task failed: {}", e)))?;

    match result {
        Ok(summary) => Ok(Json(summary)),
        Err(err @ CatalogError::SourceRead { .. }) => {
            let version = catalog.snapshot().version;
            warn!(error = %err, version, "reload failed");
            let mut app_err = AppError::from(err);
            app_err.message = format!("{}; still serving snapshot {}", app_err.message, version);
            Err(app_err)
        }
        Err(err) => Err(err.into()),
    }
}

// ============ GET /spell-check ============

#[derive(Deserialize)]
struct SpellCheckParams {
    #[serde(default, alias = "query")]
    q: String,
}

async fn handle_spell_check(
    State(catalog): State<Arc<Catalog>>,
    Query(params): Query<SpellCheckParams>,
) -> Result<Json<SpellCheckReport>, AppError> {
    if params.q.trim().is_empty() {
        return Err(bad_request("invalid q: must not be empty"));
    }
    Ok(Json(catalog.spell_check(&params.q)?))
}
