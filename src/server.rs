//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/statistics` | Totals and per-site state |
//! | `GET`  | `/api/startIndexing` | Start a full indexing run |
//! | `GET`  | `/api/stopIndexing` | Stop the current run |
//! | `POST` | `/api/indexPage?url=` | Re-index one page in the background |
//! | `GET`  | `/api/search?query=&site=&offset=&limit=` | Ranked search |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Every body carries `result`. Failures add a human-readable `error`:
//!
//! ```json
//! { "result": false, "error": "Empty search query" }
//! ```
//!
//! Caller mistakes are `400`; storage failures are `500`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::app::App;
use crate::config::Config;
use crate::indexing::IndexingError;
use crate::search::{SearchError, SearchResults};
use crate::stats::{self, Statistics};

/// Starts the HTTP server on `[server].bind` and runs until the process ends.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = App::open(config).await?;

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "HTTP server listening");
    axum::serve(listener, router(app)).await?;

    Ok(())
}

pub fn router(app: App) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/statistics", get(handle_statistics))
        .route("/api/startIndexing", get(handle_start_indexing))
        .route("/api/stopIndexing", get(handle_stop_indexing))
        .route("/api/indexPage", post(handle_index_page))
        .route("/api/search", get(handle_search))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(app)
}

// ============ Responses ============

#[derive(Serialize)]
struct Ack {
    result: bool,
}

const OK: Ack = Ack { result: true };

#[derive(Serialize)]
struct ErrorBody {
    result: bool,
    error: String,
}

#[derive(Serialize)]
struct StatisticsBody {
    result: bool,
    statistics: Statistics,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody {
    result: bool,
    #[serde(flatten)]
    results: SearchResults,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            result: false,
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn internal(err: &anyhow::Error) -> AppError {
    error!(error = %format!("{:#}", err), "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: format!("{:#}", err),
    }
}

impl From<IndexingError> for AppError {
    fn from(err: IndexingError) -> Self {
        match &err {
            IndexingError::Storage(e) => internal(e),
            _ => bad_request(err.to_string()),
        }
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match &err {
            SearchError::Storage(e) => internal(e),
            _ => bad_request(err.to_string()),
        }
    }
}

// ============ Handlers ============

async fn handle_statistics(State(app): State<App>) -> Result<Json<StatisticsBody>, AppError> {
    let statistics = stats::statistics(
        &app.config,
        app.store.as_ref(),
        app.indexing.is_indexing_now(),
    )
    .await
    .map_err(|e| internal(&e))?;

    Ok(Json(StatisticsBody {
        result: true,
        statistics,
    }))
}

async fn handle_start_indexing(State(app): State<App>) -> Result<Json<Ack>, AppError> {
    app.indexing.start_indexing().await?;
    Ok(Json(OK))
}

async fn handle_stop_indexing(State(app): State<App>) -> Result<Json<Ack>, AppError> {
    app.indexing.stop_indexing().await?;
    Ok(Json(OK))
}

#[derive(Deserialize)]
struct IndexPageParams {
    url: Option<String>,
}

async fn handle_index_page(
    State(app): State<App>,
    Query(params): Query<IndexPageParams>,
) -> Result<Json<Ack>, AppError> {
    let url = params
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| bad_request("Path incorrect"))?;
    app.indexing.index_page(&url)?;
    Ok(Json(OK))
}

#[derive(Deserialize)]
struct SearchParams {
    query: Option<String>,
    site: Option<String>,
    offset: Option<usize>,
    limit: Option<usize>,
}

async fn handle_search(
    State(app): State<App>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchBody>, AppError> {
    let query = params.query.unwrap_or_default();
    let offset = params.offset.unwrap_or(0);
    let limit = params.limit.unwrap_or(app.config.search.default_limit);

    let results = app
        .search
        .search(&query, params.site.as_deref(), offset, limit)
        .await?;

    Ok(Json(SearchBody {
        result: true,
        results,
    }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
