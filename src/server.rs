//! Related-documents HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/results?post_content_id=<id>&nresults=<n>` | Related ids, nearest first (`nresults` defaults to 6) |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! A successful lookup answers with a bare JSON array of ids:
//!
//! ```json
//! ["1042", "977", "1310"]
//! ```
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "count must be between 1 and 100" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `dependency_unavailable` (503).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the API is called from
//! browser widgets on the blog's pages.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use related_index_core::query::{QueryError, QueryService};

/// Result count used when `nresults` is absent.
pub const DEFAULT_RESULTS: usize = 6;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<QueryService>,
}

/// Build the router with CORS applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/results", get(handle_results))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Bind `bind_addr` and serve until the process is terminated.
pub async fn run_server(bind_addr: &str, service: Arc<QueryService>) -> anyhow::Result<()> {
    let app = router(AppState { service });

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(bind = %bind_addr, "related-documents API listening");
    axum::serve(listener, app).await?;

    Ok(())
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

/// Internal error type that converts into an Axum HTTP response.
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn dependency_unavailable(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "dependency_unavailable".to_string(),
        message: message.into(),
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::InvalidInput(_) => bad_request(err.to_string()),
            QueryError::UnknownDocument(_) => not_found(err.to_string()),
            // Internal details stay in the log.
            QueryError::Dependency(_) => dependency_unavailable("a backing service is unavailable"),
        }
    }
}

// ============ GET /health ============

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

// ============ GET /api/results ============

/// Handler for `GET /api/results`.
///
/// Parameters are parsed by hand so malformed values produce the JSON
/// error body instead of axum's plain-text rejection.
async fn handle_results(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<String>>, AppError> {
    let service = &state.service;
    let id = params
        .get("post_content_id")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| service.reject("post_content_id is required"))?;

    let count = match params.get("nresults") {
        None => DEFAULT_RESULTS,
        Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
            service.reject(format!("nresults must be a positive integer, got {:?}", raw))
        })?,
    };

    let ids = service.find_related(id, count).await?;
    Ok(Json(ids))
}
