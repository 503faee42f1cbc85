//! HTTP search service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/find` | Search the default source |
//! | `POST` | `/find/{source}` | Search a named source |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Request bodies are JSON [`SearchRequest`]s; `items` may be omitted to
//! search the configured inventory. Responses are the JSON form of
//! [`SearchableResponse`](graphfind_core::SearchableResponse):
//!
//! ```json
//! { "Pole": [1, 2], "PoleUnit": [20] }
//! ```
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "configuration", "message": "table 'Pole' has no field 'NOPE'" } }
//! ```
//!
//! Error codes: `configuration` (400), `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use graphfind_core::{SearchError, SearchRequest};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::search;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
}

/// Builds the service router. Exposed separately from [`run_server`] so it
/// can be driven in-process.
pub fn router(config: Arc<Config>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/find", post(handle_find))
        .route("/find/{source}", post(handle_find_in))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { config })
}

/// Binds to `[server].bind` and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(Arc::new(config.clone()));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "server listening");
    println!("graphfind listening on http://{}", bind_addr);
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

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

/// Maps a search failure to a status code by its [`SearchError`] cause.
fn classify_error(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<SearchError>() {
        Some(cause @ SearchError::UnknownSource(_)) => {
            app_error(StatusCode::NOT_FOUND, "not_found", cause.to_string())
        }
        Some(cause) if cause.is_configuration() => {
            app_error(StatusCode::BAD_REQUEST, "configuration", cause.to_string())
        }
        _ => {
            error!(error = %err, "search failed");
            app_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                format!("{:#}", err),
            )
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

// ============ POST /find ============

async fn handle_find(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Response, AppError> {
    let response = search::find(&state.config, &request)
        .await
        .map_err(classify_error)?;
    Ok(Json(response).into_response())
}

async fn handle_find_in(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Json(request): Json<SearchRequest>,
) -> Result<Response, AppError> {
    let response = search::find_in(&state.config, &request, &source)
        .await
        .map_err(classify_error)?;
    Ok(Json(response).into_response())
}
