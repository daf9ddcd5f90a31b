//! HTTP resource endpoint.
//!
//! Serves the collections of a modelsync store over the verbs models emit:
//! `POST /{collection}`, `GET|PUT|PATCH|DELETE /{collection}/{id}` and
//! `GET /{collection}` for listing.

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use modelsync_fs::{Store, StoreError};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Server state shared across handlers.
struct AppState {
    store_path: PathBuf,
}

impl AppState {
    fn store(&self) -> Result<Store, AppError> {
        Ok(Store::open(&self.store_path)?)
    }
}

/// Build the router for the store at `store_path`.
pub fn router(store_path: &std::path::Path) -> Router {
    let state = Arc::new(AppState {
        store_path: store_path.to_path_buf(),
    });

    Router::new()
        .route("/health", get(health))
        .route("/{collection}", get(list).post(create))
        .route(
            "/{collection}/{id}",
            get(read).put(update).patch(merge).delete(remove),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the resource server.
///
/// # Errors
/// Returns error if binding fails or server encounters an error.
pub async fn serve(store_path: &std::path::Path, host: &str, port: u16) -> Result<()> {
    // Fail fast on a missing store rather than on the first request.
    Store::open(store_path)?;

    let app = router(store_path);
    let addr = format!("{host}:{port}");
    info!(address = %addr, "Starting resource server");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Response types ---

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Handlers ---

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn list(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
) -> Result<Json<Vec<Value>>, AppError> {
    Ok(Json(state.store()?.list(&collection)?))
}

async fn create(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let doc = state.store()?.create(&collection, body)?;
    Ok((StatusCode::CREATED, Json(doc)))
}

async fn read(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.store()?.read(&collection, &id)?))
}

async fn update(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.store()?.update(&collection, &id, body)?))
}

async fn merge(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
    Json(patch): Json<Value>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.store()?.merge(&collection, &id, &patch)?))
}

async fn remove(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.store()?.delete(&collection, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Error handling ---

struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self
            .0
            .downcast_ref::<StoreError>()
            .and_then(|e| StatusCode::from_u16(e.status()).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
