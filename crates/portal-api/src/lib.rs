pub mod auth;
pub mod chat;
pub mod convert;
pub mod documents;
pub mod error;
pub mod files;
pub mod form;
pub mod middleware;
pub mod notifications;
pub mod uploads;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};

use crate::auth::AppState;
use crate::error::ApiError;

/// Request bodies above this are refused before the upload validator runs.
/// Kept well above the largest upload ceiling so oversized files still get
/// the validator's "File too large" message.
pub const MAX_REQUEST_BODY: usize = 32 * 1024 * 1024;

/// Builds the full route table. Layers that only matter for a real listener
/// (CORS, tracing) are added by the server binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/chat", post(chat::chat_action).get(files::serve_attachment))
        .route(
            "/notifications",
            get(notifications::check).post(notifications::update),
        )
        .route("/uploads/{purpose}", post(documents::upload_document))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Runs a blocking database closure off the async runtime.
pub(crate) async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&portal_db::Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            tracing::error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::Storage)
}
