pub mod export;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/export", post(export::handle_export))
        .route("/api/v1/layout/preview", post(export::handle_preview))
        .route("/api/v1/exports/:filename", get(export::handle_download))
        .with_state(state)
}
