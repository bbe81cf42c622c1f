use axum::{routing::get, Router};

use crate::modules::migration::controller;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/migration/export", get(controller::export_messages))
        .route("/health", get(controller::health))
}
