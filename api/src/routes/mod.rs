pub mod admin;
pub mod auth;
pub mod content;
pub mod files;
pub mod quota;
pub mod requests;
pub mod uploads;
pub mod videos;

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::AppState;

/// Build all routes for the API
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .merge(admin::routes())
        .merge(auth::routes())
        .merge(content::routes())
        .merge(files::routes())
        .merge(quota::routes())
        .merge(requests::routes())
        .merge(uploads::routes())
        .merge(videos::routes())
}

async fn health() -> &'static str {
    "ok"
}
