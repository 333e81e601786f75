//! Content generation and history (/content/*)

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};

use super::auth::AuthUser;
use crate::AppState;
use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::error::CoreError;
use crate::models::GeneratedContent;
use crate::services::content::{GenerateRequest, GenerationOutcome};

pub fn routes() -> Router<Arc<AppState>> {
    // Each call is a model round-trip: 1 per second, burst 5
    let rate_limit_config = GovernorConfigBuilder::default()
        .per_second(1)
        .burst_size(5)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("Failed to build rate limit config");

    let generate_routes = Router::new()
        .route("/content/generate", post(generate))
        .layer(GovernorLayer {
            config: rate_limit_config.into(),
        });

    Router::new()
        .route("/content", get(list_content))
        .merge(generate_routes)
}

/// POST /content/generate - Generate from a saved video's transcript
async fn generate(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(request): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<GenerationOutcome>), CoreError> {
    let outcome = state
        .content
        .generate_for_video(auth.account_id(), request)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

#[derive(Deserialize)]
struct ListContentQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Serialize)]
struct ContentPage {
    items: Vec<GeneratedContent>,
    total: i64,
    limit: i64,
    offset: i64,
}

/// GET /content - Generated content history, newest first
async fn list_content(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListContentQuery>,
) -> Result<Json<ContentPage>, CoreError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let (items, total) = state
        .content
        .history(auth.account_id(), limit, offset)
        .await?;
    Ok(Json(ContentPage {
        items,
        total,
        limit,
        offset,
    }))
}
