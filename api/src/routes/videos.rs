//! Saved videos and transcript acquisition (/videos/*)

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};

use super::auth::AuthUser;
use crate::AppState;
use crate::error::CoreError;
use crate::models::{Video, VideoInput};
use crate::services::transcript::AcquiredTranscript;
use crate::store::video_not_found;

pub fn routes() -> Router<Arc<AppState>> {
    // Transcript extraction is slow and upstream-metered: 1 per 2s, burst 5
    let rate_limit_config = GovernorConfigBuilder::default()
        .per_second(2)
        .burst_size(5)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("Failed to build rate limit config");

    let transcript_routes = Router::new()
        .route("/videos/{id}/transcript", post(acquire_transcript))
        .layer(GovernorLayer {
            config: rate_limit_config.into(),
        });

    Router::new()
        .route("/videos", get(list_videos).post(save_video))
        .route("/videos/{id}", get(get_video).delete(delete_video))
        .merge(transcript_routes)
}

/// POST /videos - Save (or refresh) a video
async fn save_video(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(input): Json<VideoInput>,
) -> Result<(StatusCode, Json<Video>), CoreError> {
    if input.id.trim().is_empty() {
        return Err(CoreError::BadRequest("A video id is required.".into()));
    }
    let video = Video::from_input(auth.account_id(), input, Utc::now());
    let saved = state.store.upsert_video(&video).await?;
    tracing::info!(account_id = auth.account_id(), video_id = %saved.id, "video saved");
    Ok((StatusCode::CREATED, Json(saved)))
}

/// GET /videos - Saved videos, newest first
async fn list_videos(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<Video>>, CoreError> {
    Ok(Json(state.store.list_videos(auth.account_id()).await?))
}

async fn get_video(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(video_id): Path<String>,
) -> Result<Json<Video>, CoreError> {
    state
        .store
        .get_video(auth.account_id(), &video_id)
        .await?
        .map(Json)
        .ok_or_else(|| video_not_found(&video_id))
}

async fn delete_video(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(video_id): Path<String>,
) -> Result<StatusCode, CoreError> {
    if state.store.delete_video(auth.account_id(), &video_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(video_not_found(&video_id))
    }
}

#[derive(Deserialize)]
struct AcquireQuery {
    /// Manual retry: fetch again even if a transcript is stored
    #[serde(default)]
    force: bool,
}

/// POST /videos/{id}/transcript - Run the strategy chain for a saved video
async fn acquire_transcript(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(video_id): Path<String>,
    Query(query): Query<AcquireQuery>,
) -> Result<Json<AcquiredTranscript>, CoreError> {
    let acquired = state
        .acquirer
        .acquire(auth.account_id(), &video_id, query.force)
        .await?;
    Ok(Json(acquired))
}
