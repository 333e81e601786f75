//! File uploads (/uploads/*)
//!
//! Small files go up in one request. Large ones are sent as chunks under a
//! client-chosen file id and assembled by `finalize`.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    routing::{post, put},
};
use std::sync::Arc;

use super::auth::AuthUser;
use crate::AppState;
use crate::error::CoreError;
use crate::models::FileRef;
use crate::services::upload::{ChunkAck, ChunkMeta};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/uploads", post(upload_single))
        .route("/uploads/{file_id}/chunks/{index}", put(upload_chunk))
        .route("/uploads/{file_id}/finalize", post(finalize_upload))
}

fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string()
}

fn original_name(headers: &HeaderMap) -> String {
    headers
        .get("x-original-name")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("upload")
        .to_string()
}

/// POST /uploads - Single-shot upload; body is the file
async fn upload_single(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<FileRef>), CoreError> {
    let file = state
        .uploads
        .upload_single(
            auth.account_id(),
            &original_name(&headers),
            &content_type(&headers),
            body,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(file)))
}

/// PUT /uploads/{file_id}/chunks/{index}
/// Headers: X-Total-Chunks, X-Original-Name, Content-Type
async fn upload_chunk(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((file_id, index)): Path<(String, u32)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ChunkAck>, CoreError> {
    let total_chunks: u32 = headers
        .get("x-total-chunks")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| CoreError::BadRequest("X-Total-Chunks header is required".into()))?;

    let meta = ChunkMeta {
        total_chunks,
        original_name: original_name(&headers),
        mime_type: content_type(&headers),
    };
    let ack = state
        .uploads
        .upload_chunk(auth.account_id(), &file_id, index, meta, body)
        .await?;
    Ok(Json(ack))
}

/// POST /uploads/{file_id}/finalize - Assemble and store; 422 lists missing chunks
async fn finalize_upload(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(file_id): Path<String>,
) -> Result<Json<FileRef>, CoreError> {
    Ok(Json(state.uploads.finalize(auth.account_id(), &file_id).await?))
}
