//! Serves objects written by the local storage backend (/files/*)

use axum::{
    Router,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
};
use std::sync::Arc;

use crate::AppState;
use crate::error::CoreError;
use crate::services::error::LogErr;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/files/{*path}", get(serve_file))
}

fn not_found(path: &str) -> CoreError {
    CoreError::NotFound(format!("file {path}"))
}

async fn serve_file(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    if path.contains("..") || path.contains('\0') {
        return Err(CoreError::Forbidden("invalid path".into()));
    }

    let root = state
        .local_storage_path
        .as_ref()
        .ok_or_else(|| not_found(&path))?;

    // the resolved path must stay inside the storage root
    let canonical = root
        .join(&path)
        .canonicalize()
        .map_err(|_| not_found(&path))?;
    let root_canonical = root
        .canonicalize()
        .log_500("Failed to canonicalize storage path")?;
    if !canonical.starts_with(&root_canonical) {
        return Err(CoreError::Forbidden("invalid path".into()));
    }

    let bytes = tokio::fs::read(&canonical)
        .await
        .map_err(|_| not_found(&path))?;

    let content_type = match canonical.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    };

    // object paths are never reused
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        bytes,
    ))
}
