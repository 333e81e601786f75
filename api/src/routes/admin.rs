//! Operator endpoints (/admin/*)

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::Operator;
use super::requests::ListRequestsQuery;
use crate::AppState;
use crate::error::CoreError;
use crate::models::{FileRef, FulfillmentRequest, PlanUpdate, QuotaSummary, RequestStatus};
use crate::services::completion::DeliveredAsset;
use crate::services::error::LogErr;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/quota/{account_id}", post(adjust_quota))
        .route("/admin/quota/{account_id}/reset", post(reset_quota))
        .route("/admin/requests", get(list_requests))
        .route("/admin/requests/{id}/status", post(set_status))
        .route("/admin/requests/{id}/complete", post(complete_request))
        .route("/admin/requests/{id}/complete/upload", post(complete_with_upload))
}

// ============================================================================
// Quota
// ============================================================================

/// POST /admin/quota/{account_id} - Assign or change a plan
async fn adjust_quota(
    State(state): State<Arc<AppState>>,
    Operator(operator_id): Operator,
    Path(account_id): Path<i64>,
    Json(update): Json<PlanUpdate>,
) -> Result<Json<QuotaSummary>, CoreError> {
    tracing::info!(operator_id, account_id, plan_id = %update.plan_id, "plan adjustment");
    let record = state.ledger.adjust(account_id, &update).await?;
    Ok(Json(record.into()))
}

/// POST /admin/quota/{account_id}/reset - Zero the used count
async fn reset_quota(
    State(state): State<Arc<AppState>>,
    Operator(operator_id): Operator,
    Path(account_id): Path<i64>,
) -> Result<Json<QuotaSummary>, CoreError> {
    tracing::info!(operator_id, account_id, "quota reset");
    let record = state.ledger.reset(account_id).await?;
    Ok(Json(record.into()))
}

// ============================================================================
// Requests
// ============================================================================

/// GET /admin/requests - Every account, optional status/account filter
async fn list_requests(
    State(state): State<Arc<AppState>>,
    _operator: Operator,
    Query(query): Query<ListRequestsQuery>,
) -> Result<Json<Vec<FulfillmentRequest>>, CoreError> {
    let filter = query.into_filter(None);
    Ok(Json(state.lifecycle.list(&filter).await?))
}

#[derive(Deserialize)]
struct SetStatusBody {
    status: RequestStatus,
    #[serde(default)]
    notes: Option<String>,
}

async fn set_status(
    State(state): State<Arc<AppState>>,
    Operator(operator_id): Operator,
    Path(request_id): Path<i64>,
    Json(body): Json<SetStatusBody>,
) -> Result<Json<FulfillmentRequest>, CoreError> {
    let request = state
        .lifecycle
        .set_status(operator_id, request_id, body.status, body.notes)
        .await?;
    Ok(Json(request))
}

#[derive(Deserialize)]
struct CompleteBody {
    files: Vec<FileRef>,
}

/// POST /admin/requests/{id}/complete - Complete with already-uploaded files
async fn complete_request(
    State(state): State<Arc<AppState>>,
    Operator(operator_id): Operator,
    Path(request_id): Path<i64>,
    Json(body): Json<CompleteBody>,
) -> Result<Json<FulfillmentRequest>, CoreError> {
    let request = state
        .completion
        .complete_with_refs(operator_id, request_id, body.files)
        .await?;
    Ok(Json(request))
}

/// POST /admin/requests/{id}/complete/upload - Multipart delivery
/// Every file part is uploaded before the request is completed.
async fn complete_with_upload(
    State(state): State<Arc<AppState>>,
    Operator(operator_id): Operator,
    Path(request_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<FulfillmentRequest>, CoreError> {
    let mut assets = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .log_400("Multipart field error")?
    {
        let Some(original_name) = field.file_name().map(str::to_string) else {
            // plain form fields carry nothing to deliver
            continue;
        };
        let mime_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let data = field.bytes().await.log_400("Failed to read file part")?;
        assets.push(DeliveredAsset {
            original_name,
            mime_type,
            data,
        });
    }

    if assets.is_empty() {
        return Err(CoreError::BadRequest(
            "Attach at least one file to complete the request.".into(),
        ));
    }

    let request = state
        .completion
        .deliver(operator_id, request_id, assets)
        .await?;
    Ok(Json(request))
}
