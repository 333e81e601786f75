//! Fulfillment requests, owner side (/requests/*)

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::AuthUser;
use crate::AppState;
use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::error::CoreError;
use crate::models::{
    ContentSnapshot, FulfillmentRequest, QuotaSummary, RequestPayload, RequestStatus, ViewVersion,
};
use crate::store::RequestFilter;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/requests", get(list_requests).post(submit_request))
        .route("/requests/{id}", get(get_request).put(resubmit_request))
        .route("/requests/{id}/view", get(view_request))
}

#[derive(Deserialize)]
pub(super) struct ListRequestsQuery {
    pub status: Option<RequestStatus>,
    pub account_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListRequestsQuery {
    /// Filter for this query. `scope` pins the account for non-operators.
    pub(super) fn into_filter(self, scope: Option<i64>) -> RequestFilter {
        RequestFilter {
            account_id: scope.or(self.account_id),
            status: self.status,
            limit: self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            offset: self.offset.unwrap_or(0).max(0),
        }
    }
}

#[derive(Serialize)]
struct SubmitResponse {
    request: FulfillmentRequest,
    quota: QuotaSummary,
}

/// POST /requests - Submit a request; costs one credit
async fn submit_request(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<RequestPayload>,
) -> Result<(StatusCode, Json<SubmitResponse>), CoreError> {
    let (request, quota) = state.lifecycle.submit(auth.account_id(), payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            request,
            quota: quota.into(),
        }),
    ))
}

/// GET /requests - The caller's own requests
async fn list_requests(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListRequestsQuery>,
) -> Result<Json<Vec<FulfillmentRequest>>, CoreError> {
    let filter = query.into_filter(Some(auth.account_id()));
    Ok(Json(state.lifecycle.list(&filter).await?))
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(request_id): Path<i64>,
) -> Result<Json<FulfillmentRequest>, CoreError> {
    Ok(Json(state.lifecycle.get(auth.viewer(), request_id).await?))
}

/// PUT /requests/{id} - Owner resubmission of a pending or rejected request
async fn resubmit_request(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(request_id): Path<i64>,
    Json(payload): Json<RequestPayload>,
) -> Result<Json<FulfillmentRequest>, CoreError> {
    let request = state
        .lifecycle
        .resubmit(auth.account_id(), request_id, payload)
        .await?;
    Ok(Json(request))
}

#[derive(Deserialize)]
struct ViewQuery {
    #[serde(default = "current_version")]
    version: ViewVersion,
}

fn current_version() -> ViewVersion {
    ViewVersion::Current
}

/// GET /requests/{id}/view?version=current|original
async fn view_request(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(request_id): Path<i64>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<ContentSnapshot>, CoreError> {
    let snapshot = state
        .lifecycle
        .view(auth.viewer(), request_id, query.version)
        .await?;
    Ok(Json(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_scope_overrides_requested_account() {
        let query = ListRequestsQuery {
            status: None,
            account_id: Some(99),
            limit: Some(1_000),
            offset: Some(-3),
        };
        let filter = query.into_filter(Some(7));
        assert_eq!(filter.account_id, Some(7));
        assert_eq!(filter.limit, MAX_PAGE_SIZE);
        assert_eq!(filter.offset, 0);
    }
}
