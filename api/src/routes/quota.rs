use axum::{Json, Router, extract::State, routing::get};
use std::sync::Arc;

use super::auth::AuthUser;
use crate::AppState;
use crate::error::CoreError;
use crate::models::QuotaSummary;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/quota", get(get_quota))
}

/// GET /quota - Current credits; never consumes
async fn get_quota(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<QuotaSummary>, CoreError> {
    let record = state.ledger.check(auth.account_id()).await?;
    Ok(Json(record.into()))
}
