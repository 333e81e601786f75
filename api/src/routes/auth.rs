//! Bearer-token extractors and the session endpoint

use axum::{
    Json, Router,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;
use crate::error::CoreError;
use crate::services::lifecycle::Viewer;
use crate::services::session::{self, Role, Session};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/me", get(get_me))
}

// ============================================================================
// Extractors
// ============================================================================

/// Extractor that validates the Bearer access token
pub struct AuthUser(pub Session);

impl AuthUser {
    pub fn account_id(&self) -> i64 {
        self.0.account_id
    }

    pub fn viewer(&self) -> Viewer {
        Viewer {
            account_id: self.0.account_id,
            is_operator: self.0.role == Role::Operator,
        }
    }
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = CoreError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| CoreError::Unauthorized("missing bearer token".into()))?;

        let session = session::validate_access_token(token.trim(), &state.jwt_secret)
            .map_err(|e| CoreError::Unauthorized(e.to_string()))?;

        Ok(AuthUser(session))
    }
}

/// Operator-only extractor; a valid user token without the role gets 403
pub struct Operator(pub i64);

impl FromRequestParts<Arc<AppState>> for Operator {
    type Rejection = CoreError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(session) = AuthUser::from_request_parts(parts, state).await?;
        if session.role != Role::Operator {
            return Err(CoreError::Forbidden("operator access required".into()));
        }
        Ok(Operator(session.account_id))
    }
}

#[derive(Serialize)]
struct MeResponse {
    account_id: i64,
    role: Role,
}

/// GET /auth/me - Who the token belongs to
async fn get_me(AuthUser(session): AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        account_id: session.account_id,
        role: session.role,
    })
}
