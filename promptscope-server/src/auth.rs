//! Bearer token authentication
//!
//! Every request under the authenticated router must carry
//! `Authorization: Bearer <api_token>`. The resolved user is attached
//! as a request extension for handlers to consume.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use promptscope_core::User;

/// The authenticated caller, resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthenticated)?;

    let user = state
        .db
        .find_user_by_token(token)
        .map_err(|e| ApiError::Internal(e.into()))?
        .ok_or(ApiError::Unauthenticated)?;

    req.extensions_mut().insert(AuthUser(user));
    Ok(next.run(req).await)
}
