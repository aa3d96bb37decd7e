//! User directory endpoints
//!
//! Read-only and unauthenticated, so that identities can be looked up
//! before a token exists. Tokens themselves never appear in the output.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::views::UserView;

#[derive(Debug, Deserialize)]
pub struct UserListParams {
    pub search: Option<String>,
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<UserListParams>,
) -> ApiResult<Json<Vec<UserView>>> {
    let users = state.db.list_users(params.search.as_deref())?;
    Ok(Json(users.into_iter().map(UserView::from).collect()))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<UserView>> {
    let user = state
        .db
        .get_user(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("user not found: {id}")))?;
    Ok(Json(user.into()))
}
