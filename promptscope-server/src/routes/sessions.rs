//! Session endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::extract::ValidJson;
use crate::state::AppState;
use crate::views::{EventView, SessionView};
use promptscope_core::db::SessionFilter;
use promptscope_core::types::{NewSession, SessionPatch};

#[derive(Debug, Deserialize)]
pub struct SessionListParams {
    #[serde(rename = "project")]
    pub project_id: Option<String>,
    pub user_id: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(params): Query<SessionListParams>,
) -> ApiResult<Json<Vec<SessionView>>> {
    let filter = SessionFilter {
        project_id: params.project_id,
        user_id: params.user_id,
        search: params.search,
        ordering: params.ordering,
    };
    let sessions = state.db.list_sessions(&user.id, &filter)?;
    Ok(Json(sessions.into_iter().map(SessionView::from).collect()))
}

pub async fn create_session(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    ValidJson(new): ValidJson<NewSession>,
) -> ApiResult<(StatusCode, Json<SessionView>)> {
    let session = state.db.create_session(&user.id, &new)?;
    Ok((StatusCode::CREATED, Json(session.into())))
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionView>> {
    let session = state.db.get_session(&user.id, &id)?;
    Ok(Json(session.into()))
}

pub async fn update_session(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidJson(patch): ValidJson<SessionPatch>,
) -> ApiResult<Json<SessionView>> {
    let session = state.db.update_session(&user.id, &id, &patch)?;
    Ok(Json(session.into()))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db.delete_session(&user.id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn end_session(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionView>> {
    let session = state.db.end_session(&user.id, &id)?;
    Ok(Json(session.into()))
}

pub async fn session_events(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<EventView>>> {
    let events = state.db.session_events(&user.id, &id)?;
    Ok(Json(events.into_iter().map(EventView::from).collect()))
}
