//! Event endpoints
//!
//! Creation accepts an optional nested prompt, response, and feedback
//! in one payload; they are persisted atomically with the event.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::extract::ValidJson;
use crate::state::AppState;
use crate::views::EventView;
use promptscope_core::db::EventFilter;
use promptscope_core::types::{EventPatch, EventType, NewEvent};

#[derive(Debug, Deserialize)]
pub struct EventListParams {
    #[serde(rename = "project")]
    pub project_id: Option<String>,
    #[serde(rename = "session")]
    pub session_id: Option<String>,
    pub event_type: Option<EventType>,
    pub ordering: Option<String>,
}

pub async fn list_events(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(params): Query<EventListParams>,
) -> ApiResult<Json<Vec<EventView>>> {
    let filter = EventFilter {
        project_id: params.project_id,
        session_id: params.session_id,
        event_type: params.event_type,
        ordering: params.ordering,
    };
    let events = state.db.list_events(&user.id, &filter)?;
    Ok(Json(events.into_iter().map(EventView::from).collect()))
}

pub async fn create_event(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    ValidJson(new): ValidJson<NewEvent>,
) -> ApiResult<(StatusCode, Json<EventView>)> {
    let event = state.db.create_event(&user.id, &new)?;
    Ok((StatusCode::CREATED, Json(event.into())))
}

pub async fn get_event(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<EventView>> {
    let event = state.db.get_event(&user.id, &id)?;
    Ok(Json(event.into()))
}

pub async fn update_event(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidJson(patch): ValidJson<EventPatch>,
) -> ApiResult<Json<EventView>> {
    let event = state.db.update_event(&user.id, &id, &patch)?;
    Ok(Json(event.into()))
}

pub async fn delete_event(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db.delete_event(&user.id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
