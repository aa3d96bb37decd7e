//! Project endpoints, including membership management and stats

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::ValidJson;
use crate::state::AppState;
use crate::views::ProjectView;
use promptscope_core::analytics;
use promptscope_core::db::ProjectFilter;
use promptscope_core::types::{NewProject, ProjectPatch};

#[derive(Debug, Deserialize)]
pub struct ProjectListParams {
    pub search: Option<String>,
    pub ordering: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MemberPayload {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    pub days: Option<i64>,
}

pub async fn list_projects(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(params): Query<ProjectListParams>,
) -> ApiResult<Json<Vec<ProjectView>>> {
    let filter = ProjectFilter {
        search: params.search,
        ordering: params.ordering,
    };
    let projects = state.db.list_projects(&user.id, &filter)?;
    Ok(Json(projects.into_iter().map(ProjectView::from).collect()))
}

pub async fn create_project(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    ValidJson(new): ValidJson<NewProject>,
) -> ApiResult<(StatusCode, Json<ProjectView>)> {
    let project = state.db.create_project(&user.id, &new)?;
    Ok((StatusCode::CREATED, Json(project.into())))
}

pub async fn get_project(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProjectView>> {
    let project = state.db.get_project(&user.id, &id)?;
    Ok(Json(project.into()))
}

pub async fn update_project(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidJson(patch): ValidJson<ProjectPatch>,
) -> ApiResult<Json<ProjectView>> {
    let project = state.db.update_project(&user.id, &id, &patch)?;
    Ok(Json(project.into()))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db.delete_project(&user.id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_member(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidJson(payload): ValidJson<MemberPayload>,
) -> ApiResult<Json<serde_json::Value>> {
    state.db.add_member(&user.id, &id, &payload.user_id)?;
    Ok(Json(json!({"status": "user added"})))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidJson(payload): ValidJson<MemberPayload>,
) -> ApiResult<Json<serde_json::Value>> {
    state.db.remove_member(&user.id, &id, &payload.user_id)?;
    Ok(Json(json!({"status": "user removed"})))
}

pub async fn project_stats(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
    Query(params): Query<StatsParams>,
) -> ApiResult<Json<analytics::ProjectStats>> {
    let days = match params.days {
        None => 30,
        Some(d) if (0..=u32::MAX as i64).contains(&d) => d as u32,
        Some(d) => {
            return Err(ApiError::Validation {
                field: "days".to_string(),
                message: format!("must be a non-negative number of days, got {d}"),
            })
        }
    };
    let stats = analytics::project_stats(&state.db, &user.id, &id, days)?;
    Ok(Json(stats))
}
