//! Tag endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::extract::ValidJson;
use crate::state::AppState;
use crate::views::TagView;
use promptscope_core::db::TagFilter;
use promptscope_core::types::{NewTag, TagPatch};

#[derive(Debug, Deserialize)]
pub struct TagListParams {
    #[serde(rename = "project")]
    pub project_id: Option<String>,
}

pub async fn list_tags(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(params): Query<TagListParams>,
) -> ApiResult<Json<Vec<TagView>>> {
    let filter = TagFilter {
        project_id: params.project_id,
    };
    let tags = state.db.list_tags(&user.id, &filter)?;
    Ok(Json(tags.into_iter().map(TagView::from).collect()))
}

pub async fn create_tag(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    ValidJson(new): ValidJson<NewTag>,
) -> ApiResult<(StatusCode, Json<TagView>)> {
    let tag = state.db.create_tag(&user.id, &new)?;
    Ok((StatusCode::CREATED, Json(tag.into())))
}

pub async fn get_tag(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<TagView>> {
    let tag = state.db.get_tag(&user.id, &id)?;
    Ok(Json(tag.into()))
}

pub async fn update_tag(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidJson(patch): ValidJson<TagPatch>,
) -> ApiResult<Json<TagView>> {
    let tag = state.db.update_tag(&user.id, &id, &patch)?;
    Ok(Json(tag.into()))
}

pub async fn delete_tag(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db.delete_tag(&user.id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
