//! Feedback endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::extract::ValidJson;
use crate::state::AppState;
use crate::views::FeedbackView;
use promptscope_core::db::FeedbackFilter;
use promptscope_core::types::{FeedbackPatch, NewFeedbackRow};

#[derive(Debug, Deserialize)]
pub struct FeedbackListParams {
    #[serde(rename = "project")]
    pub project_id: Option<String>,
    pub rating: Option<i64>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}

pub async fn list_feedback(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(params): Query<FeedbackListParams>,
) -> ApiResult<Json<Vec<FeedbackView>>> {
    let filter = FeedbackFilter {
        project_id: params.project_id,
        rating: params.rating,
        search: params.search,
        ordering: params.ordering,
    };
    let feedback = state.db.list_feedback(&user.id, &filter)?;
    Ok(Json(feedback.into_iter().map(FeedbackView::from).collect()))
}

pub async fn create_feedback(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    ValidJson(new): ValidJson<NewFeedbackRow>,
) -> ApiResult<(StatusCode, Json<FeedbackView>)> {
    let feedback = state.db.create_feedback(&user.id, &new)?;
    Ok((StatusCode::CREATED, Json(feedback.into())))
}

pub async fn get_feedback(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<FeedbackView>> {
    let feedback = state.db.get_feedback(&user.id, &id)?;
    Ok(Json(feedback.into()))
}

pub async fn update_feedback(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidJson(patch): ValidJson<FeedbackPatch>,
) -> ApiResult<Json<FeedbackView>> {
    let feedback = state.db.update_feedback(&user.id, &id, &patch)?;
    Ok(Json(feedback.into()))
}

pub async fn delete_feedback(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db.delete_feedback(&user.id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
