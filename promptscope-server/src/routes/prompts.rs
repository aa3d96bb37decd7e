//! Prompt endpoints (read-only; prompts are created through events)

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;
use crate::views::PromptView;
use promptscope_core::db::PromptFilter;

#[derive(Debug, Deserialize)]
pub struct PromptListParams {
    #[serde(rename = "project")]
    pub project_id: Option<String>,
    pub model_name: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}

pub async fn list_prompts(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(params): Query<PromptListParams>,
) -> ApiResult<Json<Vec<PromptView>>> {
    let filter = PromptFilter {
        project_id: params.project_id,
        model_name: params.model_name,
        search: params.search,
        ordering: params.ordering,
    };
    let prompts = state.db.list_prompts(&user.id, &filter)?;
    Ok(Json(prompts.into_iter().map(PromptView::from).collect()))
}

pub async fn get_prompt(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<PromptView>> {
    let prompt = state.db.get_prompt(&user.id, &id)?;
    Ok(Json(prompt.into()))
}
