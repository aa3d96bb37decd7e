//! Response endpoints (read-only; responses are created through events)

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;
use crate::views::ResponseView;
use promptscope_core::db::ResponseFilter;

#[derive(Debug, Deserialize)]
pub struct ResponseListParams {
    #[serde(rename = "project")]
    pub project_id: Option<String>,
    pub model_name: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}

pub async fn list_responses(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(params): Query<ResponseListParams>,
) -> ApiResult<Json<Vec<ResponseView>>> {
    let filter = ResponseFilter {
        project_id: params.project_id,
        model_name: params.model_name,
        search: params.search,
        ordering: params.ordering,
    };
    let responses = state.db.list_responses(&user.id, &filter)?;
    Ok(Json(responses.into_iter().map(ResponseView::from).collect()))
}

pub async fn get_response(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<ResponseView>> {
    let response = state.db.get_response(&user.id, &id)?;
    Ok(Json(response.into()))
}
