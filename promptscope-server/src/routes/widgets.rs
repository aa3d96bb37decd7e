//! Widget endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::extract::ValidJson;
use crate::state::AppState;
use crate::views::WidgetView;
use promptscope_core::db::WidgetFilter;
use promptscope_core::types::{NewWidget, WidgetPatch};

#[derive(Debug, Deserialize)]
pub struct WidgetListParams {
    #[serde(rename = "dashboard")]
    pub dashboard_id: Option<String>,
}

pub async fn list_widgets(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(params): Query<WidgetListParams>,
) -> ApiResult<Json<Vec<WidgetView>>> {
    let filter = WidgetFilter {
        dashboard_id: params.dashboard_id,
    };
    let widgets = state.db.list_widgets(&user.id, &filter)?;
    Ok(Json(widgets.into_iter().map(WidgetView::from).collect()))
}

pub async fn create_widget(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    ValidJson(new): ValidJson<NewWidget>,
) -> ApiResult<(StatusCode, Json<WidgetView>)> {
    let widget = state.db.create_widget(&user.id, &new)?;
    Ok((StatusCode::CREATED, Json(widget.into())))
}

pub async fn get_widget(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<WidgetView>> {
    let widget = state.db.get_widget(&user.id, &id)?;
    Ok(Json(widget.into()))
}

pub async fn update_widget(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidJson(patch): ValidJson<WidgetPatch>,
) -> ApiResult<Json<WidgetView>> {
    let widget = state.db.update_widget(&user.id, &id, &patch)?;
    Ok(Json(widget.into()))
}

pub async fn delete_widget(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db.delete_widget(&user.id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
