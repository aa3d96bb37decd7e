//! Dashboard endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::extract::ValidJson;
use crate::state::AppState;
use crate::views::DashboardView;
use promptscope_core::db::DashboardFilter;
use promptscope_core::types::{DashboardPatch, NewDashboard};

#[derive(Debug, Deserialize)]
pub struct DashboardListParams {
    #[serde(rename = "project")]
    pub project_id: Option<String>,
}

pub async fn list_dashboards(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(params): Query<DashboardListParams>,
) -> ApiResult<Json<Vec<DashboardView>>> {
    let filter = DashboardFilter {
        project_id: params.project_id,
    };
    let dashboards = state.db.list_dashboards(&user.id, &filter)?;
    Ok(Json(
        dashboards.into_iter().map(DashboardView::from).collect(),
    ))
}

pub async fn create_dashboard(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    ValidJson(new): ValidJson<NewDashboard>,
) -> ApiResult<(StatusCode, Json<DashboardView>)> {
    let dashboard = state.db.create_dashboard(&user.id, &new)?;
    Ok((StatusCode::CREATED, Json(dashboard.into())))
}

pub async fn get_dashboard(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<DashboardView>> {
    let dashboard = state.db.get_dashboard(&user.id, &id)?;
    Ok(Json(dashboard.into()))
}

pub async fn update_dashboard(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidJson(patch): ValidJson<DashboardPatch>,
) -> ApiResult<Json<DashboardView>> {
    let dashboard = state.db.update_dashboard(&user.id, &id, &patch)?;
    Ok(Json(dashboard.into()))
}

pub async fn delete_dashboard(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db.delete_dashboard(&user.id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
