//! # promptscope-server
//!
//! HTTP surface for promptscope. Routes are thin: they authenticate the
//! caller, translate query strings and bodies into core filter and
//! payload types, call the database layer, and map the result into a
//! response body. All access decisions live in promptscope-core.

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

pub mod auth;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod views;

pub use state::AppState;

use routes::{
    dashboards, events, feedback, health, projects, prompts, responses, sessions, tags, users,
    widgets,
};

/// Build the application router.
///
/// `/health` and the user directory are open; everything else sits
/// behind bearer token authentication.
pub fn build_router(state: AppState) -> Router {
    let open_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/users", get(users::list_users))
        .route("/users/:id", get(users::get_user));

    let authed_routes = Router::new()
        // Projects
        .route(
            "/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/projects/:id",
            get(projects::get_project)
                .put(projects::update_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/projects/:id/add_member", post(projects::add_member))
        .route("/projects/:id/remove_member", post(projects::remove_member))
        .route("/projects/:id/stats", get(projects::project_stats))
        // Sessions
        .route(
            "/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/sessions/:id",
            get(sessions::get_session)
                .put(sessions::update_session)
                .patch(sessions::update_session)
                .delete(sessions::delete_session),
        )
        .route("/sessions/:id/end_session", post(sessions::end_session))
        .route("/sessions/:id/events", get(sessions::session_events))
        // Events
        .route(
            "/events",
            get(events::list_events).post(events::create_event),
        )
        .route(
            "/events/:id",
            get(events::get_event)
                .put(events::update_event)
                .patch(events::update_event)
                .delete(events::delete_event),
        )
        // Prompts and responses are created through events
        .route("/prompts", get(prompts::list_prompts))
        .route("/prompts/:id", get(prompts::get_prompt))
        .route("/responses", get(responses::list_responses))
        .route("/responses/:id", get(responses::get_response))
        // Feedback
        .route(
            "/feedback",
            get(feedback::list_feedback).post(feedback::create_feedback),
        )
        .route(
            "/feedback/:id",
            get(feedback::get_feedback)
                .put(feedback::update_feedback)
                .patch(feedback::update_feedback)
                .delete(feedback::delete_feedback),
        )
        // Tags
        .route("/tags", get(tags::list_tags).post(tags::create_tag))
        .route(
            "/tags/:id",
            get(tags::get_tag)
                .put(tags::update_tag)
                .patch(tags::update_tag)
                .delete(tags::delete_tag),
        )
        // Dashboards
        .route(
            "/dashboards",
            get(dashboards::list_dashboards).post(dashboards::create_dashboard),
        )
        .route(
            "/dashboards/:id",
            get(dashboards::get_dashboard)
                .put(dashboards::update_dashboard)
                .patch(dashboards::update_dashboard)
                .delete(dashboards::delete_dashboard),
        )
        // Widgets
        .route(
            "/widgets",
            get(widgets::list_widgets).post(widgets::create_widget),
        )
        .route(
            "/widgets/:id",
            get(widgets::get_widget)
                .put(widgets::update_widget)
                .patch(widgets::update_widget)
                .delete(widgets::delete_widget),
        )
        .route_layer(from_fn_with_state(state.clone(), auth::require_auth));

    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .merge(open_routes)
        .merge(authed_routes)
        .layer(from_fn(middleware::logging::log_request))
        .layer(TimeoutLayer::new(timeout))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
