//! Response bodies
//!
//! Flattened representations of the core records. Detail structs are
//! flattened so a project carries its owner, members and tags inline,
//! an event carries its attached prompt, response and feedback, and a
//! session carries its computed duration. The api_token never leaves
//! the server through these.

use chrono::{DateTime, Utc};
use promptscope_core::types::*;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<User> for UserView {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TagView {
    pub id: String,
    pub project: String,
    pub name: String,
    pub color: String,
}

impl From<Tag> for TagView {
    fn from(t: Tag) -> Self {
        Self {
            id: t.id,
            project: t.project_id,
            name: t.name,
            color: t.color,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub owner: UserView,
    pub members: Vec<UserView>,
    pub tags: Vec<TagView>,
}

impl From<ProjectDetail> for ProjectView {
    fn from(d: ProjectDetail) -> Self {
        Self {
            id: d.project.id,
            name: d.project.name,
            description: d.project.description,
            created_at: d.project.created_at,
            updated_at: d.project.updated_at,
            owner: d.owner.into(),
            members: d.members.into_iter().map(UserView::from).collect(),
            tags: d.tags.into_iter().map(TagView::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: String,
    pub project: String,
    pub user_id: Option<String>,
    pub session_key: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    /// Seconds between start and end, absent while the session is open
    pub duration: Option<f64>,
}

impl From<Session> for SessionView {
    fn from(s: Session) -> Self {
        let duration = s.duration();
        Self {
            id: s.id,
            project: s.project_id,
            user_id: s.user_id,
            session_key: s.session_key,
            start_time: s.start_time,
            end_time: s.end_time,
            metadata: s.metadata,
            duration,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PromptView {
    pub id: String,
    pub event: String,
    pub prompt_text: String,
    pub model_name: String,
    pub tokens: i64,
}

impl From<UserPrompt> for PromptView {
    fn from(p: UserPrompt) -> Self {
        Self {
            id: p.id,
            event: p.event_id,
            prompt_text: p.prompt_text,
            model_name: p.model_name,
            tokens: p.tokens,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResponseView {
    pub id: String,
    pub event: String,
    pub prompt: Option<String>,
    pub response_text: String,
    pub model_name: String,
    pub tokens: i64,
    pub latency: f64,
}

impl From<AiResponse> for ResponseView {
    fn from(r: AiResponse) -> Self {
        Self {
            id: r.id,
            event: r.event_id,
            prompt: r.prompt_id,
            response_text: r.response_text,
            model_name: r.model_name,
            tokens: r.tokens,
            latency: r.latency,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeedbackView {
    pub id: String,
    pub event: String,
    pub response: Option<String>,
    pub rating: Option<i64>,
    pub comment: String,
    pub tags: Vec<String>,
}

impl From<Feedback> for FeedbackView {
    fn from(f: Feedback) -> Self {
        Self {
            id: f.id,
            event: f.event_id,
            response: f.response_id,
            rating: f.rating,
            comment: f.comment,
            tags: f.tags,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventView {
    pub id: String,
    pub project: String,
    pub session: Option<String>,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
    pub user_prompt: Option<PromptView>,
    pub ai_response: Option<ResponseView>,
    pub feedback: Option<FeedbackView>,
}

impl From<EventDetail> for EventView {
    fn from(d: EventDetail) -> Self {
        Self {
            id: d.event.id,
            project: d.event.project_id,
            session: d.event.session_id,
            event_type: d.event.event_type,
            timestamp: d.event.timestamp,
            metadata: d.event.metadata,
            user_prompt: d.user_prompt.map(PromptView::from),
            ai_response: d.ai_response.map(ResponseView::from),
            feedback: d.feedback.map(FeedbackView::from),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WidgetView {
    pub id: String,
    pub dashboard: String,
    pub title: String,
    pub widget_type: WidgetType,
    pub query: serde_json::Value,
    pub position: serde_json::Value,
}

impl From<Widget> for WidgetView {
    fn from(w: Widget) -> Self {
        Self {
            id: w.id,
            dashboard: w.dashboard_id,
            title: w.title,
            widget_type: w.widget_type,
            query: w.query,
            position: w.position,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardView {
    pub id: String,
    pub project: String,
    pub name: String,
    pub description: String,
    pub layout: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub widgets: Vec<WidgetView>,
}

impl From<DashboardDetail> for DashboardView {
    fn from(d: DashboardDetail) -> Self {
        Self {
            id: d.dashboard.id,
            project: d.dashboard.project_id,
            name: d.dashboard.name,
            description: d.dashboard.description,
            layout: d.dashboard.layout,
            created_at: d.dashboard.created_at,
            updated_at: d.dashboard.updated_at,
            widgets: d.widgets.into_iter().map(WidgetView::from).collect(),
        }
    }
}
