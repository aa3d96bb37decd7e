//! Core domain types for promptscope
//!
//! These types mirror the canonical data model: a [`Project`] is the
//! root of all partitioning, and every other entity resolves to exactly
//! one project, directly or through its owning [`Event`] or
//! [`Dashboard`].
//!
//! Free-form documents (`metadata`, `layout`, `query`, `position`) are
//! carried as [`serde_json::Value`] and stored/returned verbatim. The
//! core never interprets their contents.
//!
//! Identifiers are UUIDv4 strings. Timestamps are UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

// ============================================
// User (identity)
// ============================================

/// An authenticated identity.
///
/// Rows are resolved by the server's bearer-token middleware; the core
/// treats authentication itself as external.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: String,
    /// Unique login name
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Opaque bearer token; never serialized outward
    #[serde(skip_serializing)]
    pub api_token: String,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a user. The api_token is generated server-side.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

// ============================================
// Project
// ============================================

/// Top-level tenant owning all other entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Identity with exclusive write rights
    pub owner_id: String,
}

/// A project with its embedded owner, members, and tags.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectDetail {
    pub project: Project,
    pub owner: User,
    pub members: Vec<User>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

// ============================================
// Session
// ============================================

/// A bounded interaction window for an external user within a project.
///
/// Created at session start, mutated once to set `end_time`, never
/// otherwise updated in the normal lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(rename = "project")]
    pub project_id: String,
    /// External user identifier, opaque to this system
    pub user_id: Option<String>,
    /// Globally unique key supplied by the instrumented application
    pub session_key: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

impl Session {
    /// Seconds between start and end, or `None` while the session is open.
    pub fn duration(&self) -> Option<f64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 1000.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSession {
    #[serde(rename = "project")]
    pub project_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub session_key: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionPatch {
    pub user_id: Option<String>,
    pub end_time: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

// ============================================
// Event
// ============================================

/// Classification tag for an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    UserPrompt,
    AiResponse,
    UserFeedback,
    UserAction,
    Error,
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::UserPrompt => "user_prompt",
            EventType::AiResponse => "ai_response",
            EventType::UserFeedback => "user_feedback",
            EventType::UserAction => "user_action",
            EventType::Error => "error",
            EventType::Other => "other",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user_prompt" => Ok(EventType::UserPrompt),
            "ai_response" => Ok(EventType::AiResponse),
            "user_feedback" => Ok(EventType::UserFeedback),
            "user_action" => Ok(EventType::UserAction),
            "error" => Ok(EventType::Error),
            "other" => Ok(EventType::Other),
            _ => Err(format!("unknown event type: {}", s)),
        }
    }
}

/// A timestamped occurrence within a project, optionally tied to a
/// session. Anchors at most one each of [`UserPrompt`], [`AiResponse`]
/// and [`Feedback`]; the attachment is immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "project")]
    pub project_id: String,
    #[serde(rename = "session")]
    pub session_id: Option<String>,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// An event with its sparse 1:1 sub-records.
#[derive(Debug, Clone, Serialize)]
pub struct EventDetail {
    pub event: Event,
    pub user_prompt: Option<UserPrompt>,
    pub ai_response: Option<AiResponse>,
    pub feedback: Option<Feedback>,
}

/// Combined-creation payload: the event row plus up to three dependent
/// rows, applied atomically.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    #[serde(rename = "project")]
    pub project_id: String,
    #[serde(default, rename = "session")]
    pub session_id: Option<String>,
    pub event_type: EventType,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub user_prompt: Option<NewUserPrompt>,
    #[serde(default)]
    pub ai_response: Option<NewAiResponse>,
    #[serde(default)]
    pub feedback: Option<NewFeedback>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPatch {
    #[serde(default, rename = "session")]
    pub session_id: Option<String>,
    pub event_type: Option<EventType>,
    pub timestamp: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

// ============================================
// Prompt / Response / Feedback
// ============================================

/// A user prompt sent to an AI model, anchored to exactly one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPrompt {
    pub id: String,
    #[serde(rename = "event")]
    pub event_id: String,
    pub prompt_text: String,
    pub model_name: String,
    pub tokens: i64,
}

/// Nested creation payload inside a [`NewEvent`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewUserPrompt {
    pub prompt_text: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub tokens: i64,
}

/// An AI model response, anchored to exactly one event and optionally
/// linked to the prompt it answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiResponse {
    pub id: String,
    #[serde(rename = "event")]
    pub event_id: String,
    #[serde(rename = "prompt")]
    pub prompt_id: Option<String>,
    pub response_text: String,
    pub model_name: String,
    pub tokens: i64,
    /// Response time in seconds
    pub latency: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAiResponse {
    pub response_text: String,
    pub model_name: String,
    #[serde(default)]
    pub tokens: i64,
    #[serde(default)]
    pub latency: f64,
}

/// User feedback on an AI response, anchored to exactly one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: String,
    #[serde(rename = "event")]
    pub event_id: String,
    #[serde(rename = "response")]
    pub response_id: Option<String>,
    /// Integer in [1,5] when present
    pub rating: Option<i64>,
    pub comment: String,
    pub tags: Vec<String>,
}

/// Nested creation payload inside a [`NewEvent`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewFeedback {
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Standalone creation payload for the feedback collection.
#[derive(Debug, Clone, Deserialize)]
pub struct NewFeedbackRow {
    #[serde(rename = "event")]
    pub event_id: String,
    #[serde(default, rename = "response")]
    pub response_id: Option<String>,
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackPatch {
    pub rating: Option<i64>,
    pub comment: Option<String>,
    pub tags: Option<Vec<String>>,
}

// ============================================
// Tag
// ============================================

/// Default tag color (hex)
pub const DEFAULT_TAG_COLOR: &str = "#3498db";

/// A categorization label, unique by name within its project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    #[serde(rename = "project")]
    pub project_id: String,
    pub name: String,
    /// Hex color code
    pub color: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTag {
    #[serde(rename = "project")]
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagPatch {
    pub name: Option<String>,
    pub color: Option<String>,
}

// ============================================
// Dashboard / Widget
// ============================================

/// A visualization dashboard owning a set of widgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: String,
    #[serde(rename = "project")]
    pub project_id: String,
    pub name: String,
    pub description: String,
    /// Opaque layout document, stored verbatim
    pub layout: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A dashboard with its embedded widgets.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardDetail {
    pub dashboard: Dashboard,
    pub widgets: Vec<Widget>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDashboard {
    #[serde(rename = "project")]
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object")]
    pub layout: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub layout: Option<serde_json::Value>,
}

/// Visualization type of a [`Widget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetType {
    LineChart,
    BarChart,
    PieChart,
    Table,
    Counter,
    Heatmap,
    Text,
}

impl WidgetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetType::LineChart => "line_chart",
            WidgetType::BarChart => "bar_chart",
            WidgetType::PieChart => "pie_chart",
            WidgetType::Table => "table",
            WidgetType::Counter => "counter",
            WidgetType::Heatmap => "heatmap",
            WidgetType::Text => "text",
        }
    }
}

impl std::str::FromStr for WidgetType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "line_chart" => Ok(WidgetType::LineChart),
            "bar_chart" => Ok(WidgetType::BarChart),
            "pie_chart" => Ok(WidgetType::PieChart),
            "table" => Ok(WidgetType::Table),
            "counter" => Ok(WidgetType::Counter),
            "heatmap" => Ok(WidgetType::Heatmap),
            "text" => Ok(WidgetType::Text),
            _ => Err(format!("unknown widget type: {}", s)),
        }
    }
}

/// A dashboard widget. `query` and `position` are opaque documents
/// interpreted only by the rendering frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Widget {
    pub id: String,
    #[serde(rename = "dashboard")]
    pub dashboard_id: String,
    pub title: String,
    pub widget_type: WidgetType,
    pub query: serde_json::Value,
    pub position: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWidget {
    #[serde(rename = "dashboard")]
    pub dashboard_id: String,
    pub title: String,
    pub widget_type: WidgetType,
    #[serde(default = "empty_object")]
    pub query: serde_json::Value,
    #[serde(default = "empty_object")]
    pub position: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WidgetPatch {
    pub title: Option<String>,
    pub widget_type: Option<WidgetType>,
    pub query: Option<serde_json::Value>,
    pub position: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn event_type_round_trips_through_str() {
        for et in [
            EventType::UserPrompt,
            EventType::AiResponse,
            EventType::UserFeedback,
            EventType::UserAction,
            EventType::Error,
            EventType::Other,
        ] {
            assert_eq!(et.as_str().parse::<EventType>().unwrap(), et);
        }
        assert!("prompt".parse::<EventType>().is_err());
    }

    #[test]
    fn widget_type_rejects_unknown() {
        assert_eq!("heatmap".parse::<WidgetType>().unwrap(), WidgetType::Heatmap);
        assert!("gauge".parse::<WidgetType>().is_err());
    }

    #[test]
    fn session_duration_is_undefined_until_ended() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut session = Session {
            id: "s1".into(),
            project_id: "p1".into(),
            user_id: None,
            session_key: "key-1".into(),
            start_time: start,
            end_time: None,
            metadata: serde_json::json!({}),
        };
        assert!(session.duration().is_none());

        session.end_time = Some(start + chrono::Duration::seconds(90));
        assert_eq!(session.duration(), Some(90.0));
    }
}
