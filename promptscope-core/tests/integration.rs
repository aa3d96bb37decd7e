//! Integration tests for the promptscope storage layer
//!
//! These exercise the actor-scoped repository end to end against an
//! in-memory database: visibility, ownership, nested event creation,
//! cascades, and windowed stats.

use promptscope_core::analytics;
use promptscope_core::db::{EventFilter, ProjectFilter, SessionFilter};
use promptscope_core::{Database, Error};
use promptscope_core::types::*;

fn test_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.migrate().unwrap();
    db
}

fn make_user(db: &Database, username: &str) -> User {
    db.create_user(&NewUser {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        first_name: String::new(),
        last_name: String::new(),
    })
    .unwrap()
}

fn make_project(db: &Database, owner: &User, name: &str) -> ProjectDetail {
    db.create_project(
        &owner.id,
        &NewProject {
            name: name.to_string(),
            description: String::new(),
        },
    )
    .unwrap()
}

fn make_session(db: &Database, actor: &User, project_id: &str, key: &str) -> Session {
    db.create_session(
        &actor.id,
        &NewSession {
            project_id: project_id.to_string(),
            user_id: Some("end-user-1".into()),
            session_key: key.to_string(),
            start_time: None,
            metadata: None,
        },
    )
    .unwrap()
}

#[test]
fn test_data_survives_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("promptscope.db");

    let alice_id = {
        let db = Database::open(&path).unwrap();
        db.migrate().unwrap();
        let alice = make_user(&db, "alice");
        make_project(&db, &alice, "persistent");
        alice.id
    };

    let db = Database::open(&path).unwrap();
    db.migrate().unwrap();
    let projects = db
        .list_projects(&alice_id, &ProjectFilter::default())
        .unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].project.name, "persistent");
}

// ============================================
// Visibility Tests
// ============================================

#[test]
fn test_member_sees_project_nonmember_does_not() {
    let db = test_db();
    let alice = make_user(&db, "alice");
    let bob = make_user(&db, "bob");
    let carol = make_user(&db, "carol");
    let project = make_project(&db, &alice, "research");

    db.add_member(&alice.id, &project.project.id, &bob.id)
        .unwrap();

    // Bob, a member, can list and fetch it
    let visible = db.list_projects(&bob.id, &ProjectFilter::default()).unwrap();
    assert_eq!(visible.len(), 1);
    db.get_project(&bob.id, &project.project.id).unwrap();

    // Carol cannot, and cannot tell it exists
    let visible = db
        .list_projects(&carol.id, &ProjectFilter::default())
        .unwrap();
    assert!(visible.is_empty());
    let err = db.get_project(&carol.id, &project.project.id).unwrap_err();
    assert!(matches!(err, Error::NotFound { what: "project", .. }));
}

#[test]
fn test_owner_appears_once_when_also_member() {
    let db = test_db();
    let alice = make_user(&db, "alice");
    let project = make_project(&db, &alice, "research");

    // Owner adding themselves as member must not duplicate listings
    db.add_member(&alice.id, &project.project.id, &alice.id)
        .unwrap();
    let visible = db
        .list_projects(&alice.id, &ProjectFilter::default())
        .unwrap();
    assert_eq!(visible.len(), 1);
}

#[test]
fn test_member_reads_but_cannot_write() {
    let db = test_db();
    let alice = make_user(&db, "alice");
    let bob = make_user(&db, "bob");
    let project = make_project(&db, &alice, "research");
    db.add_member(&alice.id, &project.project.id, &bob.id)
        .unwrap();
    let session = make_session(&db, &alice, &project.project.id, "s-1");

    // Bob can read the session
    db.get_session(&bob.id, &session.id).unwrap();

    // But cannot end it, mutate the project, or manage membership
    assert!(matches!(
        db.end_session(&bob.id, &session.id).unwrap_err(),
        Error::Forbidden
    ));
    assert!(matches!(
        db.update_project(
            &bob.id,
            &project.project.id,
            &ProjectPatch {
                name: Some("hijacked".into()),
                description: None,
            },
        )
        .unwrap_err(),
        Error::Forbidden
    ));
    assert!(matches!(
        db.add_member(&bob.id, &project.project.id, &bob.id)
            .unwrap_err(),
        Error::Forbidden
    ));

    // Nor create sessions in a project he does not own
    let err = db
        .create_session(
            &bob.id,
            &NewSession {
                project_id: project.project.id.clone(),
                user_id: None,
                session_key: "s-2".into(),
                start_time: None,
                metadata: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden));
}

// ============================================
// Event Bundle Tests
// ============================================

#[test]
fn test_event_bundle_links_children() {
    let db = test_db();
    let alice = make_user(&db, "alice");
    let project = make_project(&db, &alice, "research");
    let session = make_session(&db, &alice, &project.project.id, "s-1");

    let detail = db
        .create_event(
            &alice.id,
            &NewEvent {
                project_id: project.project.id.clone(),
                session_id: Some(session.id.clone()),
                event_type: EventType::AiResponse,
                timestamp: None,
                metadata: None,
                user_prompt: Some(NewUserPrompt {
                    prompt_text: "summarize this".into(),
                    model_name: "gpt-4".into(),
                    tokens: 12,
                }),
                ai_response: Some(NewAiResponse {
                    response_text: "done".into(),
                    model_name: "gpt-4".into(),
                    tokens: 40,
                    latency: 0.8,
                }),
                feedback: Some(NewFeedback {
                    rating: Some(5),
                    comment: "great".into(),
                    tags: vec!["helpful".into()],
                }),
            },
        )
        .unwrap();

    let prompt = detail.user_prompt.unwrap();
    let response = detail.ai_response.unwrap();
    let feedback = detail.feedback.unwrap();

    // Bundled in one call, so the links are populated
    assert_eq!(response.prompt_id.as_deref(), Some(prompt.id.as_str()));
    assert_eq!(feedback.response_id.as_deref(), Some(response.id.as_str()));

    // And the round trip through get_event preserves them
    let fetched = db.get_event(&alice.id, &detail.event.id).unwrap();
    assert_eq!(
        fetched.ai_response.unwrap().prompt_id.as_deref(),
        Some(prompt.id.as_str())
    );
}

#[test]
fn test_response_without_prompt_has_no_link() {
    let db = test_db();
    let alice = make_user(&db, "alice");
    let project = make_project(&db, &alice, "research");

    let detail = db
        .create_event(
            &alice.id,
            &NewEvent {
                project_id: project.project.id.clone(),
                session_id: None,
                event_type: EventType::AiResponse,
                timestamp: None,
                metadata: None,
                user_prompt: None,
                ai_response: Some(NewAiResponse {
                    response_text: "unprompted".into(),
                    model_name: "gpt-4".into(),
                    tokens: 5,
                    latency: 0.1,
                }),
                feedback: None,
            },
        )
        .unwrap();

    assert!(detail.user_prompt.is_none());
    assert!(detail.ai_response.unwrap().prompt_id.is_none());
}

#[test]
fn test_negative_tokens_rejected_with_field() {
    let db = test_db();
    let alice = make_user(&db, "alice");
    let project = make_project(&db, &alice, "research");

    let err = db
        .create_event(
            &alice.id,
            &NewEvent {
                project_id: project.project.id.clone(),
                session_id: None,
                event_type: EventType::UserPrompt,
                timestamp: None,
                metadata: None,
                user_prompt: Some(NewUserPrompt {
                    prompt_text: "hi".into(),
                    model_name: "gpt-4".into(),
                    tokens: -1,
                }),
                ai_response: None,
                feedback: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::Validation { field: "tokens", .. }));
}

// ============================================
// Session Tests
// ============================================

#[test]
fn test_end_session_sets_end_time_and_duration() {
    let db = test_db();
    let alice = make_user(&db, "alice");
    let project = make_project(&db, &alice, "research");
    let session = make_session(&db, &alice, &project.project.id, "s-1");

    assert!(session.end_time.is_none());
    assert!(session.duration().is_none());

    let ended = db.end_session(&alice.id, &session.id).unwrap();
    assert!(ended.end_time.is_some());
    assert!(ended.duration().unwrap() >= 0.0);
}

#[test]
fn test_session_events_newest_first() {
    let db = test_db();
    let alice = make_user(&db, "alice");
    let project = make_project(&db, &alice, "research");
    let session = make_session(&db, &alice, &project.project.id, "s-1");

    for minutes in [30, 10, 20] {
        db.create_event(
            &alice.id,
            &NewEvent {
                project_id: project.project.id.clone(),
                session_id: Some(session.id.clone()),
                event_type: EventType::UserAction,
                timestamp: Some(chrono::Utc::now() - chrono::Duration::minutes(minutes)),
                metadata: None,
                user_prompt: None,
                ai_response: None,
                feedback: None,
            },
        )
        .unwrap();
    }

    let events = db.session_events(&alice.id, &session.id).unwrap();
    assert_eq!(events.len(), 3);
    let timestamps: Vec<_> = events.iter().map(|e| e.event.timestamp).collect();
    let mut sorted = timestamps.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(timestamps, sorted);
}

#[test]
fn test_session_filters() {
    let db = test_db();
    let alice = make_user(&db, "alice");
    let p1 = make_project(&db, &alice, "one");
    let p2 = make_project(&db, &alice, "two");
    make_session(&db, &alice, &p1.project.id, "alpha");
    make_session(&db, &alice, &p2.project.id, "beta");

    let filter = SessionFilter {
        project_id: Some(p1.project.id.clone()),
        ..Default::default()
    };
    let sessions = db.list_sessions(&alice.id, &filter).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_key, "alpha");

    let filter = SessionFilter {
        search: Some("bet".into()),
        ..Default::default()
    };
    let sessions = db.list_sessions(&alice.id, &filter).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_key, "beta");
}

// ============================================
// Cascade Tests
// ============================================

#[test]
fn test_project_delete_cascades() {
    let db = test_db();
    let alice = make_user(&db, "alice");
    let project = make_project(&db, &alice, "doomed");
    let session = make_session(&db, &alice, &project.project.id, "s-1");
    let event = db
        .create_event(
            &alice.id,
            &NewEvent {
                project_id: project.project.id.clone(),
                session_id: Some(session.id.clone()),
                event_type: EventType::UserPrompt,
                timestamp: None,
                metadata: None,
                user_prompt: Some(NewUserPrompt {
                    prompt_text: "hi".into(),
                    model_name: "gpt-4".into(),
                    tokens: 1,
                }),
                ai_response: None,
                feedback: None,
            },
        )
        .unwrap();

    db.delete_project(&alice.id, &project.project.id).unwrap();

    assert!(matches!(
        db.get_session(&alice.id, &session.id).unwrap_err(),
        Error::NotFound { .. }
    ));
    assert!(matches!(
        db.get_event(&alice.id, &event.event.id).unwrap_err(),
        Error::NotFound { .. }
    ));
    let prompt_id = event.user_prompt.unwrap().id;
    assert!(matches!(
        db.get_prompt(&alice.id, &prompt_id).unwrap_err(),
        Error::NotFound { .. }
    ));
}

// ============================================
// Conflict Tests
// ============================================

#[test]
fn test_duplicate_tag_name_in_project_conflicts() {
    let db = test_db();
    let alice = make_user(&db, "alice");
    let p1 = make_project(&db, &alice, "one");
    let p2 = make_project(&db, &alice, "two");

    let new = NewTag {
        project_id: p1.project.id.clone(),
        name: "bug".into(),
        color: None,
    };
    let tag = db.create_tag(&alice.id, &new).unwrap();
    assert_eq!(tag.color, DEFAULT_TAG_COLOR);

    let err = db.create_tag(&alice.id, &new).unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    // Same name in a different project is fine
    db.create_tag(
        &alice.id,
        &NewTag {
            project_id: p2.project.id.clone(),
            name: "bug".into(),
            color: Some("#ff0000".into()),
        },
    )
    .unwrap();
}

#[test]
fn test_second_feedback_for_event_conflicts() {
    let db = test_db();
    let alice = make_user(&db, "alice");
    let project = make_project(&db, &alice, "research");
    let event = db
        .create_event(
            &alice.id,
            &NewEvent {
                project_id: project.project.id.clone(),
                session_id: None,
                event_type: EventType::UserFeedback,
                timestamp: None,
                metadata: None,
                user_prompt: None,
                ai_response: None,
                feedback: None,
            },
        )
        .unwrap();

    let new = NewFeedbackRow {
        event_id: event.event.id.clone(),
        response_id: None,
        rating: Some(4),
        comment: String::new(),
        tags: vec![],
    };
    db.create_feedback(&alice.id, &new).unwrap();
    let err = db.create_feedback(&alice.id, &new).unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

// ============================================
// Widget Authority Tests
// ============================================

#[test]
fn test_widget_create_requires_dashboard_project_ownership() {
    let db = test_db();
    let alice = make_user(&db, "alice");
    let bob = make_user(&db, "bob");
    let project = make_project(&db, &alice, "research");
    db.add_member(&alice.id, &project.project.id, &bob.id)
        .unwrap();

    let dashboard = db
        .create_dashboard(
            &alice.id,
            &NewDashboard {
                project_id: project.project.id.clone(),
                name: "overview".into(),
                description: String::new(),
                layout: serde_json::json!({}),
            },
        )
        .unwrap();

    let new = NewWidget {
        dashboard_id: dashboard.dashboard.id.clone(),
        title: "events over time".into(),
        widget_type: WidgetType::LineChart,
        query: serde_json::json!({"metric": "events"}),
        position: serde_json::json!({"x": 0, "y": 0}),
    };

    // Bob sees the dashboard but cannot attach widgets to it
    db.get_dashboard(&bob.id, &dashboard.dashboard.id).unwrap();
    assert!(matches!(
        db.create_widget(&bob.id, &new).unwrap_err(),
        Error::Forbidden
    ));

    let widget = db.create_widget(&alice.id, &new).unwrap();
    let detail = db.get_dashboard(&bob.id, &dashboard.dashboard.id).unwrap();
    assert_eq!(detail.widgets.len(), 1);
    assert_eq!(detail.widgets[0].id, widget.id);
}

// ============================================
// Stats Tests
// ============================================

#[test]
fn test_stats_visible_to_member_hidden_from_stranger() {
    let db = test_db();
    let alice = make_user(&db, "alice");
    let bob = make_user(&db, "bob");
    let carol = make_user(&db, "carol");
    let project = make_project(&db, &alice, "research");
    db.add_member(&alice.id, &project.project.id, &bob.id)
        .unwrap();

    db.create_event(
        &alice.id,
        &NewEvent {
            project_id: project.project.id.clone(),
            session_id: None,
            event_type: EventType::UserAction,
            timestamp: None,
            metadata: None,
            user_prompt: None,
            ai_response: None,
            feedback: None,
        },
    )
    .unwrap();

    let stats = analytics::project_stats(&db, &bob.id, &project.project.id, 30).unwrap();
    assert_eq!(stats.total_events, 1);
    assert_eq!(stats.project_name, "research");

    let err = analytics::project_stats(&db, &carol.id, &project.project.id, 30).unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

// ============================================
// Event Filter Tests
// ============================================

#[test]
fn test_event_type_filter_and_ordering() {
    let db = test_db();
    let alice = make_user(&db, "alice");
    let project = make_project(&db, &alice, "research");

    for (event_type, minutes) in [
        (EventType::Error, 5),
        (EventType::UserAction, 10),
        (EventType::Error, 1),
    ] {
        db.create_event(
            &alice.id,
            &NewEvent {
                project_id: project.project.id.clone(),
                session_id: None,
                event_type,
                timestamp: Some(chrono::Utc::now() - chrono::Duration::minutes(minutes)),
                metadata: None,
                user_prompt: None,
                ai_response: None,
                feedback: None,
            },
        )
        .unwrap();
    }

    let filter = EventFilter {
        event_type: Some(EventType::Error),
        ..Default::default()
    };
    let errors = db.list_events(&alice.id, &filter).unwrap();
    assert_eq!(errors.len(), 2);

    let filter = EventFilter {
        ordering: Some("timestamp".into()),
        ..Default::default()
    };
    let events = db.list_events(&alice.id, &filter).unwrap();
    let timestamps: Vec<_> = events.iter().map(|e| e.event.timestamp).collect();
    let mut sorted = timestamps.clone();
    sorted.sort();
    assert_eq!(timestamps, sorted);
}
