//! Windowed per-project aggregates
//!
//! Stats are computed over a trailing window: everything with a
//! timestamp at or after `now - days` counts, with no upper bound, so
//! rows stamped in the future are included. Sessions are bucketed by
//! their start_time. Averages use 0 as the no-data value.

use crate::db::{repo, Database};
use crate::error::Result;
use crate::types::EventType;
use chrono::{Duration, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

/// Count of events of one type inside the window.
#[derive(Debug, Clone, Serialize)]
pub struct EventTypeCount {
    pub event_type: EventType,
    pub count: i64,
}

/// Aggregate activity for one project over a trailing window.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectStats {
    pub project_id: String,
    pub project_name: String,
    pub period_days: u32,
    pub total_events: i64,
    pub event_types: Vec<EventTypeCount>,
    pub total_prompts: i64,
    pub avg_prompt_tokens: f64,
    pub total_responses: i64,
    pub avg_response_tokens: f64,
    pub avg_latency: f64,
    pub total_feedback: i64,
    pub avg_rating: f64,
    pub total_sessions: i64,
}

/// Compute trailing-window stats for a project the actor can see.
pub fn project_stats(
    db: &Database,
    actor: &str,
    project_id: &str,
    days: u32,
) -> Result<ProjectStats> {
    let conn = db.connection();
    let project = repo::fetch_visible_project(&conn, actor, project_id)?;
    let start = (Utc::now() - Duration::days(days as i64)).to_rfc3339();

    let total_events: i64 = conn.query_row(
        "SELECT COUNT(*) FROM events WHERE project_id = ?1 AND timestamp >= ?2",
        params![project_id, start],
        |r| r.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT event_type, COUNT(*) FROM events
         WHERE project_id = ?1 AND timestamp >= ?2
         GROUP BY event_type ORDER BY COUNT(*) DESC",
    )?;
    let event_types = stmt
        .query_map(params![project_id, start], |r| {
            let raw: String = r.get(0)?;
            Ok(EventTypeCount {
                event_type: raw.parse().unwrap_or(EventType::Other),
                count: r.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let (total_prompts, avg_prompt_tokens) = prompt_stats(&conn, project_id, &start)?;
    let (total_responses, avg_response_tokens, avg_latency) =
        response_stats(&conn, project_id, &start)?;
    let (total_feedback, avg_rating) = feedback_stats(&conn, project_id, &start)?;

    let total_sessions: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sessions WHERE project_id = ?1 AND start_time >= ?2",
        params![project_id, start],
        |r| r.get(0),
    )?;

    Ok(ProjectStats {
        project_id: project.id,
        project_name: project.name,
        period_days: days,
        total_events,
        event_types,
        total_prompts,
        avg_prompt_tokens,
        total_responses,
        avg_response_tokens,
        avg_latency,
        total_feedback,
        avg_rating,
        total_sessions,
    })
}

fn prompt_stats(conn: &Connection, project_id: &str, start: &str) -> Result<(i64, f64)> {
    let row = conn.query_row(
        "SELECT COUNT(*), COALESCE(AVG(up.tokens), 0)
         FROM user_prompts up
         JOIN events e ON e.id = up.event_id
         WHERE e.project_id = ?1 AND e.timestamp >= ?2",
        params![project_id, start],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    Ok(row)
}

fn response_stats(conn: &Connection, project_id: &str, start: &str) -> Result<(i64, f64, f64)> {
    let row = conn.query_row(
        "SELECT COUNT(*), COALESCE(AVG(r.tokens), 0), COALESCE(AVG(r.latency), 0)
         FROM ai_responses r
         JOIN events e ON e.id = r.event_id
         WHERE e.project_id = ?1 AND e.timestamp >= ?2",
        params![project_id, start],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;
    Ok(row)
}

/// Unrated feedback counts toward the total but not the average.
fn feedback_stats(conn: &Connection, project_id: &str, start: &str) -> Result<(i64, f64)> {
    let row = conn.query_row(
        "SELECT COUNT(*), COALESCE(AVG(f.rating), 0)
         FROM feedback f
         JOIN events e ON e.id = f.event_id
         WHERE e.project_id = ?1 AND e.timestamp >= ?2",
        params![project_id, start],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;

    fn seeded() -> (Database, User, String) {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let alice = db
            .create_user(&NewUser {
                username: "alice".into(),
                email: "alice@example.com".into(),
                first_name: String::new(),
                last_name: String::new(),
            })
            .unwrap();
        let project = db
            .create_project(&alice.id, &NewProject {
                name: "demo".into(),
                description: String::new(),
            })
            .unwrap();
        (db, alice, project.project.id)
    }

    fn bundle(project_id: &str, rating: Option<i64>) -> NewEvent {
        NewEvent {
            project_id: project_id.to_string(),
            session_id: None,
            event_type: EventType::AiResponse,
            timestamp: None,
            metadata: None,
            user_prompt: Some(NewUserPrompt {
                prompt_text: "hi".into(),
                model_name: "gpt-4".into(),
                tokens: 10,
            }),
            ai_response: Some(NewAiResponse {
                response_text: "hello".into(),
                model_name: "gpt-4".into(),
                tokens: 30,
                latency: 1.5,
            }),
            feedback: Some(NewFeedback {
                rating,
                comment: String::new(),
                tags: vec![],
            }),
        }
    }

    #[test]
    fn empty_project_reports_zero_sentinels() {
        let (db, alice, project_id) = seeded();
        let stats = project_stats(&db, &alice.id, &project_id, 30).unwrap();
        assert_eq!(stats.total_events, 0);
        assert_eq!(stats.avg_prompt_tokens, 0.0);
        assert_eq!(stats.avg_rating, 0.0);
        assert!(stats.event_types.is_empty());
    }

    #[test]
    fn zero_day_window_excludes_past_events() {
        let (db, alice, project_id) = seeded();
        let mut new = bundle(&project_id, Some(4));
        new.timestamp = Some(Utc::now() - Duration::hours(2));
        db.create_event(&alice.id, &new).unwrap();

        let stats = project_stats(&db, &alice.id, &project_id, 30).unwrap();
        assert_eq!(stats.total_events, 1);

        let stats = project_stats(&db, &alice.id, &project_id, 0).unwrap();
        assert_eq!(stats.total_events, 0);
        assert_eq!(stats.total_prompts, 0);
    }

    #[test]
    fn unrated_feedback_counts_but_does_not_skew_average() {
        let (db, alice, project_id) = seeded();
        db.create_event(&alice.id, &bundle(&project_id, Some(5))).unwrap();
        db.create_event(&alice.id, &bundle(&project_id, Some(3))).unwrap();
        db.create_event(&alice.id, &bundle(&project_id, None)).unwrap();

        let stats = project_stats(&db, &alice.id, &project_id, 7).unwrap();
        assert_eq!(stats.total_feedback, 3);
        assert_eq!(stats.avg_rating, 4.0);
        assert_eq!(stats.total_responses, 3);
        assert_eq!(stats.avg_latency, 1.5);
    }

    #[test]
    fn event_type_breakdown_counts_per_type() {
        let (db, alice, project_id) = seeded();
        db.create_event(&alice.id, &bundle(&project_id, None)).unwrap();
        db.create_event(&alice.id, &bundle(&project_id, None)).unwrap();
        let mut other = bundle(&project_id, None);
        other.event_type = EventType::Error;
        other.user_prompt = None;
        other.ai_response = None;
        other.feedback = None;
        db.create_event(&alice.id, &other).unwrap();

        let stats = project_stats(&db, &alice.id, &project_id, 7).unwrap();
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.event_types.len(), 2);
        assert_eq!(stats.event_types[0].event_type, EventType::AiResponse);
        assert_eq!(stats.event_types[0].count, 2);
    }
}
