//! Database repository layer
//!
//! Provides query and mutation operations for all entity types.
//!
//! Every actor-scoped query restricts its result set to projects the
//! actor owns or is a member of, before any caller-supplied filter is
//! applied. Retrieval of an absent row and retrieval of a row the actor
//! cannot see both surface as [`Error::NotFound`].

use crate::error::{Error, Result};
use crate::policy::{self, WriteAuthority};
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

/// Filter parameters for project listings.
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    /// Substring search over name and description
    pub search: Option<String>,
    /// Whitelisted sort field, `-` prefix for descending
    pub ordering: Option<String>,
}

/// Filter parameters for session listings.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub project_id: Option<String>,
    /// External user identifier
    pub user_id: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}

/// Filter parameters for event listings.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub project_id: Option<String>,
    pub session_id: Option<String>,
    pub event_type: Option<EventType>,
    pub ordering: Option<String>,
}

/// Filter parameters for prompt listings.
#[derive(Debug, Clone, Default)]
pub struct PromptFilter {
    pub project_id: Option<String>,
    pub model_name: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}

/// Filter parameters for response listings.
#[derive(Debug, Clone, Default)]
pub struct ResponseFilter {
    pub project_id: Option<String>,
    pub model_name: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}

/// Filter parameters for feedback listings.
#[derive(Debug, Clone, Default)]
pub struct FeedbackFilter {
    pub project_id: Option<String>,
    pub rating: Option<i64>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}

/// Filter parameters for tag listings.
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    pub project_id: Option<String>,
}

/// Filter parameters for dashboard listings.
#[derive(Debug, Clone, Default)]
pub struct DashboardFilter {
    pub project_id: Option<String>,
}

/// Filter parameters for widget listings.
#[derive(Debug, Clone, Default)]
pub struct WidgetFilter {
    pub dashboard_id: Option<String>,
}

type SqlParams = Vec<Box<dyn rusqlite::ToSql>>;

/// Visibility predicate over a project-id column expression.
///
/// Consumes two positional parameters, both the actor id. The UNION
/// deduplicates owner-and-member rows.
fn visible_pred(project_col: &str) -> String {
    format!(
        "{project_col} IN (SELECT pr.id FROM projects pr WHERE pr.owner_id = ? \
         UNION SELECT pm.project_id FROM project_members pm WHERE pm.user_id = ?)"
    )
}

fn push_actor(params: &mut SqlParams, actor: &str) {
    params.push(Box::new(actor.to_string()));
    params.push(Box::new(actor.to_string()));
}

/// Appends an OR-composed substring search over `columns`.
fn push_search(sql: &mut String, params: &mut SqlParams, term: &str, columns: &[&str]) {
    let clauses: Vec<String> = columns
        .iter()
        .map(|c| format!("{c} LIKE '%' || ? || '%'"))
        .collect();
    sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
    for _ in columns {
        params.push(Box::new(term.to_string()));
    }
}

/// Resolves a caller-supplied `ordering` value against a whitelist of
/// (field, column) pairs. Unknown fields are a validation error.
fn order_clause(
    ordering: Option<&str>,
    allowed: &[(&str, &str)],
    default: &str,
) -> Result<String> {
    let raw = match ordering {
        None => return Ok(format!(" ORDER BY {default}")),
        Some(raw) => raw,
    };
    let (field, dir) = match raw.strip_prefix('-') {
        Some(f) => (f, "DESC"),
        None => (raw, "ASC"),
    };
    allowed
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, col)| format!(" ORDER BY {col} {dir}"))
        .ok_or_else(|| Error::invalid("ordering", format!("cannot order by {raw}")))
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_json(s: &str) -> serde_json::Value {
    serde_json::from_str(s).unwrap_or_else(|_| serde_json::json!({}))
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn check_rating(rating: Option<i64>) -> Result<()> {
    match rating {
        Some(r) if !(1..=5).contains(&r) => Err(Error::invalid(
            "rating",
            format!("must be between 1 and 5, got {r}"),
        )),
        _ => Ok(()),
    }
}

fn check_tokens(tokens: i64) -> Result<()> {
    if tokens < 0 {
        return Err(Error::invalid("tokens", "must be non-negative"));
    }
    Ok(())
}

fn check_latency(latency: f64) -> Result<()> {
    if !latency.is_finite() || latency < 0.0 {
        return Err(Error::invalid("latency", "must be a non-negative number"));
    }
    Ok(())
}

// ============================================
// Connection-level helpers
//
// Free functions over &Connection so they compose with transactions.
// ============================================

/// Fetch a project the actor can see, or NotFound.
pub(crate) fn fetch_visible_project(conn: &Connection, actor: &str, id: &str) -> Result<Project> {
    let sql = format!(
        "SELECT p.id, p.name, p.description, p.created_at, p.updated_at, p.owner_id
         FROM projects p WHERE {} AND p.id = ?",
        visible_pred("p.id")
    );
    conn.query_row(&sql, params![actor, actor, id], Database::row_to_project)
        .optional()?
        .ok_or_else(|| Error::not_found("project", id))
}

/// Fetch a project the actor can see AND owns, for writes against it.
fn fetch_writable_project(conn: &Connection, actor: &str, id: &str) -> Result<Project> {
    let project = fetch_visible_project(conn, actor, id)?;
    policy::ensure_can_write(actor, &WriteAuthority::ProjectOwner(&project.owner_id))?;
    Ok(project)
}

fn fetch_visible_session(conn: &Connection, actor: &str, id: &str) -> Result<Session> {
    let sql = format!(
        "SELECT s.id, s.project_id, s.user_id, s.session_key, s.start_time, s.end_time, s.metadata
         FROM sessions s WHERE {} AND s.id = ?",
        visible_pred("s.project_id")
    );
    conn.query_row(&sql, params![actor, actor, id], Database::row_to_session)
        .optional()?
        .ok_or_else(|| Error::not_found("session", id))
}

fn fetch_visible_event(conn: &Connection, actor: &str, id: &str) -> Result<Event> {
    let sql = format!(
        "SELECT e.id, e.project_id, e.session_id, e.event_type, e.timestamp, e.metadata
         FROM events e WHERE {} AND e.id = ?",
        visible_pred("e.project_id")
    );
    conn.query_row(&sql, params![actor, actor, id], Database::row_to_event)
        .optional()?
        .ok_or_else(|| Error::not_found("event", id))
}

fn fetch_visible_dashboard(conn: &Connection, actor: &str, id: &str) -> Result<Dashboard> {
    let sql = format!(
        "SELECT d.id, d.project_id, d.name, d.description, d.layout, d.created_at, d.updated_at
         FROM dashboards d WHERE {} AND d.id = ?",
        visible_pred("d.project_id")
    );
    conn.query_row(&sql, params![actor, actor, id], Database::row_to_dashboard)
        .optional()?
        .ok_or_else(|| Error::not_found("dashboard", id))
}

fn event_children(
    conn: &Connection,
    event_id: &str,
) -> Result<(Option<UserPrompt>, Option<AiResponse>, Option<Feedback>)> {
    let prompt = conn
        .query_row(
            "SELECT id, event_id, prompt_text, model_name, tokens
             FROM user_prompts WHERE event_id = ?",
            [event_id],
            Database::row_to_prompt,
        )
        .optional()?;
    let response = conn
        .query_row(
            "SELECT id, event_id, prompt_id, response_text, model_name, tokens, latency
             FROM ai_responses WHERE event_id = ?",
            [event_id],
            Database::row_to_response,
        )
        .optional()?;
    let feedback = conn
        .query_row(
            "SELECT id, event_id, response_id, rating, comment, tags
             FROM feedback WHERE event_id = ?",
            [event_id],
            Database::row_to_feedback,
        )
        .optional()?;
    Ok((prompt, response, feedback))
}

fn event_detail(conn: &Connection, event: Event) -> Result<EventDetail> {
    let (user_prompt, ai_response, feedback) = event_children(conn, &event.id)?;
    Ok(EventDetail {
        event,
        user_prompt,
        ai_response,
        feedback,
    })
}

fn project_detail(conn: &Connection, project: Project) -> Result<ProjectDetail> {
    let owner = conn
        .query_row(
            "SELECT id, username, email, first_name, last_name, api_token, created_at
             FROM users WHERE id = ?",
            [&project.owner_id],
            Database::row_to_user,
        )
        .optional()?
        .ok_or_else(|| Error::not_found("user", &project.owner_id))?;

    let mut stmt = conn.prepare(
        "SELECT u.id, u.username, u.email, u.first_name, u.last_name, u.api_token, u.created_at
         FROM users u
         JOIN project_members pm ON pm.user_id = u.id
         WHERE pm.project_id = ?
         ORDER BY u.username",
    )?;
    let members = stmt
        .query_map([&project.id], Database::row_to_user)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, project_id, name, color FROM tags WHERE project_id = ? ORDER BY name",
    )?;
    let tags = stmt
        .query_map([&project.id], Database::row_to_tag)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(ProjectDetail {
        project,
        owner,
        members,
        tags,
    })
}

fn dashboard_detail(conn: &Connection, dashboard: Dashboard) -> Result<DashboardDetail> {
    let mut stmt = conn.prepare(
        "SELECT id, dashboard_id, title, widget_type, query, position
         FROM widgets WHERE dashboard_id = ? ORDER BY rowid",
    )?;
    let widgets = stmt
        .query_map([&dashboard.id], Database::row_to_widget)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(DashboardDetail { dashboard, widgets })
}

/// Database handle; a single connection behind a mutex, one logical
/// transaction per request.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    // ============================================
    // Row mappers
    // ============================================

    pub(crate) fn row_to_user(row: &Row) -> rusqlite::Result<User> {
        let created_at: String = row.get(6)?;
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            first_name: row.get(3)?,
            last_name: row.get(4)?,
            api_token: row.get(5)?,
            created_at: parse_ts(&created_at),
        })
    }

    pub(crate) fn row_to_project(row: &Row) -> rusqlite::Result<Project> {
        let created_at: String = row.get(3)?;
        let updated_at: String = row.get(4)?;
        Ok(Project {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
            owner_id: row.get(5)?,
        })
    }

    pub(crate) fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
        let start: String = row.get(4)?;
        let end: Option<String> = row.get(5)?;
        let metadata: String = row.get(6)?;
        Ok(Session {
            id: row.get(0)?,
            project_id: row.get(1)?,
            user_id: row.get(2)?,
            session_key: row.get(3)?,
            start_time: parse_ts(&start),
            end_time: parse_opt_ts(end),
            metadata: parse_json(&metadata),
        })
    }

    pub(crate) fn row_to_event(row: &Row) -> rusqlite::Result<Event> {
        let event_type: String = row.get(3)?;
        let ts: String = row.get(4)?;
        let metadata: String = row.get(5)?;
        Ok(Event {
            id: row.get(0)?,
            project_id: row.get(1)?,
            session_id: row.get(2)?,
            event_type: event_type.parse().unwrap_or(EventType::Other),
            timestamp: parse_ts(&ts),
            metadata: parse_json(&metadata),
        })
    }

    pub(crate) fn row_to_prompt(row: &Row) -> rusqlite::Result<UserPrompt> {
        Ok(UserPrompt {
            id: row.get(0)?,
            event_id: row.get(1)?,
            prompt_text: row.get(2)?,
            model_name: row.get(3)?,
            tokens: row.get(4)?,
        })
    }

    pub(crate) fn row_to_response(row: &Row) -> rusqlite::Result<AiResponse> {
        Ok(AiResponse {
            id: row.get(0)?,
            event_id: row.get(1)?,
            prompt_id: row.get(2)?,
            response_text: row.get(3)?,
            model_name: row.get(4)?,
            tokens: row.get(5)?,
            latency: row.get(6)?,
        })
    }

    pub(crate) fn row_to_feedback(row: &Row) -> rusqlite::Result<Feedback> {
        let tags: String = row.get(5)?;
        Ok(Feedback {
            id: row.get(0)?,
            event_id: row.get(1)?,
            response_id: row.get(2)?,
            rating: row.get(3)?,
            comment: row.get(4)?,
            tags: serde_json::from_str(&tags).unwrap_or_default(),
        })
    }

    pub(crate) fn row_to_tag(row: &Row) -> rusqlite::Result<Tag> {
        Ok(Tag {
            id: row.get(0)?,
            project_id: row.get(1)?,
            name: row.get(2)?,
            color: row.get(3)?,
        })
    }

    pub(crate) fn row_to_dashboard(row: &Row) -> rusqlite::Result<Dashboard> {
        let layout: String = row.get(4)?;
        let created_at: String = row.get(5)?;
        let updated_at: String = row.get(6)?;
        Ok(Dashboard {
            id: row.get(0)?,
            project_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            layout: parse_json(&layout),
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
        })
    }

    pub(crate) fn row_to_widget(row: &Row) -> rusqlite::Result<Widget> {
        let widget_type: String = row.get(3)?;
        let query: String = row.get(4)?;
        let position: String = row.get(5)?;
        Ok(Widget {
            id: row.get(0)?,
            dashboard_id: row.get(1)?,
            title: row.get(2)?,
            widget_type: widget_type.parse().unwrap_or(WidgetType::Text),
            query: parse_json(&query),
            position: parse_json(&position),
        })
    }

    // ============================================
    // User operations
    // ============================================

    /// Create a user with a freshly generated api_token.
    pub fn create_user(&self, new: &NewUser) -> Result<User> {
        let conn = self.conn.lock().unwrap();
        let user = User {
            id: new_id(),
            username: new.username.clone(),
            email: new.email.clone(),
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
            api_token: new_id(),
            created_at: Utc::now(),
        };
        conn.execute(
            "INSERT INTO users (id, username, email, first_name, last_name, api_token, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id,
                user.username,
                user.email,
                user.first_name,
                user.last_name,
                user.api_token,
                user.created_at.to_rfc3339(),
            ],
        )
        .map_err(Error::from_sqlite)?;
        Ok(user)
    }

    pub fn user_count(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
        Ok(count)
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, username, email, first_name, last_name, api_token, created_at
             FROM users WHERE id = ?",
            [id],
            Self::row_to_user,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Resolve a bearer token to a user, if any.
    pub fn find_user_by_token(&self, token: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, username, email, first_name, last_name, api_token, created_at
             FROM users WHERE api_token = ?",
            [token],
            Self::row_to_user,
        )
        .optional()
        .map_err(Error::from)
    }

    /// List users, optionally narrowed by a substring search.
    pub fn list_users(&self, search: Option<&str>) -> Result<Vec<User>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = String::from(
            "SELECT id, username, email, first_name, last_name, api_token, created_at
             FROM users WHERE 1=1",
        );
        let mut sql_params: SqlParams = vec![];
        if let Some(term) = search {
            push_search(
                &mut sql,
                &mut sql_params,
                term,
                &["username", "email", "first_name", "last_name"],
            );
        }
        sql.push_str(" ORDER BY username");

        let refs: Vec<&dyn rusqlite::ToSql> = sql_params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let users = stmt
            .query_map(refs.as_slice(), Self::row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    // ============================================
    // Project operations
    // ============================================

    /// Create a project owned by the actor.
    pub fn create_project(&self, actor: &str, new: &NewProject) -> Result<ProjectDetail> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let project = Project {
            id: new_id(),
            name: new.name.clone(),
            description: new.description.clone(),
            created_at: now,
            updated_at: now,
            owner_id: actor.to_string(),
        };
        conn.execute(
            "INSERT INTO projects (id, name, description, created_at, updated_at, owner_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                project.id,
                project.name,
                project.description,
                project.created_at.to_rfc3339(),
                project.updated_at.to_rfc3339(),
                project.owner_id,
            ],
        )
        .map_err(Error::from_sqlite)?;
        project_detail(&conn, project)
    }

    /// List projects visible to the actor.
    pub fn list_projects(&self, actor: &str, filter: &ProjectFilter) -> Result<Vec<ProjectDetail>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!(
            "SELECT p.id, p.name, p.description, p.created_at, p.updated_at, p.owner_id
             FROM projects p WHERE {}",
            visible_pred("p.id")
        );
        let mut sql_params: SqlParams = vec![];
        push_actor(&mut sql_params, actor);

        if let Some(term) = &filter.search {
            push_search(&mut sql, &mut sql_params, term, &["p.name", "p.description"]);
        }
        sql.push_str(&order_clause(
            filter.ordering.as_deref(),
            &[
                ("name", "p.name"),
                ("created_at", "p.created_at"),
                ("updated_at", "p.updated_at"),
            ],
            "p.created_at DESC",
        )?);

        let refs: Vec<&dyn rusqlite::ToSql> = sql_params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let projects = stmt
            .query_map(refs.as_slice(), Self::row_to_project)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        projects
            .into_iter()
            .map(|p| project_detail(&conn, p))
            .collect()
    }

    pub fn get_project(&self, actor: &str, id: &str) -> Result<ProjectDetail> {
        let conn = self.conn.lock().unwrap();
        let project = fetch_visible_project(&conn, actor, id)?;
        project_detail(&conn, project)
    }

    pub fn update_project(
        &self,
        actor: &str,
        id: &str,
        patch: &ProjectPatch,
    ) -> Result<ProjectDetail> {
        let conn = self.conn.lock().unwrap();
        let mut project = fetch_visible_project(&conn, actor, id)?;
        policy::ensure_can_write(actor, &WriteAuthority::Owner(&project.owner_id))?;

        if let Some(name) = &patch.name {
            project.name = name.clone();
        }
        if let Some(description) = &patch.description {
            project.description = description.clone();
        }
        project.updated_at = Utc::now();

        conn.execute(
            "UPDATE projects SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                project.name,
                project.description,
                project.updated_at.to_rfc3339(),
                project.id,
            ],
        )
        .map_err(Error::from_sqlite)?;
        project_detail(&conn, project)
    }

    /// Delete a project and, via cascades, everything it partitions.
    pub fn delete_project(&self, actor: &str, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let project = fetch_visible_project(&conn, actor, id)?;
        policy::ensure_can_write(actor, &WriteAuthority::Owner(&project.owner_id))?;
        conn.execute("DELETE FROM projects WHERE id = ?", [id])?;
        Ok(())
    }

    /// Idempotently add a user to a project's member set.
    pub fn add_member(&self, actor: &str, project_id: &str, user_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let project = fetch_visible_project(&conn, actor, project_id)?;
        policy::ensure_can_write(actor, &WriteAuthority::Owner(&project.owner_id))?;

        let exists: i64 =
            conn.query_row("SELECT COUNT(*) FROM users WHERE id = ?", [user_id], |r| {
                r.get(0)
            })?;
        if exists == 0 {
            return Err(Error::not_found("user", user_id));
        }

        conn.execute(
            "INSERT OR IGNORE INTO project_members (project_id, user_id) VALUES (?1, ?2)",
            params![project_id, user_id],
        )?;
        Ok(())
    }

    /// Idempotently remove a user from a project's member set.
    /// Removing a non-member is a no-op, not an error.
    pub fn remove_member(&self, actor: &str, project_id: &str, user_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let project = fetch_visible_project(&conn, actor, project_id)?;
        policy::ensure_can_write(actor, &WriteAuthority::Owner(&project.owner_id))?;

        let exists: i64 =
            conn.query_row("SELECT COUNT(*) FROM users WHERE id = ?", [user_id], |r| {
                r.get(0)
            })?;
        if exists == 0 {
            return Err(Error::not_found("user", user_id));
        }

        conn.execute(
            "DELETE FROM project_members WHERE project_id = ?1 AND user_id = ?2",
            params![project_id, user_id],
        )?;
        Ok(())
    }

    // ============================================
    // Session operations
    // ============================================

    pub fn create_session(&self, actor: &str, new: &NewSession) -> Result<Session> {
        let conn = self.conn.lock().unwrap();
        fetch_writable_project(&conn, actor, &new.project_id)?;

        let session = Session {
            id: new_id(),
            project_id: new.project_id.clone(),
            user_id: new.user_id.clone(),
            session_key: new.session_key.clone(),
            start_time: new.start_time.unwrap_or_else(Utc::now),
            end_time: None,
            metadata: new.metadata.clone().unwrap_or_else(|| serde_json::json!({})),
        };
        conn.execute(
            "INSERT INTO sessions (id, project_id, user_id, session_key, start_time, end_time, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)",
            params![
                session.id,
                session.project_id,
                session.user_id,
                session.session_key,
                session.start_time.to_rfc3339(),
                session.metadata.to_string(),
            ],
        )
        .map_err(Error::from_sqlite)?;
        Ok(session)
    }

    pub fn list_sessions(&self, actor: &str, filter: &SessionFilter) -> Result<Vec<Session>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!(
            "SELECT s.id, s.project_id, s.user_id, s.session_key, s.start_time, s.end_time, s.metadata
             FROM sessions s WHERE {}",
            visible_pred("s.project_id")
        );
        let mut sql_params: SqlParams = vec![];
        push_actor(&mut sql_params, actor);

        if let Some(project_id) = &filter.project_id {
            sql.push_str(" AND s.project_id = ?");
            sql_params.push(Box::new(project_id.clone()));
        }
        if let Some(user_id) = &filter.user_id {
            sql.push_str(" AND s.user_id = ?");
            sql_params.push(Box::new(user_id.clone()));
        }
        if let Some(term) = &filter.search {
            push_search(
                &mut sql,
                &mut sql_params,
                term,
                &["s.user_id", "s.session_key"],
            );
        }
        sql.push_str(&order_clause(
            filter.ordering.as_deref(),
            &[("start_time", "s.start_time"), ("end_time", "s.end_time")],
            "s.start_time DESC",
        )?);

        let refs: Vec<&dyn rusqlite::ToSql> = sql_params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let sessions = stmt
            .query_map(refs.as_slice(), Self::row_to_session)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    pub fn get_session(&self, actor: &str, id: &str) -> Result<Session> {
        let conn = self.conn.lock().unwrap();
        fetch_visible_session(&conn, actor, id)
    }

    pub fn update_session(&self, actor: &str, id: &str, patch: &SessionPatch) -> Result<Session> {
        let conn = self.conn.lock().unwrap();
        let mut session = fetch_visible_session(&conn, actor, id)?;
        fetch_writable_project(&conn, actor, &session.project_id)?;

        if let Some(user_id) = &patch.user_id {
            session.user_id = Some(user_id.clone());
        }
        if let Some(end_time) = patch.end_time {
            session.end_time = Some(end_time);
        }
        if let Some(metadata) = &patch.metadata {
            session.metadata = metadata.clone();
        }

        conn.execute(
            "UPDATE sessions SET user_id = ?1, end_time = ?2, metadata = ?3 WHERE id = ?4",
            params![
                session.user_id,
                session.end_time.map(|t| t.to_rfc3339()),
                session.metadata.to_string(),
                session.id,
            ],
        )
        .map_err(Error::from_sqlite)?;
        Ok(session)
    }

    pub fn delete_session(&self, actor: &str, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let session = fetch_visible_session(&conn, actor, id)?;
        fetch_writable_project(&conn, actor, &session.project_id)?;
        conn.execute("DELETE FROM sessions WHERE id = ?", [id])?;
        Ok(())
    }

    /// Set end_time to now. Repeated calls simply overwrite it.
    pub fn end_session(&self, actor: &str, id: &str) -> Result<Session> {
        let conn = self.conn.lock().unwrap();
        let mut session = fetch_visible_session(&conn, actor, id)?;
        fetch_writable_project(&conn, actor, &session.project_id)?;

        session.end_time = Some(Utc::now());
        conn.execute(
            "UPDATE sessions SET end_time = ?1 WHERE id = ?2",
            params![session.end_time.map(|t| t.to_rfc3339()), session.id],
        )?;
        Ok(session)
    }

    /// All events of a session, newest first, bypassing type/project
    /// filters but still subject to the actor's visibility.
    pub fn session_events(&self, actor: &str, session_id: &str) -> Result<Vec<EventDetail>> {
        let conn = self.conn.lock().unwrap();
        fetch_visible_session(&conn, actor, session_id)?;

        let mut stmt = conn.prepare(
            "SELECT e.id, e.project_id, e.session_id, e.event_type, e.timestamp, e.metadata
             FROM events e WHERE e.session_id = ? ORDER BY e.timestamp DESC",
        )?;
        let events = stmt
            .query_map([session_id], Self::row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        events.into_iter().map(|e| event_detail(&conn, e)).collect()
    }

    // ============================================
    // Event operations
    // ============================================

    /// Create an event and its bundled sub-records in one transaction.
    ///
    /// Order: event, then prompt, then response (linked to the bundled
    /// prompt when present), then feedback (linked to the bundled
    /// response when present). Any failure rolls the whole bundle back.
    pub fn create_event(&self, actor: &str, new: &NewEvent) -> Result<EventDetail> {
        if let Some(p) = &new.user_prompt {
            check_tokens(p.tokens)?;
        }
        if let Some(r) = &new.ai_response {
            check_tokens(r.tokens)?;
            check_latency(r.latency)?;
        }
        if let Some(f) = &new.feedback {
            check_rating(f.rating)?;
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        fetch_writable_project(&tx, actor, &new.project_id)?;
        if let Some(session_id) = &new.session_id {
            fetch_visible_session(&tx, actor, session_id)?;
        }

        let event = Event {
            id: new_id(),
            project_id: new.project_id.clone(),
            session_id: new.session_id.clone(),
            event_type: new.event_type,
            timestamp: new.timestamp.unwrap_or_else(Utc::now),
            metadata: new.metadata.clone().unwrap_or_else(|| serde_json::json!({})),
        };
        tx.execute(
            "INSERT INTO events (id, project_id, session_id, event_type, timestamp, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.id,
                event.project_id,
                event.session_id,
                event.event_type.as_str(),
                event.timestamp.to_rfc3339(),
                event.metadata.to_string(),
            ],
        )
        .map_err(Error::from_sqlite)?;

        let user_prompt = match &new.user_prompt {
            Some(p) => {
                let prompt = UserPrompt {
                    id: new_id(),
                    event_id: event.id.clone(),
                    prompt_text: p.prompt_text.clone(),
                    model_name: p.model_name.clone(),
                    tokens: p.tokens,
                };
                tx.execute(
                    "INSERT INTO user_prompts (id, event_id, prompt_text, model_name, tokens)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        prompt.id,
                        prompt.event_id,
                        prompt.prompt_text,
                        prompt.model_name,
                        prompt.tokens,
                    ],
                )
                .map_err(Error::from_sqlite)?;
                Some(prompt)
            }
            None => None,
        };

        let ai_response = match &new.ai_response {
            Some(r) => {
                // The prompt link is set only when a prompt was bundled
                // in the same call.
                let response = AiResponse {
                    id: new_id(),
                    event_id: event.id.clone(),
                    prompt_id: user_prompt.as_ref().map(|p| p.id.clone()),
                    response_text: r.response_text.clone(),
                    model_name: r.model_name.clone(),
                    tokens: r.tokens,
                    latency: r.latency,
                };
                tx.execute(
                    "INSERT INTO ai_responses (id, event_id, prompt_id, response_text, model_name, tokens, latency)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        response.id,
                        response.event_id,
                        response.prompt_id,
                        response.response_text,
                        response.model_name,
                        response.tokens,
                        response.latency,
                    ],
                )
                .map_err(Error::from_sqlite)?;
                Some(response)
            }
            None => None,
        };

        let feedback = match &new.feedback {
            Some(f) => {
                let feedback = Feedback {
                    id: new_id(),
                    event_id: event.id.clone(),
                    response_id: ai_response.as_ref().map(|r| r.id.clone()),
                    rating: f.rating,
                    comment: f.comment.clone(),
                    tags: f.tags.clone(),
                };
                tx.execute(
                    "INSERT INTO feedback (id, event_id, response_id, rating, comment, tags)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        feedback.id,
                        feedback.event_id,
                        feedback.response_id,
                        feedback.rating,
                        feedback.comment,
                        serde_json::to_string(&feedback.tags)?,
                    ],
                )
                .map_err(Error::from_sqlite)?;
                Some(feedback)
            }
            None => None,
        };

        tx.commit()?;

        Ok(EventDetail {
            event,
            user_prompt,
            ai_response,
            feedback,
        })
    }

    pub fn list_events(&self, actor: &str, filter: &EventFilter) -> Result<Vec<EventDetail>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!(
            "SELECT e.id, e.project_id, e.session_id, e.event_type, e.timestamp, e.metadata
             FROM events e WHERE {}",
            visible_pred("e.project_id")
        );
        let mut sql_params: SqlParams = vec![];
        push_actor(&mut sql_params, actor);

        if let Some(project_id) = &filter.project_id {
            sql.push_str(" AND e.project_id = ?");
            sql_params.push(Box::new(project_id.clone()));
        }
        if let Some(session_id) = &filter.session_id {
            sql.push_str(" AND e.session_id = ?");
            sql_params.push(Box::new(session_id.clone()));
        }
        if let Some(event_type) = filter.event_type {
            sql.push_str(" AND e.event_type = ?");
            sql_params.push(Box::new(event_type.as_str().to_string()));
        }
        sql.push_str(&order_clause(
            filter.ordering.as_deref(),
            &[("timestamp", "e.timestamp"), ("event_type", "e.event_type")],
            "e.timestamp DESC",
        )?);

        let refs: Vec<&dyn rusqlite::ToSql> = sql_params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(refs.as_slice(), Self::row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        events.into_iter().map(|e| event_detail(&conn, e)).collect()
    }

    pub fn get_event(&self, actor: &str, id: &str) -> Result<EventDetail> {
        let conn = self.conn.lock().unwrap();
        let event = fetch_visible_event(&conn, actor, id)?;
        event_detail(&conn, event)
    }

    pub fn update_event(&self, actor: &str, id: &str, patch: &EventPatch) -> Result<EventDetail> {
        let conn = self.conn.lock().unwrap();
        let mut event = fetch_visible_event(&conn, actor, id)?;
        fetch_writable_project(&conn, actor, &event.project_id)?;

        if let Some(session_id) = &patch.session_id {
            fetch_visible_session(&conn, actor, session_id)?;
            event.session_id = Some(session_id.clone());
        }
        if let Some(event_type) = patch.event_type {
            event.event_type = event_type;
        }
        if let Some(timestamp) = patch.timestamp {
            event.timestamp = timestamp;
        }
        if let Some(metadata) = &patch.metadata {
            event.metadata = metadata.clone();
        }

        conn.execute(
            "UPDATE events SET session_id = ?1, event_type = ?2, timestamp = ?3, metadata = ?4
             WHERE id = ?5",
            params![
                event.session_id,
                event.event_type.as_str(),
                event.timestamp.to_rfc3339(),
                event.metadata.to_string(),
                event.id,
            ],
        )
        .map_err(Error::from_sqlite)?;
        event_detail(&conn, event)
    }

    pub fn delete_event(&self, actor: &str, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let event = fetch_visible_event(&conn, actor, id)?;
        fetch_writable_project(&conn, actor, &event.project_id)?;
        conn.execute("DELETE FROM events WHERE id = ?", [id])?;
        Ok(())
    }

    // ============================================
    // Prompt operations (read-only surface)
    // ============================================

    pub fn list_prompts(&self, actor: &str, filter: &PromptFilter) -> Result<Vec<UserPrompt>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!(
            "SELECT up.id, up.event_id, up.prompt_text, up.model_name, up.tokens
             FROM user_prompts up
             JOIN events e ON e.id = up.event_id
             WHERE {}",
            visible_pred("e.project_id")
        );
        let mut sql_params: SqlParams = vec![];
        push_actor(&mut sql_params, actor);

        if let Some(project_id) = &filter.project_id {
            sql.push_str(" AND e.project_id = ?");
            sql_params.push(Box::new(project_id.clone()));
        }
        if let Some(model_name) = &filter.model_name {
            sql.push_str(" AND up.model_name = ?");
            sql_params.push(Box::new(model_name.clone()));
        }
        if let Some(term) = &filter.search {
            push_search(
                &mut sql,
                &mut sql_params,
                term,
                &["up.prompt_text", "up.model_name"],
            );
        }
        sql.push_str(&order_clause(
            filter.ordering.as_deref(),
            &[("tokens", "up.tokens")],
            "e.timestamp DESC",
        )?);

        let refs: Vec<&dyn rusqlite::ToSql> = sql_params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let prompts = stmt
            .query_map(refs.as_slice(), Self::row_to_prompt)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(prompts)
    }

    pub fn get_prompt(&self, actor: &str, id: &str) -> Result<UserPrompt> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT up.id, up.event_id, up.prompt_text, up.model_name, up.tokens
             FROM user_prompts up
             JOIN events e ON e.id = up.event_id
             WHERE {} AND up.id = ?",
            visible_pred("e.project_id")
        );
        conn.query_row(&sql, params![actor, actor, id], Self::row_to_prompt)
            .optional()?
            .ok_or_else(|| Error::not_found("prompt", id))
    }

    // ============================================
    // Response operations (read-only surface)
    // ============================================

    pub fn list_responses(&self, actor: &str, filter: &ResponseFilter) -> Result<Vec<AiResponse>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!(
            "SELECT r.id, r.event_id, r.prompt_id, r.response_text, r.model_name, r.tokens, r.latency
             FROM ai_responses r
             JOIN events e ON e.id = r.event_id
             WHERE {}",
            visible_pred("e.project_id")
        );
        let mut sql_params: SqlParams = vec![];
        push_actor(&mut sql_params, actor);

        if let Some(project_id) = &filter.project_id {
            sql.push_str(" AND e.project_id = ?");
            sql_params.push(Box::new(project_id.clone()));
        }
        if let Some(model_name) = &filter.model_name {
            sql.push_str(" AND r.model_name = ?");
            sql_params.push(Box::new(model_name.clone()));
        }
        if let Some(term) = &filter.search {
            push_search(
                &mut sql,
                &mut sql_params,
                term,
                &["r.response_text", "r.model_name"],
            );
        }
        sql.push_str(&order_clause(
            filter.ordering.as_deref(),
            &[("tokens", "r.tokens"), ("latency", "r.latency")],
            "e.timestamp DESC",
        )?);

        let refs: Vec<&dyn rusqlite::ToSql> = sql_params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let responses = stmt
            .query_map(refs.as_slice(), Self::row_to_response)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(responses)
    }

    pub fn get_response(&self, actor: &str, id: &str) -> Result<AiResponse> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT r.id, r.event_id, r.prompt_id, r.response_text, r.model_name, r.tokens, r.latency
             FROM ai_responses r
             JOIN events e ON e.id = r.event_id
             WHERE {} AND r.id = ?",
            visible_pred("e.project_id")
        );
        conn.query_row(&sql, params![actor, actor, id], Self::row_to_response)
            .optional()?
            .ok_or_else(|| Error::not_found("response", id))
    }

    // ============================================
    // Feedback operations
    // ============================================

    pub fn create_feedback(&self, actor: &str, new: &NewFeedbackRow) -> Result<Feedback> {
        check_rating(new.rating)?;

        let conn = self.conn.lock().unwrap();
        let event = fetch_visible_event(&conn, actor, &new.event_id)?;
        fetch_writable_project(&conn, actor, &event.project_id)?;

        if let Some(response_id) = &new.response_id {
            let sql = format!(
                "SELECT COUNT(*) FROM ai_responses r
                 JOIN events e ON e.id = r.event_id
                 WHERE {} AND r.id = ?",
                visible_pred("e.project_id")
            );
            let exists: i64 =
                conn.query_row(&sql, params![actor, actor, response_id], |r| r.get(0))?;
            if exists == 0 {
                return Err(Error::not_found("response", response_id));
            }
        }

        let feedback = Feedback {
            id: new_id(),
            event_id: new.event_id.clone(),
            response_id: new.response_id.clone(),
            rating: new.rating,
            comment: new.comment.clone(),
            tags: new.tags.clone(),
        };
        conn.execute(
            "INSERT INTO feedback (id, event_id, response_id, rating, comment, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                feedback.id,
                feedback.event_id,
                feedback.response_id,
                feedback.rating,
                feedback.comment,
                serde_json::to_string(&feedback.tags)?,
            ],
        )
        .map_err(Error::from_sqlite)?;
        Ok(feedback)
    }

    pub fn list_feedback(&self, actor: &str, filter: &FeedbackFilter) -> Result<Vec<Feedback>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!(
            "SELECT f.id, f.event_id, f.response_id, f.rating, f.comment, f.tags
             FROM feedback f
             JOIN events e ON e.id = f.event_id
             WHERE {}",
            visible_pred("e.project_id")
        );
        let mut sql_params: SqlParams = vec![];
        push_actor(&mut sql_params, actor);

        if let Some(project_id) = &filter.project_id {
            sql.push_str(" AND e.project_id = ?");
            sql_params.push(Box::new(project_id.clone()));
        }
        if let Some(rating) = filter.rating {
            sql.push_str(" AND f.rating = ?");
            sql_params.push(Box::new(rating));
        }
        if let Some(term) = &filter.search {
            push_search(&mut sql, &mut sql_params, term, &["f.comment"]);
        }
        sql.push_str(&order_clause(
            filter.ordering.as_deref(),
            &[("rating", "f.rating")],
            "e.timestamp DESC",
        )?);

        let refs: Vec<&dyn rusqlite::ToSql> = sql_params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let feedback = stmt
            .query_map(refs.as_slice(), Self::row_to_feedback)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(feedback)
    }

    pub fn get_feedback(&self, actor: &str, id: &str) -> Result<Feedback> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT f.id, f.event_id, f.response_id, f.rating, f.comment, f.tags
             FROM feedback f
             JOIN events e ON e.id = f.event_id
             WHERE {} AND f.id = ?",
            visible_pred("e.project_id")
        );
        conn.query_row(&sql, params![actor, actor, id], Self::row_to_feedback)
            .optional()?
            .ok_or_else(|| Error::not_found("feedback", id))
    }

    pub fn update_feedback(
        &self,
        actor: &str,
        id: &str,
        patch: &FeedbackPatch,
    ) -> Result<Feedback> {
        check_rating(patch.rating)?;

        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT f.id, f.event_id, f.response_id, f.rating, f.comment, f.tags
             FROM feedback f
             JOIN events e ON e.id = f.event_id
             WHERE {} AND f.id = ?",
            visible_pred("e.project_id")
        );
        let mut feedback = conn
            .query_row(&sql, params![actor, actor, id], Self::row_to_feedback)
            .optional()?
            .ok_or_else(|| Error::not_found("feedback", id))?;

        let event = fetch_visible_event(&conn, actor, &feedback.event_id)?;
        fetch_writable_project(&conn, actor, &event.project_id)?;

        if let Some(rating) = patch.rating {
            feedback.rating = Some(rating);
        }
        if let Some(comment) = &patch.comment {
            feedback.comment = comment.clone();
        }
        if let Some(tags) = &patch.tags {
            feedback.tags = tags.clone();
        }

        conn.execute(
            "UPDATE feedback SET rating = ?1, comment = ?2, tags = ?3 WHERE id = ?4",
            params![
                feedback.rating,
                feedback.comment,
                serde_json::to_string(&feedback.tags)?,
                feedback.id,
            ],
        )
        .map_err(Error::from_sqlite)?;
        Ok(feedback)
    }

    pub fn delete_feedback(&self, actor: &str, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT f.id, f.event_id, f.response_id, f.rating, f.comment, f.tags
             FROM feedback f
             JOIN events e ON e.id = f.event_id
             WHERE {} AND f.id = ?",
            visible_pred("e.project_id")
        );
        let feedback = conn
            .query_row(&sql, params![actor, actor, id], Self::row_to_feedback)
            .optional()?
            .ok_or_else(|| Error::not_found("feedback", id))?;

        let event = fetch_visible_event(&conn, actor, &feedback.event_id)?;
        fetch_writable_project(&conn, actor, &event.project_id)?;

        conn.execute("DELETE FROM feedback WHERE id = ?", [id])?;
        Ok(())
    }

    // ============================================
    // Tag operations
    // ============================================

    pub fn create_tag(&self, actor: &str, new: &NewTag) -> Result<Tag> {
        let conn = self.conn.lock().unwrap();
        fetch_writable_project(&conn, actor, &new.project_id)?;

        let tag = Tag {
            id: new_id(),
            project_id: new.project_id.clone(),
            name: new.name.clone(),
            color: new
                .color
                .clone()
                .unwrap_or_else(|| DEFAULT_TAG_COLOR.to_string()),
        };
        conn.execute(
            "INSERT INTO tags (id, project_id, name, color) VALUES (?1, ?2, ?3, ?4)",
            params![tag.id, tag.project_id, tag.name, tag.color],
        )
        .map_err(Error::from_sqlite)?;
        Ok(tag)
    }

    pub fn list_tags(&self, actor: &str, filter: &TagFilter) -> Result<Vec<Tag>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!(
            "SELECT t.id, t.project_id, t.name, t.color FROM tags t WHERE {}",
            visible_pred("t.project_id")
        );
        let mut sql_params: SqlParams = vec![];
        push_actor(&mut sql_params, actor);

        if let Some(project_id) = &filter.project_id {
            sql.push_str(" AND t.project_id = ?");
            sql_params.push(Box::new(project_id.clone()));
        }
        sql.push_str(" ORDER BY t.name");

        let refs: Vec<&dyn rusqlite::ToSql> = sql_params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let tags = stmt
            .query_map(refs.as_slice(), Self::row_to_tag)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    pub fn get_tag(&self, actor: &str, id: &str) -> Result<Tag> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT t.id, t.project_id, t.name, t.color FROM tags t WHERE {} AND t.id = ?",
            visible_pred("t.project_id")
        );
        conn.query_row(&sql, params![actor, actor, id], Self::row_to_tag)
            .optional()?
            .ok_or_else(|| Error::not_found("tag", id))
    }

    pub fn update_tag(&self, actor: &str, id: &str, patch: &TagPatch) -> Result<Tag> {
        let conn = self.conn.lock().unwrap();
        let mut tag = {
            let sql = format!(
                "SELECT t.id, t.project_id, t.name, t.color FROM tags t WHERE {} AND t.id = ?",
                visible_pred("t.project_id")
            );
            conn.query_row(&sql, params![actor, actor, id], Self::row_to_tag)
                .optional()?
                .ok_or_else(|| Error::not_found("tag", id))?
        };
        fetch_writable_project(&conn, actor, &tag.project_id)?;

        if let Some(name) = &patch.name {
            tag.name = name.clone();
        }
        if let Some(color) = &patch.color {
            tag.color = color.clone();
        }

        conn.execute(
            "UPDATE tags SET name = ?1, color = ?2 WHERE id = ?3",
            params![tag.name, tag.color, tag.id],
        )
        .map_err(Error::from_sqlite)?;
        Ok(tag)
    }

    pub fn delete_tag(&self, actor: &str, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tag = {
            let sql = format!(
                "SELECT t.id, t.project_id, t.name, t.color FROM tags t WHERE {} AND t.id = ?",
                visible_pred("t.project_id")
            );
            conn.query_row(&sql, params![actor, actor, id], Self::row_to_tag)
                .optional()?
                .ok_or_else(|| Error::not_found("tag", id))?
        };
        fetch_writable_project(&conn, actor, &tag.project_id)?;
        conn.execute("DELETE FROM tags WHERE id = ?", [id])?;
        Ok(())
    }

    // ============================================
    // Dashboard operations
    // ============================================

    pub fn create_dashboard(&self, actor: &str, new: &NewDashboard) -> Result<DashboardDetail> {
        let conn = self.conn.lock().unwrap();
        fetch_writable_project(&conn, actor, &new.project_id)?;

        let now = Utc::now();
        let dashboard = Dashboard {
            id: new_id(),
            project_id: new.project_id.clone(),
            name: new.name.clone(),
            description: new.description.clone(),
            layout: new.layout.clone(),
            created_at: now,
            updated_at: now,
        };
        conn.execute(
            "INSERT INTO dashboards (id, project_id, name, description, layout, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                dashboard.id,
                dashboard.project_id,
                dashboard.name,
                dashboard.description,
                dashboard.layout.to_string(),
                dashboard.created_at.to_rfc3339(),
                dashboard.updated_at.to_rfc3339(),
            ],
        )
        .map_err(Error::from_sqlite)?;
        dashboard_detail(&conn, dashboard)
    }

    pub fn list_dashboards(
        &self,
        actor: &str,
        filter: &DashboardFilter,
    ) -> Result<Vec<DashboardDetail>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!(
            "SELECT d.id, d.project_id, d.name, d.description, d.layout, d.created_at, d.updated_at
             FROM dashboards d WHERE {}",
            visible_pred("d.project_id")
        );
        let mut sql_params: SqlParams = vec![];
        push_actor(&mut sql_params, actor);

        if let Some(project_id) = &filter.project_id {
            sql.push_str(" AND d.project_id = ?");
            sql_params.push(Box::new(project_id.clone()));
        }
        sql.push_str(" ORDER BY d.created_at DESC");

        let refs: Vec<&dyn rusqlite::ToSql> = sql_params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let dashboards = stmt
            .query_map(refs.as_slice(), Self::row_to_dashboard)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        dashboards
            .into_iter()
            .map(|d| dashboard_detail(&conn, d))
            .collect()
    }

    pub fn get_dashboard(&self, actor: &str, id: &str) -> Result<DashboardDetail> {
        let conn = self.conn.lock().unwrap();
        let dashboard = fetch_visible_dashboard(&conn, actor, id)?;
        dashboard_detail(&conn, dashboard)
    }

    pub fn update_dashboard(
        &self,
        actor: &str,
        id: &str,
        patch: &DashboardPatch,
    ) -> Result<DashboardDetail> {
        let conn = self.conn.lock().unwrap();
        let mut dashboard = fetch_visible_dashboard(&conn, actor, id)?;
        fetch_writable_project(&conn, actor, &dashboard.project_id)?;

        if let Some(name) = &patch.name {
            dashboard.name = name.clone();
        }
        if let Some(description) = &patch.description {
            dashboard.description = description.clone();
        }
        if let Some(layout) = &patch.layout {
            dashboard.layout = layout.clone();
        }
        dashboard.updated_at = Utc::now();

        conn.execute(
            "UPDATE dashboards SET name = ?1, description = ?2, layout = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                dashboard.name,
                dashboard.description,
                dashboard.layout.to_string(),
                dashboard.updated_at.to_rfc3339(),
                dashboard.id,
            ],
        )
        .map_err(Error::from_sqlite)?;
        dashboard_detail(&conn, dashboard)
    }

    pub fn delete_dashboard(&self, actor: &str, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let dashboard = fetch_visible_dashboard(&conn, actor, id)?;
        fetch_writable_project(&conn, actor, &dashboard.project_id)?;
        conn.execute("DELETE FROM dashboards WHERE id = ?", [id])?;
        Ok(())
    }

    // ============================================
    // Widget operations
    // ============================================

    pub fn create_widget(&self, actor: &str, new: &NewWidget) -> Result<Widget> {
        let conn = self.conn.lock().unwrap();
        let dashboard = fetch_visible_dashboard(&conn, actor, &new.dashboard_id)?;
        fetch_writable_project(&conn, actor, &dashboard.project_id)?;

        let widget = Widget {
            id: new_id(),
            dashboard_id: new.dashboard_id.clone(),
            title: new.title.clone(),
            widget_type: new.widget_type,
            query: new.query.clone(),
            position: new.position.clone(),
        };
        conn.execute(
            "INSERT INTO widgets (id, dashboard_id, title, widget_type, query, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                widget.id,
                widget.dashboard_id,
                widget.title,
                widget.widget_type.as_str(),
                widget.query.to_string(),
                widget.position.to_string(),
            ],
        )
        .map_err(Error::from_sqlite)?;
        Ok(widget)
    }

    pub fn list_widgets(&self, actor: &str, filter: &WidgetFilter) -> Result<Vec<Widget>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!(
            "SELECT w.id, w.dashboard_id, w.title, w.widget_type, w.query, w.position
             FROM widgets w
             JOIN dashboards d ON d.id = w.dashboard_id
             WHERE {}",
            visible_pred("d.project_id")
        );
        let mut sql_params: SqlParams = vec![];
        push_actor(&mut sql_params, actor);

        if let Some(dashboard_id) = &filter.dashboard_id {
            sql.push_str(" AND w.dashboard_id = ?");
            sql_params.push(Box::new(dashboard_id.clone()));
        }
        sql.push_str(" ORDER BY w.rowid");

        let refs: Vec<&dyn rusqlite::ToSql> = sql_params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let widgets = stmt
            .query_map(refs.as_slice(), Self::row_to_widget)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(widgets)
    }

    pub fn get_widget(&self, actor: &str, id: &str) -> Result<Widget> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT w.id, w.dashboard_id, w.title, w.widget_type, w.query, w.position
             FROM widgets w
             JOIN dashboards d ON d.id = w.dashboard_id
             WHERE {} AND w.id = ?",
            visible_pred("d.project_id")
        );
        conn.query_row(&sql, params![actor, actor, id], Self::row_to_widget)
            .optional()?
            .ok_or_else(|| Error::not_found("widget", id))
    }

    pub fn update_widget(&self, actor: &str, id: &str, patch: &WidgetPatch) -> Result<Widget> {
        let conn = self.conn.lock().unwrap();
        let mut widget = {
            let sql = format!(
                "SELECT w.id, w.dashboard_id, w.title, w.widget_type, w.query, w.position
                 FROM widgets w
                 JOIN dashboards d ON d.id = w.dashboard_id
                 WHERE {} AND w.id = ?",
                visible_pred("d.project_id")
            );
            conn.query_row(&sql, params![actor, actor, id], Self::row_to_widget)
                .optional()?
                .ok_or_else(|| Error::not_found("widget", id))?
        };
        let dashboard = fetch_visible_dashboard(&conn, actor, &widget.dashboard_id)?;
        fetch_writable_project(&conn, actor, &dashboard.project_id)?;

        if let Some(title) = &patch.title {
            widget.title = title.clone();
        }
        if let Some(widget_type) = patch.widget_type {
            widget.widget_type = widget_type;
        }
        if let Some(query) = &patch.query {
            widget.query = query.clone();
        }
        if let Some(position) = &patch.position {
            widget.position = position.clone();
        }

        conn.execute(
            "UPDATE widgets SET title = ?1, widget_type = ?2, query = ?3, position = ?4
             WHERE id = ?5",
            params![
                widget.title,
                widget.widget_type.as_str(),
                widget.query.to_string(),
                widget.position.to_string(),
                widget.id,
            ],
        )
        .map_err(Error::from_sqlite)?;
        Ok(widget)
    }

    pub fn delete_widget(&self, actor: &str, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let widget = {
            let sql = format!(
                "SELECT w.id, w.dashboard_id, w.title, w.widget_type, w.query, w.position
                 FROM widgets w
                 JOIN dashboards d ON d.id = w.dashboard_id
                 WHERE {} AND w.id = ?",
                visible_pred("d.project_id")
            );
            conn.query_row(&sql, params![actor, actor, id], Self::row_to_widget)
                .optional()?
                .ok_or_else(|| Error::not_found("widget", id))?
        };
        let dashboard = fetch_visible_dashboard(&conn, actor, &widget.dashboard_id)?;
        fetch_writable_project(&conn, actor, &dashboard.project_id)?;

        conn.execute("DELETE FROM widgets WHERE id = ?", [id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn user(db: &Database, username: &str) -> User {
        db.create_user(&NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            first_name: String::new(),
            last_name: String::new(),
        })
        .unwrap()
    }

    #[test]
    fn add_member_is_idempotent() {
        let db = test_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let project = db
            .create_project(&alice.id, &NewProject {
                name: "demo".into(),
                description: String::new(),
            })
            .unwrap();

        db.add_member(&alice.id, &project.project.id, &bob.id).unwrap();
        db.add_member(&alice.id, &project.project.id, &bob.id).unwrap();

        let detail = db.get_project(&alice.id, &project.project.id).unwrap();
        assert_eq!(detail.members.len(), 1);

        // Removing a non-member is a no-op, not an error
        db.remove_member(&alice.id, &project.project.id, &bob.id).unwrap();
        db.remove_member(&alice.id, &project.project.id, &bob.id).unwrap();
        let detail = db.get_project(&alice.id, &project.project.id).unwrap();
        assert!(detail.members.is_empty());
    }

    #[test]
    fn member_resolution_failure_is_not_found() {
        let db = test_db();
        let alice = user(&db, "alice");
        let project = db
            .create_project(&alice.id, &NewProject {
                name: "demo".into(),
                description: String::new(),
            })
            .unwrap();

        let err = db
            .add_member(&alice.id, &project.project.id, "no-such-user")
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { what: "user", .. }));
    }

    #[test]
    fn duplicate_session_key_conflicts() {
        let db = test_db();
        let alice = user(&db, "alice");
        let project = db
            .create_project(&alice.id, &NewProject {
                name: "demo".into(),
                description: String::new(),
            })
            .unwrap();

        let new = NewSession {
            project_id: project.project.id.clone(),
            user_id: None,
            session_key: "key-1".into(),
            start_time: None,
            metadata: None,
        };
        db.create_session(&alice.id, &new).unwrap();
        let err = db.create_session(&alice.id, &new).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn unknown_ordering_field_is_rejected() {
        let db = test_db();
        let alice = user(&db, "alice");
        let filter = ProjectFilter {
            search: None,
            ordering: Some("owner_id".into()),
        };
        let err = db.list_projects(&alice.id, &filter).unwrap_err();
        assert!(matches!(err, Error::Validation { field: "ordering", .. }));
    }

    #[test]
    fn invalid_bundle_leaves_no_orphan_event() {
        let db = test_db();
        let alice = user(&db, "alice");
        let project = db
            .create_project(&alice.id, &NewProject {
                name: "demo".into(),
                description: String::new(),
            })
            .unwrap();

        let err = db
            .create_event(&alice.id, &NewEvent {
                project_id: project.project.id.clone(),
                session_id: None,
                event_type: EventType::UserFeedback,
                timestamp: None,
                metadata: None,
                user_prompt: None,
                ai_response: None,
                feedback: Some(NewFeedback {
                    rating: Some(9),
                    comment: String::new(),
                    tags: vec![],
                }),
            })
            .unwrap_err();
        assert!(matches!(err, Error::Validation { field: "rating", .. }));

        let events = db
            .list_events(&alice.id, &EventFilter::default())
            .unwrap();
        assert!(events.is_empty(), "failed bundle must not create an event");
    }

    #[test]
    fn bundled_session_from_another_project_is_not_found() {
        let db = test_db();
        let alice = user(&db, "alice");
        let eve = user(&db, "eve");
        let alices = db
            .create_project(&alice.id, &NewProject {
                name: "alice's".into(),
                description: String::new(),
            })
            .unwrap();
        let eves = db
            .create_project(&eve.id, &NewProject {
                name: "eve's".into(),
                description: String::new(),
            })
            .unwrap();
        let hidden = db
            .create_session(&eve.id, &NewSession {
                project_id: eves.project.id.clone(),
                user_id: None,
                session_key: "hidden".into(),
                start_time: None,
                metadata: None,
            })
            .unwrap();

        let err = db
            .create_event(&alice.id, &NewEvent {
                project_id: alices.project.id.clone(),
                session_id: Some(hidden.id.clone()),
                event_type: EventType::Other,
                timestamp: None,
                metadata: None,
                user_prompt: None,
                ai_response: None,
                feedback: None,
            })
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { what: "session", .. }));

        let events = db.list_events(&alice.id, &EventFilter::default()).unwrap();
        assert!(events.is_empty());
    }
}
