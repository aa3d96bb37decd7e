//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: initial schema
    r#"
    -- ============================================
    -- Identities
    -- ============================================

    CREATE TABLE IF NOT EXISTS users (
        id               TEXT PRIMARY KEY,
        username         TEXT NOT NULL UNIQUE,
        email            TEXT NOT NULL DEFAULT '',
        first_name       TEXT NOT NULL DEFAULT '',
        last_name        TEXT NOT NULL DEFAULT '',
        api_token        TEXT NOT NULL UNIQUE,
        created_at       DATETIME NOT NULL
    );

    -- ============================================
    -- Projects (root of all partitioning)
    -- ============================================

    CREATE TABLE IF NOT EXISTS projects (
        id               TEXT PRIMARY KEY,
        name             TEXT NOT NULL,
        description      TEXT NOT NULL DEFAULT '',
        created_at       DATETIME NOT NULL,
        updated_at       DATETIME NOT NULL,
        owner_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE
    );

    -- Membership is a set: composite primary key makes concurrent
    -- add/remove commutative and idempotent.
    CREATE TABLE IF NOT EXISTS project_members (
        project_id       TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        user_id          TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        PRIMARY KEY (project_id, user_id)
    );

    -- ============================================
    -- Sessions and events
    -- ============================================

    CREATE TABLE IF NOT EXISTS sessions (
        id               TEXT PRIMARY KEY,
        project_id       TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        user_id          TEXT,
        session_key      TEXT NOT NULL UNIQUE,
        start_time       DATETIME NOT NULL,
        end_time         DATETIME,
        metadata         JSON NOT NULL DEFAULT '{}'
    );

    CREATE TABLE IF NOT EXISTS events (
        id               TEXT PRIMARY KEY,
        project_id       TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        session_id       TEXT REFERENCES sessions(id) ON DELETE CASCADE,
        event_type       TEXT NOT NULL,
        timestamp        DATETIME NOT NULL,
        metadata         JSON NOT NULL DEFAULT '{}'
    );

    -- 1:1 sub-records of an event; the event_id UNIQUE constraints
    -- enforce "at most one each per event".
    CREATE TABLE IF NOT EXISTS user_prompts (
        id               TEXT PRIMARY KEY,
        event_id         TEXT NOT NULL UNIQUE REFERENCES events(id) ON DELETE CASCADE,
        prompt_text      TEXT NOT NULL,
        model_name       TEXT NOT NULL DEFAULT '',
        tokens           INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS ai_responses (
        id               TEXT PRIMARY KEY,
        event_id         TEXT NOT NULL UNIQUE REFERENCES events(id) ON DELETE CASCADE,
        prompt_id        TEXT REFERENCES user_prompts(id) ON DELETE CASCADE,
        response_text    TEXT NOT NULL,
        model_name       TEXT NOT NULL DEFAULT '',
        tokens           INTEGER NOT NULL DEFAULT 0,
        latency          REAL NOT NULL DEFAULT 0.0
    );

    CREATE TABLE IF NOT EXISTS feedback (
        id               TEXT PRIMARY KEY,
        event_id         TEXT NOT NULL UNIQUE REFERENCES events(id) ON DELETE CASCADE,
        response_id      TEXT REFERENCES ai_responses(id) ON DELETE CASCADE,
        rating           INTEGER,
        comment          TEXT NOT NULL DEFAULT '',
        tags             JSON NOT NULL DEFAULT '[]',

        CHECK (rating IS NULL OR (rating >= 1 AND rating <= 5))
    );

    -- ============================================
    -- Tags, dashboards, widgets
    -- ============================================

    CREATE TABLE IF NOT EXISTS tags (
        id               TEXT PRIMARY KEY,
        project_id       TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        name             TEXT NOT NULL,
        color            TEXT NOT NULL DEFAULT '#3498db',

        UNIQUE(project_id, name)
    );

    CREATE TABLE IF NOT EXISTS dashboards (
        id               TEXT PRIMARY KEY,
        project_id       TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        name             TEXT NOT NULL,
        description      TEXT NOT NULL DEFAULT '',
        layout           JSON NOT NULL DEFAULT '{}',
        created_at       DATETIME NOT NULL,
        updated_at       DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS widgets (
        id               TEXT PRIMARY KEY,
        dashboard_id     TEXT NOT NULL REFERENCES dashboards(id) ON DELETE CASCADE,
        title            TEXT NOT NULL,
        widget_type      TEXT NOT NULL,
        query            JSON NOT NULL DEFAULT '{}',
        position         JSON NOT NULL DEFAULT '{}'
    );

    -- ============================================
    -- Indexes
    -- ============================================

    CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner_id);
    CREATE INDEX IF NOT EXISTS idx_members_user ON project_members(user_id);
    CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project_id);
    CREATE INDEX IF NOT EXISTS idx_sessions_start ON sessions(start_time DESC);
    CREATE INDEX IF NOT EXISTS idx_events_project ON events(project_id);
    CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id);
    CREATE INDEX IF NOT EXISTS idx_events_ts ON events(timestamp DESC);
    CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
    CREATE INDEX IF NOT EXISTS idx_responses_prompt ON ai_responses(prompt_id);
    CREATE INDEX IF NOT EXISTS idx_feedback_response ON feedback(response_id);
    CREATE INDEX IF NOT EXISTS idx_tags_project ON tags(project_id);
    CREATE INDEX IF NOT EXISTS idx_dashboards_project ON dashboards(project_id);
    CREATE INDEX IF NOT EXISTS idx_widgets_dashboard ON widgets(dashboard_id);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Run migrations twice - should be idempotent
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables = [
            "users",
            "projects",
            "project_members",
            "sessions",
            "events",
            "user_prompts",
            "ai_responses",
            "feedback",
            "tags",
            "dashboards",
            "widgets",
        ];

        for table in tables {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_rating_range_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO users (id, username, api_token, created_at) VALUES ('u1', 'a', 't', datetime('now'))",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO projects (id, name, created_at, updated_at, owner_id)
             VALUES ('p1', 'demo', datetime('now'), datetime('now'), 'u1')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO events (id, project_id, event_type, timestamp)
             VALUES ('e1', 'p1', 'user_feedback', datetime('now'))",
            [],
        )
        .unwrap();

        let out_of_range = conn.execute(
            "INSERT INTO feedback (id, event_id, rating) VALUES ('f1', 'e1', 6)",
            [],
        );
        assert!(out_of_range.is_err(), "rating 6 should violate the CHECK");

        conn.execute(
            "INSERT INTO feedback (id, event_id, rating) VALUES ('f1', 'e1', NULL)",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_one_subrecord_per_event() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        conn.execute_batch(
            "INSERT INTO users (id, username, api_token, created_at) VALUES ('u1', 'a', 't', datetime('now'));
             INSERT INTO projects (id, name, created_at, updated_at, owner_id)
                 VALUES ('p1', 'demo', datetime('now'), datetime('now'), 'u1');
             INSERT INTO events (id, project_id, event_type, timestamp)
                 VALUES ('e1', 'p1', 'user_prompt', datetime('now'));
             INSERT INTO user_prompts (id, event_id, prompt_text) VALUES ('up1', 'e1', 'hi');",
        )
        .unwrap();

        let second = conn.execute(
            "INSERT INTO user_prompts (id, event_id, prompt_text) VALUES ('up2', 'e1', 'again')",
            [],
        );
        assert!(second.is_err(), "a second prompt on the same event should conflict");
    }
}
