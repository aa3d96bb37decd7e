use promptscope_core::types::NewUser;
use promptscope_core::{logging, Config, Database};
use promptscope_server::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging; the guard must outlive the server
    let _logging_guard = logging::init(&config.logging)?;

    tracing::info!("Starting promptscope server");

    // Open database and run migrations
    let db_path = config.resolved_database_path();
    tracing::info!(path = %db_path.display(), "Opening database");
    let db = Database::open(&db_path)?;
    db.migrate()?;

    bootstrap_admin(&db)?;

    let addr = config.server.bind_addr();
    let state = AppState::new(config, db);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create an initial admin user when the user table is empty, and log
/// its token once so a fresh deployment can authenticate.
fn bootstrap_admin(db: &Database) -> anyhow::Result<()> {
    if db.user_count()? > 0 {
        return Ok(());
    }

    let admin = db.create_user(&NewUser {
        username: "admin".to_string(),
        email: String::new(),
        first_name: String::new(),
        last_name: String::new(),
    })?;

    tracing::warn!(
        username = %admin.username,
        token = %admin.api_token,
        "No users found; created initial admin. Store this token, it will not be shown again."
    );
    Ok(())
}
