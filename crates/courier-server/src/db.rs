//! SQLite pool bootstrap and schema migration.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

/// Open a connection pool for the given database path.
///
/// `:memory:` opens an ephemeral database; it is pinned to a single
/// connection because every new in-memory connection would otherwise see
/// its own empty database.
pub async fn connect(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    let in_memory = db_path == ":memory:";
    let url = if in_memory {
        "sqlite::memory:".to_string()
    } else {
        format!("sqlite://{db_path}")
    };

    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 5 })
        .connect_with(options)
        .await?;

    info!(db_path = %db_path, "Database pool initialized");
    Ok(pool)
}

/// Apply the schema.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(SCHEMA).execute(pool).await?;
    info!("Database migrations complete");
    Ok(())
}
