//! Database initialization and schema migrations.

use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::{debug, info};

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Tables the ledger engine cannot run without.
pub const REQUIRED_TABLES: [&str; 4] = ["leagues", "entries", "wallets", "transactions"];

/// Open (creating if needed) the SQLite database, configure pragmas and apply the schema.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .after_connect(|conn, _meta| Box::pin(async move { configure_connection(conn).await }))
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    apply_schema(&pool).await?;

    info!(path = %db_path, "Ledger database ready");
    Ok(pool)
}

/// Schema statements with comment lines removed.
fn schema_statements() -> Vec<String> {
    SCHEMA_SQL
        .split(';')
        .map(|chunk| {
            chunk
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .map(|stmt| stmt.trim().to_string())
        .filter(|stmt| !stmt.is_empty())
        .collect()
}

/// Apply every schema statement. All statements are `IF NOT EXISTS`, so re-running is safe.
async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let statements = schema_statements();
    debug!(statements = statements.len(), "Applying schema");

    for statement in &statements {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// Per-connection pragmas: foreign keys, WAL and a busy timeout so concurrent
/// writers queue on the database lock instead of failing.
async fn configure_connection(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 10000")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&mut *conn)
        .await?;
    Ok(())
}
