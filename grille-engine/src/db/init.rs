//! Database initialization

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize the database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    // WAL mode allows the orchestrator to read while the coordinator writes
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    // Idempotent - safe to call multiple times
    create_storage_table(&pool).await?;

    Ok(pool)
}

/// One row per residence with unsynced inspection state
async fn create_storage_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS storage (
            residence_id TEXT PRIMARY KEY,
            control_date TEXT NOT NULL,
            proximity INTEGER NOT NULL DEFAULT 0,
            contract INTEGER NOT NULL DEFAULT 0,
            inspection_type TEXT NOT NULL DEFAULT '',
            snapshot TEXT NOT NULL,
            signature_count INTEGER NOT NULL DEFAULT 0,
            signature_agent TEXT NOT NULL DEFAULT '',
            plan_due_date TEXT,
            plan_text TEXT NOT NULL DEFAULT '',
            plan_validated INTEGER NOT NULL DEFAULT 0,
            send_destinations TEXT NOT NULL DEFAULT '[]',
            send_reference TEXT NOT NULL DEFAULT '',
            send_source TEXT NOT NULL DEFAULT '',
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
