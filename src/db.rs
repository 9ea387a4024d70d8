//! SQLite connection pool for the catalog and context tables.
//!
//! WAL journaling keeps tutoring-turn writes from blocking concurrent
//! document listings and context reads. The database file (and its parent
//! directory) is created on first connect.

use std::str::FromStr;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::config::DbConfig;

/// Small fixed pool: one writer at a time under WAL plus a few readers.
/// Tests that point at `sqlite::memory:` must size their own pool down to a
/// single connection, since every in-memory connection is its own database.
const MAX_CONNECTIONS: u32 = 5;

/// Open the database at the configured path, creating file and parent
/// directories if missing.
pub async fn connect(config: &DbConfig) -> Result<SqlitePool> {
    if let Some(parent) = config.path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    Ok(pool)
}
