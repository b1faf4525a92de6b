//! SQLite connection management for the on-disk index.
//!
//! Every index directory holds a single database file. Connections use WAL
//! mode so queries keep reading the live alias while a rebuild writes a new
//! name space.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Open a pool on `db_path`.
///
/// With `create` set, the file and its parent directories are created when
/// missing; otherwise a missing file is an error.
pub async fn connect(db_path: &Path, create: bool) -> Result<SqlitePool> {
    if create {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create index directory: {}", parent.display())
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open index database: {}", db_path.display()))?;

    Ok(pool)
}
