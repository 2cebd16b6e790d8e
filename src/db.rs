use std::path::Path;

use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;

use crate::error::{NanatechError, Result};

const BUSY_TIMEOUT_PRAGMA: &str = "PRAGMA busy_timeout = 5000";

pub fn ensure_parent_dir(path: &str) -> Result<()> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                NanatechError::Store(format!(
                    "Failed to create database directory {}: {e}",
                    parent.to_string_lossy()
                ))
            })?;
        }
    }
    Ok(())
}

pub fn open_connection_sync(database_url: &str) -> Result<SqliteConnection> {
    let mut conn = SqliteConnection::establish(database_url)
        .map_err(|e| NanatechError::Store(e.to_string()))?;
    diesel::RunQueryDsl::execute(diesel::sql_query(BUSY_TIMEOUT_PRAGMA), &mut conn)
        .map_err(|e| NanatechError::Store(e.to_string()))?;
    if let Err(err) =
        diesel::RunQueryDsl::execute(diesel::sql_query("PRAGMA journal_mode = WAL"), &mut conn)
    {
        tracing::debug!("Unable to switch SQLite journal to WAL: {}", err);
    }
    Ok(conn)
}

pub async fn apply_connection_pragmas_async(
    conn: &mut SyncConnectionWrapper<SqliteConnection>,
) -> Result<()> {
    diesel_async::RunQueryDsl::execute(diesel::sql_query(BUSY_TIMEOUT_PRAGMA), conn)
        .await
        .map_err(|e| NanatechError::Store(e.to_string()))?;
    Ok(())
}
