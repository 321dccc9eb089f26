// SPDX-License-Identifier: MIT

//! Schema creation and versioning for the queue store.
//!
//! There is currently one schema generation. The version is still tracked
//! via `PRAGMA user_version` so a future column addition has somewhere to
//! hook an upgrade path without a format flag day.

use rusqlite::Connection;
use thiserror::Error;

pub const CURRENT_SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("sql error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("queue store is at schema version {found}, which is newer than this binary's {known}")]
    FutureSchema { found: i64, known: i64 },
}

/// Create the `tasks` table if missing and verify the stored schema version.
///
/// `id` is an autoincrement rowid alias, used as the record id that `parent`
/// refers back to; `priority`, `task`, `status`, `lock` and `parent` are the
/// persisted columns a client's `QUEUE_SHOW` walks directly.
pub fn ensure_schema(conn: &Connection) -> Result<(), MigrationError> {
    let version: i64 = conn.query_row("PRAGMA user_version", (), |row| row.get(0))?;

    if version == 0 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                priority INTEGER NOT NULL,
                task TEXT NOT NULL,
                status INTEGER NOT NULL,
                lock TEXT,
                parent INTEGER,
                UNIQUE(task, status)
            );
            CREATE INDEX IF NOT EXISTS tasks_priority_idx ON tasks(priority);
            CREATE INDEX IF NOT EXISTS tasks_status_idx ON tasks(status);",
        )?;
        conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
        return Ok(());
    }

    if version > CURRENT_SCHEMA_VERSION {
        return Err(MigrationError::FutureSchema {
            found: version,
            known: CURRENT_SCHEMA_VERSION,
        });
    }

    Ok(())
}
