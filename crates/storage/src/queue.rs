// SPDX-License-Identifier: MIT

//! The persistent task queue: a single SQLite table, opened once per worker
//! with no connection shared across threads or processes. Mutual exclusion
//! for claims comes from a transaction plus a compare-and-set on `lock`, not
//! from any in-process mutex.

use std::path::Path;
use std::thread;
use std::time::Duration;

use qop_core::{IdGen, LockToken, Task, TaskDtoError, TaskKind};
use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, warn};

use crate::migration::{self, MigrationError};
use crate::record::{KindFilter, Progress, Status};

/// Priority a freshly-enqueued task gets unless the caller overrides it.
/// Lower sorts earlier; a worker's spawned follow-up uses a priority below
/// this so it's claimed ahead of ordinary newly-submitted work.
pub const DEFAULT_PRIORITY: i64 = 10;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("sql error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("failed to open queue schema: {0}")]
    Migration(#[from] MigrationError),
    #[error("malformed task json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed task wire form: {0}")]
    Dto(#[from] TaskDtoError),
    #[error("record {0} was claimed by another worker before this one")]
    AlreadyClaimed(i64),
    #[error("record {0} not found")]
    NotFound(i64),
    #[error("record {0} holds an out-of-range status code {1}")]
    InvalidStatus(i64, i64),
}

/// A queued record as returned by `pop`/`peek`/`fetch`.
#[derive(Debug, Clone)]
pub struct Record {
    pub id: i64,
    pub priority: i64,
    pub task: Task,
    pub status: Status,
    pub lock: Option<LockToken>,
    pub parent: Option<i64>,
}

fn row_to_record(
    id: i64,
    priority: i64,
    task_json: String,
    status: i64,
    lock: Option<String>,
    parent: Option<i64>,
) -> Result<Record, QueueError> {
    let task: Task = serde_json::from_str(&task_json)?;
    let status = Status::from_i64(status).ok_or(QueueError::InvalidStatus(id, status))?;
    Ok(Record {
        id,
        priority,
        task,
        status,
        lock,
        parent,
    })
}

/// One worker's handle onto the queue file. Not `Send`/`Sync` — each worker
/// opens its own `Queue` against the same path rather than sharing one.
pub struct Queue {
    conn: Connection,
}

impl Queue {
    /// Open (creating if needed) the queue at `path` and ensure its schema.
    ///
    /// Does *not* touch row state: a worker or a request handler opens a
    /// fresh `Queue` for nearly every operation, and resetting `Active`
    /// rows here would stomp on tasks genuinely in flight under a sibling
    /// connection. Recovering rows orphaned by an unclean shutdown is the
    /// daemon's job, done once at startup via [`Queue::reset_active_tasks`]
    /// before any worker is spawned.
    pub fn open(path: &Path) -> Result<Self, QueueError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_millis(50))?;
        migration::ensure_schema(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory queue, for tests only.
    pub fn open_in_memory() -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory()?;
        migration::ensure_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Insert a task at `priority`, or resurrect it if an identical
    /// `(task, status)` row already exists (`UNIQUE(task, status)` makes
    /// re-enqueuing the same completed task idempotent rather than a
    /// constraint violation).
    pub fn put(&self, task: &Task, priority: i64, parent: Option<i64>) -> Result<i64, QueueError> {
        let task_json = serde_json::to_string(task)?;
        let id: i64 = self.conn.query_row(
            "INSERT INTO tasks (priority, task, status, lock, parent)
             VALUES (?1, ?2, ?3, NULL, ?4)
             ON CONFLICT(task, status) DO UPDATE SET priority = excluded.priority
             RETURNING id",
            (priority, &task_json, Status::Pending.as_i64(), parent),
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Claim the lowest-`priority` `Pending` record matching `filter`,
    /// tagging it with a fresh lock token from `id_gen` and marking it
    /// `Active`. Returns `Ok(None)` if nothing is eligible.
    ///
    /// Runs as a single transaction: select the candidate row, then update
    /// it conditioned on its `status` still being `Pending`. If zero rows
    /// are touched, something else claimed it between the select and the
    /// update and the caller gets `AlreadyClaimed` rather than a stale
    /// record, so it can retry against the next candidate.
    pub fn pop(
        &self,
        filter: KindFilter,
        id_gen: &impl IdGen,
    ) -> Result<Option<Record>, QueueError> {
        let tx = self.conn.unchecked_transaction()?;

        let row = {
            let (clause, kind) = match filter {
                KindFilter::None => (String::new(), None),
                KindFilter::Include(k) => (
                    "AND json_extract(task, '$.type') = ?1".to_string(),
                    Some(k),
                ),
                KindFilter::Exclude(k) => (
                    "AND json_extract(task, '$.type') != ?1".to_string(),
                    Some(k),
                ),
            };
            let sql = format!(
                "SELECT id, priority, task, status, lock, parent FROM tasks
                 WHERE status = {pending} {clause}
                 ORDER BY priority ASC, id ASC
                 LIMIT 1",
                pending = Status::Pending.as_i64(),
            );
            let candidate = match kind {
                Some(k) => tx
                    .query_row(&sql, [crate::record::wire_type_tag(k)], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    })
                    .optional()?,
                None => tx
                    .query_row(&sql, (), |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    })
                    .optional()?,
            };
            candidate
        };

        let Some((id, priority, task_json)) = row else {
            return Ok(None);
        };

        let token = id_gen.next();
        let claimed = tx.execute(
            "UPDATE tasks SET status = ?1, lock = ?2
             WHERE id = ?3 AND status = ?4",
            (Status::Active.as_i64(), &token, id, Status::Pending.as_i64()),
        )?;

        if claimed == 0 {
            tx.rollback()?;
            return Err(QueueError::AlreadyClaimed(id));
        }

        let parent: Option<i64> = tx.query_row(
            "SELECT parent FROM tasks WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;
        tx.commit()?;

        let record = row_to_record(
            id,
            priority,
            task_json,
            Status::Active.as_i64(),
            Some(token),
            parent,
        )?;
        debug!(record_id = id, "claimed task");
        Ok(Some(record))
    }

    /// Retry `pop` until it yields a record or the queue has nothing
    /// eligible, backing off on `AlreadyClaimed` contention rather than
    /// busy-spinning against other workers racing the same candidate.
    pub fn pop_with_retry(
        &self,
        filter: KindFilter,
        id_gen: &impl IdGen,
    ) -> Result<Option<Record>, QueueError> {
        let mut backoff = Duration::from_millis(5);
        loop {
            match self.pop(filter, id_gen) {
                Ok(record) => return Ok(record),
                Err(QueueError::AlreadyClaimed(id)) => {
                    warn!(record_id = id, "lost claim race, retrying");
                    thread::sleep(backoff);
                    backoff = (backoff * 2).min(Duration::from_millis(200));
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Update a record's terminal status. Used by a worker after `run()`,
    /// and to mirror a spawned child's terminal status onto its parent.
    pub fn set_status(&self, id: i64, status: Status) -> Result<(), QueueError> {
        let touched = self.conn.execute(
            "UPDATE tasks SET status = ?1, lock = NULL WHERE id = ?2",
            (status.as_i64(), id),
        )?;
        if touched == 0 {
            return Err(QueueError::NotFound(id));
        }
        Ok(())
    }

    /// Mirror a completed child's status onto its parent record, if any.
    pub fn propagate_to_parent(&self, parent_id: i64, status: Status) -> Result<(), QueueError> {
        self.set_status(parent_id, status)
    }

    pub fn fetch(&self, id: i64) -> Result<Record, QueueError> {
        self.conn
            .query_row(
                "SELECT id, priority, task, status, lock, parent FROM tasks WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                    ))
                },
            )
            .optional()?
            .ok_or(QueueError::NotFound(id))
            .and_then(|(id, priority, task_json, status, lock, parent)| {
                row_to_record(id, priority, task_json, status, lock, parent)
            })
    }

    /// All records, ordered the way they'd be claimed (highest priority,
    /// then insertion order). For `QUEUE_SHOW`.
    pub fn peek(&self, kind: TaskKind) -> Result<Vec<Record>, QueueError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, priority, task, status, lock, parent FROM tasks
             WHERE json_extract(task, '$.type') = ?1
             ORDER BY priority ASC, id ASC",
        )?;
        let rows = stmt
            .query_map([crate::record::wire_type_tag(kind)], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, priority, task_json, status, lock, parent)| {
                row_to_record(id, priority, task_json, status, lock, parent)
            })
            .collect()
    }

    /// All records regardless of kind, ordered the way they'd be claimed.
    /// For debugging; `QUEUE_SHOW` itself only ever lists `Active` rows.
    pub fn peek_all(&self) -> Result<Vec<Record>, QueueError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, priority, task, status, lock, parent FROM tasks
             ORDER BY priority ASC, id ASC",
        )?;
        let rows = stmt
            .query_map((), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, priority, task_json, status, lock, parent)| {
                row_to_record(id, priority, task_json, status, lock, parent)
            })
            .collect()
    }

    /// Every currently-`Active` record, ordered the way it would have been
    /// claimed. Backs `QUEUE_SHOW`: the one view a client gets into what's
    /// in flight right now, as opposed to the full history `peek_all`
    /// exposes for debugging.
    pub fn peek_active(&self) -> Result<Vec<Record>, QueueError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, priority, task, status, lock, parent FROM tasks
             WHERE status = ?1
             ORDER BY priority ASC, id ASC",
        )?;
        let rows = stmt
            .query_map([Status::Active.as_i64()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, priority, task_json, status, lock, parent)| {
                row_to_record(id, priority, task_json, status, lock, parent)
            })
            .collect()
    }

    /// Aggregate counts by status. Spawned children (non-null `parent`) are
    /// excluded by default since their status is mirrored onto the parent
    /// and counting both would double-count the same logical operation.
    pub fn progress(&self, include_children: bool) -> Result<Progress, QueueError> {
        let clause = if include_children {
            ""
        } else {
            "WHERE parent IS NULL"
        };
        let sql = format!("SELECT status, COUNT(*) FROM tasks {clause} GROUP BY status");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut progress = Progress::default();
        let rows = stmt.query_map((), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, u64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            progress.total += count;
            match Status::from_i64(status) {
                Some(Status::Pending) => progress.pending = count,
                Some(Status::Ok) => progress.ok = count,
                Some(Status::Skip) => progress.skip = count,
                Some(Status::Active) => progress.active = count,
                Some(Status::Fail) => progress.fail = count,
                None => {}
            }
        }
        Ok(progress)
    }

    /// Remove every `Pending` record. Active/terminal records are untouched.
    pub fn flush_pending(&self) -> Result<u64, QueueError> {
        let n = self
            .conn
            .execute("DELETE FROM tasks WHERE status = ?1", [Status::Pending.as_i64()])?;
        Ok(n as u64)
    }

    /// Remove every record regardless of status.
    pub fn flush_all(&self) -> Result<u64, QueueError> {
        let n = self.conn.execute("DELETE FROM tasks", ())?;
        Ok(n as u64)
    }

    /// Reset every `Active` record back to `Pending` and clear its lock.
    /// Called once by the daemon at startup, before the worker pool spawns,
    /// to recover records orphaned by a worker that died mid-claim in a
    /// previous run.
    pub fn reset_active_tasks(&self) -> Result<u64, QueueError> {
        let n = self.conn.execute(
            "UPDATE tasks SET status = ?1, lock = NULL WHERE status = ?2",
            (Status::Pending.as_i64(), Status::Active.as_i64()),
        )?;
        if n > 0 {
            debug!(count = n, "reset orphaned active tasks to pending");
        }
        Ok(n as u64)
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
