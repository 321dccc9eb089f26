// SPDX-License-Identifier: MIT

//! The worker loop: claim a task, run it, record its outcome, enqueue any
//! follow-up, and repeat until told to stop.
//!
//! Each worker owns a single `rusqlite::Connection` via its own `Queue`
//! handle rather than sharing one across tasks — `Queue` wraps a
//! non-`Send`-across-await-points connection, so it's moved into and back
//! out of a `spawn_blocking` closure every iteration instead of held across
//! an `.await`.

use std::path::PathBuf;
use std::time::Duration;

use qop_core::{IdGen, Task};
use qop_storage::{KindFilter, Queue, Record, Status};
use tokio::sync::watch;
use tokio::task::spawn_blocking;
use tracing::{error, info, warn};

use crate::error::EngineError;

/// Which half of the two-class worker pool a worker belongs to. Transfer
/// workers handle every kind except `Convert`; convert workers handle only
/// `Convert`, since transcoding is the CPU-bound half of the workload and
/// gets its own, separately-sized pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerClass {
    Transfer,
    Convert,
}

impl WorkerClass {
    pub fn label(self) -> &'static str {
        match self {
            WorkerClass::Transfer => "transfer",
            WorkerClass::Convert => "convert",
        }
    }

    fn kind_filter(self) -> KindFilter {
        match self {
            WorkerClass::Transfer => KindFilter::Exclude(qop_core::TaskKind::Convert),
            WorkerClass::Convert => KindFilter::Include(qop_core::TaskKind::Convert),
        }
    }
}

/// Priority assigned to a task spawned as a follow-up of another (the
/// `Move` out of a convert's staging area). Follow-ups jump ahead of
/// ordinary newly-submitted work so a convert's two halves land close
/// together in the log instead of a freshly-queued batch sneaking in
/// between them.
const SPAWNED_TASK_PRIORITY: i64 = -1;

/// How long an idle worker sleeps between empty polls of the queue.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Run one worker until `shutdown` reports `true`.
///
/// `worker_id` is only used for log correlation; it has no effect on which
/// records this worker is eligible to claim (that's entirely `class` plus
/// what's actually `Pending` in the queue).
///
/// No explicit daemon-liveness probe: a worker here is a `tokio` task owned
/// by the daemon's own process rather than a forked child that could outlive
/// it, so "exit once the daemon is unreachable" holds by construction — the
/// runtime (and every task in it) goes away the instant the daemon process
/// does. See DESIGN.md for this substitution.
#[allow(clippy::expect_used)]
pub async fn run_worker(
    worker_id: usize,
    class: WorkerClass,
    queue_path: PathBuf,
    id_gen: impl IdGen + 'static,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), EngineError> {
    let mut queue = open_queue(&queue_path).await?;
    info!(worker_id, class = class.label(), "worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let filter = class.kind_filter();
        let gen = id_gen.clone();
        let (returned_queue, popped) = spawn_blocking(move || {
            let popped = queue.pop_with_retry(filter, &gen);
            (queue, popped)
        })
        .await
        .expect("worker thread panicked during pop");
        queue = returned_queue;

        let record = match popped {
            Ok(Some(record)) => record,
            Ok(None) => {
                if wait_or_shutdown(&mut shutdown, IDLE_POLL_INTERVAL).await {
                    break;
                }
                continue;
            }
            Err(err) => {
                error!(worker_id, error = %err, "pop failed");
                if wait_or_shutdown(&mut shutdown, IDLE_POLL_INTERVAL).await {
                    break;
                }
                continue;
            }
        };

        let (returned_queue, result) = spawn_blocking(move || {
            let outcome = process_record(&queue, &record);
            (queue, outcome)
        })
        .await
        .expect("worker thread panicked running task");
        queue = returned_queue;

        if let Err(err) = result {
            error!(worker_id, error = %err, "failed to finalize task");
        }
    }

    info!(worker_id, class = class.label(), "worker stopped");
    Ok(())
}

#[allow(clippy::expect_used)]
async fn open_queue(path: &std::path::Path) -> Result<Queue, EngineError> {
    let path = path.to_path_buf();
    spawn_blocking(move || Queue::open(&path))
        .await
        .expect("worker thread panicked opening queue")
        .map_err(EngineError::from)
}

/// Returns `true` if shutdown fired while waiting.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, timeout: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(timeout) => false,
        changed = shutdown.changed() => changed.is_ok() && *shutdown.borrow(),
    }
}

/// Run a claimed record to completion, record its terminal status, and
/// enqueue any follow-up task it spawns.
fn process_record(queue: &Queue, record: &Record) -> Result<(), EngineError> {
    let status = match record.task.run() {
        Ok(qop_core::RunOutcome::Completed) => Status::Ok,
        Ok(qop_core::RunOutcome::Skipped) => Status::Skip,
        Err(err) => {
            warn!(record_id = record.id, error = %err, "task failed");
            Status::Fail
        }
    };

    queue.set_status(record.id, status)?;

    // A record with a parent is itself a spawned follow-up (currently only
    // the `Move` out of a convert's staging area); its terminal status
    // overwrites the parent's, so the parent's own row — what a client
    // actually asked for — reflects whether the *whole* operation landed,
    // not just its first half.
    if let Some(parent_id) = record.parent {
        queue.propagate_to_parent(parent_id, status)?;
    }

    // Only a clean success spawns a follow-up: a `Convert` that was skipped
    // never wrote `tmpdst`, and one that failed may have left a corrupt
    // partial file there — either way the Move must not run.
    if status == Status::Ok {
        if let Some(follow_up) = record.task.spawn(record.id) {
            enqueue_follow_up(queue, &follow_up, record.id)?;
        }
    }

    Ok(())
}

fn enqueue_follow_up(queue: &Queue, task: &Task, parent_id: i64) -> Result<(), EngineError> {
    queue.put(task, SPAWNED_TASK_PRIORITY, Some(parent_id))?;
    Ok(())
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
