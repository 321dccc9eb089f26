// SPDX-License-Identifier: MIT

//! The TCP listener: accepts one connection at a time, reads a single
//! request, dispatches it against the queue and worker pool, and writes
//! back a single response before the connection closes.
//!
//! The worker pool auto-starts at daemon startup and after every
//! `QUEUE_START`; `QUEUE_STOP` turns it off until explicitly restarted.
//! Every dispatched request rebalances the pool back up to its configured
//! size first, so a worker that panicked gets respawned without anyone
//! having to notice and ask for it.

use std::net::SocketAddr;
use std::path::PathBuf;

use qop_core::{Task, UuidIdGen, Validation};
use qop_engine::{PoolConfig, WorkerPool};
use qop_storage::{Queue, QueueError, DEFAULT_PRIORITY};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};
use tokio::task::spawn_blocking;
use tracing::{info, warn};

use crate::config::Config;
use crate::protocol::{Command, PayloadClass, Request, Response, Status as WireStatus};
use crate::protocol_wire::{self, ProtocolError};

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to recover the queue at startup: {0}")]
    Queue(#[from] QueueError),
}

struct PoolState {
    pool: WorkerPool<UuidIdGen>,
    config: PoolConfig,
    enabled: bool,
}

struct Ctx {
    queue_path: PathBuf,
    persist_queue: bool,
    port: u16,
    state: Mutex<PoolState>,
    shutdown: Notify,
}

/// The daemon, bound to its TCP port but not yet serving.
pub struct Daemon {
    config: Config,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Bind and serve connections until a `DAEMON_STOP` request arrives.
    pub async fn serve(self) -> Result<(), DaemonError> {
        let addr: SocketAddr = ([127, 0, 0, 1], self.config.port).into();
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "qopd listening");

        let ctx = std::sync::Arc::new(Ctx {
            queue_path: self.config.queue_path.clone(),
            persist_queue: self.config.persist_queue,
            port: self.config.port,
            state: Mutex::new(PoolState {
                pool: WorkerPool::new(self.config.queue_path.clone(), UuidIdGen),
                config: self.config.pool_config(),
                enabled: true,
            }),
            shutdown: Notify::new(),
        });

        recover_orphaned_tasks(&ctx).await?;
        ensure_started(&ctx).await;

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) = accepted?;
                    let ctx = std::sync::Arc::clone(&ctx);
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, &ctx).await {
                            match err {
                                ProtocolError::ConnectionClosed => {}
                                other => warn!(error = %other, "connection error"),
                            }
                        }
                    });
                }
                _ = ctx.shutdown.notified() => {
                    info!("stop requested, draining worker pool");
                    ctx.state.lock().await.pool.stop().await;
                    break;
                }
            }
        }

        if !ctx.persist_queue {
            match std::fs::remove_file(&ctx.queue_path) {
                Ok(()) => info!(path = %ctx.queue_path.display(), "removed non-persistent queue store"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!(path = %ctx.queue_path.display(), error = %err, "failed to remove queue store"),
            }
        }

        info!("qopd stopped");
        Ok(())
    }
}

async fn handle_connection(mut stream: TcpStream, ctx: &Ctx) -> Result<(), ProtocolError> {
    let (mut reader, mut writer) = stream.split();
    let request = protocol_wire::read_request(&mut reader).await?;
    info!(command = ?request.command, "received request");
    let response = dispatch(request, ctx).await;
    protocol_wire::write_response(&mut writer, &response).await?;
    Ok(())
}

async fn dispatch(req: Request, ctx: &Ctx) -> Response {
    rebalance(ctx).await;

    match req.command {
        Command::DaemonStart => {
            Response::fail("the daemon is already running; it cannot be started again over the wire")
        }
        Command::DaemonStop => {
            ctx.shutdown.notify_one();
            Response::ok("stopping")
        }
        Command::DaemonIsActive => {
            Response::with_payload(WireStatus::Ok, json!({"value": true}), PayloadClass::Value)
        }
        Command::DaemonFacts => handle_daemon_facts(ctx).await,
        Command::QueueStart => {
            ensure_started(ctx).await;
            Response::ok("queue started")
        }
        Command::QueueStop => {
            stop_pool(ctx).await;
            Response::ok("queue stopped")
        }
        Command::QueueIsActive => {
            let state = ctx.state.lock().await;
            Response::with_payload(
                WireStatus::Ok,
                json!({"value": state.pool.is_running()}),
                PayloadClass::Value,
            )
        }
        Command::QueuePut => handle_queue_put(req.payload, ctx).await,
        Command::QueueFlushPending => handle_flush(ctx, false).await,
        Command::QueueFlushAll => handle_flush(ctx, true).await,
        Command::QueueProgress => handle_progress(ctx).await,
        Command::QueueActiveProcesses => handle_active_processes(ctx).await,
        Command::QueueMaxProcesses => handle_max_processes(req.payload, ctx).await,
        Command::QueueShow => handle_queue_show(ctx).await,
    }
}

/// Bring the pool back up to its configured size if it's supposed to be
/// running but isn't (e.g. every worker in a class panicked).
async fn rebalance(ctx: &Ctx) {
    let mut state = ctx.state.lock().await;
    if state.enabled && !state.pool.is_running() {
        state.pool.start(state.config);
    }
}

/// Reset any `Active` rows left over from a previous, uncleanly-stopped
/// run back to `Pending`, once, before the worker pool starts claiming
/// work. Per-request handlers must never do this themselves — see
/// [`Queue::open`]'s doc comment.
#[allow(clippy::expect_used)]
async fn recover_orphaned_tasks(ctx: &Ctx) -> Result<(), DaemonError> {
    let path = ctx.queue_path.clone();
    let reset = spawn_blocking(move || {
        let queue = Queue::open(&path)?;
        queue.reset_active_tasks()
    })
    .await
    .expect("queue worker thread panicked")?;
    if reset > 0 {
        info!(count = reset, "reset orphaned active tasks from a previous run");
    }
    Ok(())
}

async fn ensure_started(ctx: &Ctx) {
    let mut state = ctx.state.lock().await;
    state.enabled = true;
    if !state.pool.is_running() {
        state.pool.start(state.config);
    }
}

async fn stop_pool(ctx: &Ctx) {
    let mut state = ctx.state.lock().await;
    state.enabled = false;
    state.pool.stop().await;
}

/// Run a blocking queue operation against a fresh connection to the
/// shared queue file. Every dispatch opens its own `Queue` rather than
/// holding one across requests, the same one-connection-per-caller model
/// each worker uses.
#[allow(clippy::expect_used)]
async fn open_and<T, F>(ctx: &Ctx, f: F) -> Result<T, QueueError>
where
    T: Send + 'static,
    F: FnOnce(&Queue) -> Result<T, QueueError> + Send + 'static,
{
    let path = ctx.queue_path.clone();
    spawn_blocking(move || {
        let queue = Queue::open(&path)?;
        f(&queue)
    })
    .await
    .expect("queue worker thread panicked")
}

async fn handle_daemon_facts(ctx: &Ctx) -> Response {
    let (transfer, convert) = {
        let state = ctx.state.lock().await;
        (
            state.pool.active_transfer_workers(),
            state.pool.active_convert_workers(),
        )
    };
    let progress = match open_and(ctx, |q| q.progress(false)).await {
        Ok(p) => p,
        Err(err) => return Response::fail(format!("failed to read queue: {err}")),
    };
    Response::with_payload(
        WireStatus::Ok,
        json!({
            "port": ctx.port,
            "queue": {
                "path": ctx.queue_path,
                "persist": ctx.persist_queue,
            },
            "processes": { "transfer": transfer, "convert": convert },
            "tasks": progress_json(progress),
        }),
        PayloadClass::DaemonFacts,
    )
}

async fn handle_queue_put(payload: Option<Value>, ctx: &Ctx) -> Response {
    let Some(payload) = payload else {
        return Response::fail("QUEUE_PUT requires a task payload");
    };
    let task: Task = match serde_json::from_value(payload) {
        Ok(t) => t,
        Err(err) => return Response::fail(format!("malformed task: {err}")),
    };

    // Validated here, synchronously, before the row ever reaches a worker —
    // a client gets SKIP/FAIL immediately rather than having to poll
    // QUEUE_PROGRESS to discover its task was never runnable.
    match task.validate() {
        Validation::Ok => {}
        Validation::FileExistsIdentical | Validation::FileExistsCannotCompare => {
            return Response::skip("destination already matches source");
        }
        Validation::FileNotFound => return Response::fail("source does not exist"),
        Validation::InvalidSrcType => {
            return Response::fail("source is neither a file nor a directory")
        }
        Validation::FileExistsDiffers => {
            return Response::fail("destination exists and differs from source")
        }
    }

    let to_insert = task.clone();
    match open_and(ctx, move |q| q.put(&to_insert, DEFAULT_PRIORITY, None)).await {
        Ok(id) => Response::with_payload(
            WireStatus::Ok,
            json!({"id": id, "task": task}),
            PayloadClass::Task,
        ),
        Err(err) => Response::fail(format!("failed to enqueue: {err}")),
    }
}

async fn handle_flush(ctx: &Ctx, all: bool) -> Response {
    let result = if all {
        open_and(ctx, |q| q.flush_all()).await
    } else {
        open_and(ctx, |q| q.flush_pending()).await
    };
    match result {
        Ok(n) => Response::with_payload(WireStatus::Ok, json!({"value": n}), PayloadClass::Value),
        Err(err) => Response::fail(format!("failed to flush: {err}")),
    }
}

async fn handle_progress(ctx: &Ctx) -> Response {
    match open_and(ctx, |q| q.progress(false)).await {
        Ok(p) => Response::with_payload(WireStatus::Ok, progress_json(p), PayloadClass::QueueProgress),
        Err(err) => Response::fail(format!("failed to read progress: {err}")),
    }
}

async fn handle_active_processes(ctx: &Ctx) -> Response {
    let state = ctx.state.lock().await;
    Response::with_payload(
        WireStatus::Ok,
        json!({
            "transfer": state.pool.active_transfer_workers(),
            "convert": state.pool.active_convert_workers(),
        }),
        PayloadClass::Value,
    )
}

/// Get or set the convert pool's target size. A request with no payload
/// just reads the current value; `{"value": N}` resizes it.
async fn handle_max_processes(payload: Option<Value>, ctx: &Ctx) -> Response {
    let requested = payload
        .as_ref()
        .and_then(|v| v.get("value"))
        .and_then(Value::as_u64);

    let mut state = ctx.state.lock().await;
    if let Some(n) = requested {
        let n = n as usize;
        state.config.convert_size = n;
        if state.enabled {
            if let Err(err) = state.pool.resize_convert(n).await {
                return Response::fail(format!("failed to resize convert pool: {err}"));
            }
        }
    }
    Response::with_payload(
        WireStatus::Ok,
        json!({"value": state.config.convert_size}),
        PayloadClass::Value,
    )
}

/// `QUEUE_SHOW` lists rows currently being worked on, not the whole
/// history — a client polling for "what's in flight" wants `Active` rows.
async fn handle_queue_show(ctx: &Ctx) -> Response {
    match open_and(ctx, |q| q.peek_active()).await {
        Ok(rows) => {
            let tasks: Vec<Value> = rows
                .into_iter()
                .map(|r| {
                    json!({
                        "id": r.id,
                        "priority": r.priority,
                        "status": wire_status(r.status),
                        "task": r.task,
                    })
                })
                .collect();
            Response::with_payload(WireStatus::Ok, Value::Array(tasks), PayloadClass::TaskList)
        }
        Err(err) => Response::fail(format!("failed to read queue: {err}")),
    }
}

fn progress_json(p: qop_storage::Progress) -> Value {
    json!({
        "pending": p.pending,
        "ok": p.ok,
        "skip": p.skip,
        "active": p.active,
        "fail": p.fail,
        "total": p.total,
    })
}

fn wire_status(status: qop_storage::Status) -> WireStatus {
    match status {
        qop_storage::Status::Fail => WireStatus::Fail,
        qop_storage::Status::Pending => WireStatus::Pending,
        qop_storage::Status::Ok => WireStatus::Ok,
        qop_storage::Status::Skip => WireStatus::Skip,
        qop_storage::Status::Active => WireStatus::Active,
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
