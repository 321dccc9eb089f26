// SPDX-License-Identifier: MIT

//! The two-class worker pool: a small transfer pool (default size 1) and a
//! convert pool sized to leave one CPU free for everything else on the
//! host.

use std::path::PathBuf;

use qop_core::IdGen;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::EngineError;
use crate::worker::{run_worker, WorkerClass};

/// Pool sizes. `convert_size` defaults to `cpu_count - 1` (never below 1) so
/// a host running qop standalone still has a core free for the foreground
/// process driving it.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub transfer_size: usize,
    pub convert_size: usize,
}

impl PoolConfig {
    pub fn default_for_host() -> Self {
        Self {
            transfer_size: 1,
            convert_size: num_cpus::get().saturating_sub(1).max(1),
        }
    }
}

struct RunningClass {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<Result<(), EngineError>>>,
}

/// Owns the running worker tasks for both classes and the queue path they
/// all share. Each class has its own shutdown channel, so the transfer
/// pool can be stopped independently of the convert pool.
pub struct WorkerPool<G: IdGen + 'static> {
    queue_path: PathBuf,
    id_gen: G,
    transfer: Option<RunningClass>,
    convert: Option<RunningClass>,
    next_worker_id: usize,
}

impl<G: IdGen + 'static> WorkerPool<G> {
    pub fn new(queue_path: PathBuf, id_gen: G) -> Self {
        Self {
            queue_path,
            id_gen,
            transfer: None,
            convert: None,
            next_worker_id: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.transfer.is_some() || self.convert.is_some()
    }

    /// Start both pools at the given config. No-op (returns the existing
    /// state) if already running — starting twice would orphan the first
    /// generation's shutdown handle.
    pub fn start(&mut self, config: PoolConfig) {
        if self.is_running() {
            info!("worker pool already running, ignoring start request");
            return;
        }
        self.transfer = Some(self.spawn_class(WorkerClass::Transfer, config.transfer_size));
        self.convert = Some(self.spawn_class(WorkerClass::Convert, config.convert_size));
    }

    fn spawn_class(&mut self, class: WorkerClass, size: usize) -> RunningClass {
        let (tx, rx) = watch::channel(false);
        let handles = (0..size)
            .map(|_| {
                let id = self.next_worker_id;
                self.next_worker_id += 1;
                tokio::spawn(run_worker(
                    id,
                    class,
                    self.queue_path.clone(),
                    self.id_gen.clone(),
                    rx.clone(),
                ))
            })
            .collect();
        RunningClass {
            shutdown: tx,
            handles,
        }
    }

    /// Stop both pools and wait for every worker to observe shutdown and
    /// finish its in-flight task.
    pub async fn stop(&mut self) {
        for class in [self.transfer.take(), self.convert.take()] {
            if let Some(running) = class {
                join_class(running).await;
            }
        }
    }

    /// Change the convert pool's size. A shrink stops and respawns the
    /// whole convert pool rather than tearing down individual workers —
    /// convert workers are homogeneous and hold no per-worker state worth
    /// preserving, so a clean respawn is simpler than picking which
    /// workers to kill.
    pub async fn resize_convert(&mut self, new_size: usize) -> Result<(), EngineError> {
        if new_size == 0 {
            return Err(EngineError::SizeTooSmall { requested: 0 });
        }
        if let Some(running) = self.convert.take() {
            join_class(running).await;
        }
        self.convert = Some(self.spawn_class(WorkerClass::Convert, new_size));
        Ok(())
    }

    pub fn active_transfer_workers(&self) -> usize {
        self.transfer.as_ref().map_or(0, |c| c.handles.len())
    }

    pub fn active_convert_workers(&self) -> usize {
        self.convert.as_ref().map_or(0, |c| c.handles.len())
    }
}

async fn join_class(running: RunningClass) {
    let _ = running.shutdown.send(true);
    for handle in running.handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(error = %err, "worker exited with an error"),
            Err(err) => tracing::error!(error = %err, "worker task panicked"),
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
