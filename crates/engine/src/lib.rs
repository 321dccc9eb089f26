// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! qop-engine: the two-class worker pool that drains a qop-storage queue.

mod error;
mod pool;
mod worker;

pub use error::EngineError;
pub use pool::{PoolConfig, WorkerPool};
pub use worker::{run_worker, WorkerClass};
