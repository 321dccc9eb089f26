// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! qop-storage: the persistent, SQLite-backed task queue.

mod migration;
pub mod queue;
pub mod record;

pub use migration::{MigrationError, CURRENT_SCHEMA_VERSION};
pub use queue::{Queue, QueueError, Record, DEFAULT_PRIORITY};
pub use record::{KindFilter, Progress, Status};
