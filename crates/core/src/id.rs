// SPDX-License-Identifier: MIT

//! Lock token generation.
//!
//! Queue records are claimed with a fresh, per-attempt token rather than
//! in-process object identity, so a claim is meaningful across processes
//! and hosts: workers share a queue file without needing any in-process
//! lock to agree on who owns a record.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A per-attempt claim token stored in a queue record's `lock` column.
pub type LockToken = String;

/// Generates unique lock tokens.
pub trait IdGen: Clone + Send + Sync {
    fn next(&self) -> LockToken;
}

/// UUID-based generator for production use.
#[derive(Clone, Default)]
pub struct UuidIdGen;

impl IdGen for UuidIdGen {
    fn next(&self) -> LockToken {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Sequential generator for deterministic tests.
#[derive(Clone)]
pub struct SequentialIdGen {
    prefix: String,
    counter: Arc<AtomicU64>,
}

impl SequentialIdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Default for SequentialIdGen {
    fn default() -> Self {
        Self::new("lock")
    }
}

impl IdGen for SequentialIdGen {
    fn next(&self) -> LockToken {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}
