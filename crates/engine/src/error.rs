// SPDX-License-Identifier: MIT

//! Error types for the worker pool.

use qop_storage::QueueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("worker pool for {class} is already at its configured size ({size})")]
    AlreadyAtSize { class: &'static str, size: usize },
    #[error("requested pool size {requested} is below the minimum of 1")]
    SizeTooSmall { requested: usize },
}
