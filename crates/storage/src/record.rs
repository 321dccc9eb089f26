// SPDX-License-Identifier: MIT

//! Queue record types: status codes, the kind filter, and progress counts.

use qop_core::TaskKind;

/// Status of a queue record. Discriminants are part of the wire-visible
/// `QUEUE_PROGRESS` payload, not an implementation detail free to renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum Status {
    Fail = -1,
    Pending = 0,
    Ok = 1,
    Skip = 2,
    Active = 3,
}

impl Status {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            -1 => Some(Status::Fail),
            0 => Some(Status::Pending),
            1 => Some(Status::Ok),
            2 => Some(Status::Skip),
            3 => Some(Status::Active),
            _ => None,
        }
    }

    /// A status reached only via `set_status` (not `pop`'s own claim step).
    pub fn is_terminal_or_pending(self) -> bool {
        !matches!(self, Status::Active)
    }
}

/// `pop`'s kind filter: at most one of include/exclude is ever active.
/// Transfer workers pass `Exclude(Convert)`; convert workers pass
/// `Include(Convert)`.
#[derive(Debug, Clone, Copy)]
pub enum KindFilter {
    None,
    Include(TaskKind),
    Exclude(TaskKind),
}

/// Aggregate counts by status, as returned by `QUEUE_PROGRESS`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub pending: u64,
    pub ok: u64,
    pub skip: u64,
    pub active: u64,
    pub fail: u64,
    pub total: u64,
}

/// The numeric `type` tag a given [`TaskKind`] serializes to in the wire
/// form (`qop_core::task::TaskDto::type`). Kept local rather than exported
/// from `qop-core` — the queue is the only consumer that needs to filter on
/// it via `json_extract`.
pub fn wire_type_tag(kind: TaskKind) -> i64 {
    match kind {
        TaskKind::Echo => 0,
        TaskKind::Sleep => 1,
        TaskKind::Fail => 2,
        TaskKind::Delete => 3,
        TaskKind::Copy => 4,
        TaskKind::Move => 5,
        TaskKind::SimpleConvert => 6,
        TaskKind::Convert => 7,
    }
}
