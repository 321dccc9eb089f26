// SPDX-License-Identifier: MIT

//! The task model: a closed sum type for queued operations.
//!
//! Validation is pure — it never mutates the filesystem, even on failure —
//! so the daemon can call it synchronously on enqueue and surface SKIP/FAIL
//! to the client before any worker ever sees the row. Workers call it again
//! immediately before `run()` to catch races against whatever changed the
//! filesystem between enqueue and dequeue.

use crate::converter::{Converter, ConverterError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Closed-form classification used by the queue's kind filter: the two
/// worker classes select disjoint kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Echo,
    Sleep,
    Fail,
    Delete,
    Copy,
    Move,
    SimpleConvert,
    Convert,
}

impl TaskKind {
    /// Only `Convert` tasks are handled by convert-class workers; every
    /// other kind (including `SimpleConvert`, which writes directly) is
    /// transfer-class.
    pub fn is_convert(self) -> bool {
        matches!(self, TaskKind::Convert)
    }
}

/// Outcome of [`Task::validate`]. Pure — never touches the filesystem
/// beyond read-only existence/content checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Ok,
    FileNotFound,
    FileExistsIdentical,
    FileExistsDiffers,
    FileExistsCannotCompare,
    InvalidSrcType,
}

/// Result of a completed [`Task::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Skipped,
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("converter error: {0}")]
    Converter(#[from] ConverterError),

    #[error("task always fails")]
    AlwaysFails,

    #[error("{0} does not exist")]
    NotFound(PathBuf),

    #[error("{0} is neither a file nor a directory")]
    TypeInvalid(PathBuf),

    #[error("{0} already exists and differs from source")]
    DestExistsDiffers(PathBuf),
}

/// A queued unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "TaskDto", try_from = "TaskDto")]
pub enum Task {
    Echo {
        msg: String,
    },
    Sleep {
        seconds: f64,
    },
    Fail,
    Delete {
        src: PathBuf,
    },
    Copy {
        src: PathBuf,
        dst: PathBuf,
    },
    Move {
        src: PathBuf,
        dst: PathBuf,
        parent_oid: Option<i64>,
    },
    SimpleConvert {
        src: PathBuf,
        dst: PathBuf,
        converter: Converter,
    },
    Convert {
        src: PathBuf,
        dst: PathBuf,
        converter: Converter,
        tmpdst: PathBuf,
    },
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self {
            Task::Echo { .. } => TaskKind::Echo,
            Task::Sleep { .. } => TaskKind::Sleep,
            Task::Fail => TaskKind::Fail,
            Task::Delete { .. } => TaskKind::Delete,
            Task::Copy { .. } => TaskKind::Copy,
            Task::Move { .. } => TaskKind::Move,
            Task::SimpleConvert { .. } => TaskKind::SimpleConvert,
            Task::Convert { .. } => TaskKind::Convert,
        }
    }

    /// Pure precondition check. Never mutates the filesystem.
    pub fn validate(&self) -> Validation {
        match self {
            Task::Echo { .. } | Task::Sleep { .. } | Task::Fail => Validation::Ok,
            Task::Delete { src } => validate_src(src),
            Task::Copy { src, dst } | Task::Move { src, dst, .. } => {
                match validate_src(src) {
                    Validation::Ok => validate_comparable_dst(src, dst),
                    other => other,
                }
            }
            Task::SimpleConvert { src, dst, .. } => match validate_src(src) {
                Validation::Ok => validate_uncomparable_dst(dst),
                other => other,
            },
            Task::Convert { src, dst, .. } => match validate_src(src) {
                Validation::Ok => validate_uncomparable_dst(dst),
                other => other,
            },
        }
    }

    /// Perform the operation. Workers re-validate immediately beforehand to
    /// catch races (a file deleted/created between enqueue and dequeue).
    ///
    /// The `Validation::FileNotFound`/`InvalidSrcType`/`FileExistsDiffers`
    /// arms only ever arise for variants `src_path()`/`dst_path()` return
    /// `Some` for, so the `expect`s below are an invariant of `validate`,
    /// not a possible runtime failure.
    #[allow(clippy::expect_used)]
    pub fn run(&self) -> Result<RunOutcome, TaskError> {
        match self.validate() {
            Validation::FileNotFound => {
                let src = self.src_path().expect("validated tasks have a src");
                return Err(TaskError::NotFound(src.clone()));
            }
            Validation::InvalidSrcType => {
                let src = self.src_path().expect("validated tasks have a src");
                return Err(TaskError::TypeInvalid(src.clone()));
            }
            Validation::FileExistsDiffers => {
                let dst = self.dst_path().expect("validated tasks have a dst");
                return Err(TaskError::DestExistsDiffers(dst.clone()));
            }
            Validation::FileExistsIdentical | Validation::FileExistsCannotCompare => {
                return Ok(RunOutcome::Skipped);
            }
            Validation::Ok => {}
        }

        match self {
            Task::Echo { msg } => {
                println!("{msg}");
                Ok(RunOutcome::Completed)
            }
            Task::Sleep { seconds } => {
                std::thread::sleep(std::time::Duration::from_secs_f64(seconds.max(0.0)));
                Ok(RunOutcome::Completed)
            }
            Task::Fail => Err(TaskError::AlwaysFails),
            Task::Delete { src } => {
                if src.is_dir() {
                    fs::remove_dir(src)?;
                } else {
                    fs::remove_file(src)?;
                }
                Ok(RunOutcome::Completed)
            }
            Task::Copy { src, dst } => {
                copy_path(src, dst)?;
                Ok(RunOutcome::Completed)
            }
            Task::Move { src, dst, .. } => {
                move_path(src, dst)?;
                Ok(RunOutcome::Completed)
            }
            Task::SimpleConvert {
                src, dst, converter, ..
            } => {
                converter.run(src, dst)?;
                Ok(RunOutcome::Completed)
            }
            Task::Convert {
                src,
                converter,
                tmpdst,
                ..
            } => {
                converter.run(src, tmpdst)?;
                Ok(RunOutcome::Completed)
            }
        }
    }

    /// Only `Convert` spawns a follow-up: a `Move` from the staging path to
    /// the final destination, linked back via `parent_oid` so the queue can
    /// mirror this task's terminal status onto its own row.
    pub fn spawn(&self, own_record_id: i64) -> Option<Task> {
        match self {
            Task::Convert { dst, tmpdst, .. } => Some(Task::Move {
                src: tmpdst.clone(),
                dst: dst.clone(),
                parent_oid: Some(own_record_id),
            }),
            _ => None,
        }
    }

    fn src_path(&self) -> Option<&Path> {
        match self {
            Task::Echo { .. } | Task::Sleep { .. } | Task::Fail => None,
            Task::Delete { src }
            | Task::Copy { src, .. }
            | Task::Move { src, .. }
            | Task::SimpleConvert { src, .. }
            | Task::Convert { src, .. } => Some(src),
        }
    }

    fn dst_path(&self) -> Option<&Path> {
        match self {
            Task::Copy { dst, .. }
            | Task::Move { dst, .. }
            | Task::SimpleConvert { dst, .. }
            | Task::Convert { dst, .. } => Some(dst),
            _ => None,
        }
    }
}

fn validate_src(src: &Path) -> Validation {
    if !src.exists() {
        return Validation::FileNotFound;
    }
    if !(src.is_dir() || src.is_file()) {
        return Validation::InvalidSrcType;
    }
    Validation::Ok
}

/// Copy/Move: a byte-identical destination is a no-op (SKIP), a differing
/// one is a hard conflict (FAIL).
fn validate_comparable_dst(src: &Path, dst: &Path) -> Validation {
    if !dst.exists() {
        return Validation::Ok;
    }
    match files_identical(src, dst) {
        Ok(true) => Validation::FileExistsIdentical,
        Ok(false) => Validation::FileExistsDiffers,
        Err(_) => Validation::FileExistsDiffers,
    }
}

/// SimpleConvert/Convert: transcoded output can't be byte-compared to the
/// source, so any existing destination is simply skipped.
fn validate_uncomparable_dst(dst: &Path) -> Validation {
    if dst.exists() {
        Validation::FileExistsCannotCompare
    } else {
        Validation::Ok
    }
}

fn files_identical(a: &Path, b: &Path) -> std::io::Result<bool> {
    if a.is_dir() || b.is_dir() {
        return Ok(a.is_dir() && b.is_dir());
    }
    let meta_a = fs::metadata(a)?;
    let meta_b = fs::metadata(b)?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    Ok(fs::read(a)? == fs::read(b)?)
}

fn copy_path(src: &Path, dst: &Path) -> std::io::Result<()> {
    if let Some(parent) = dst.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    if src.is_dir() {
        copy_dir_all(src, dst)
    } else {
        fs::copy(src, dst).map(|_| ())
    }
}

fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let dst_path = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &dst_path)?;
        } else {
            fs::copy(entry.path(), dst_path)?;
        }
    }
    Ok(())
}

fn move_path(src: &Path, dst: &Path) -> std::io::Result<()> {
    if let Some(parent) = dst.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            // Cross-device or other rename failure: fall back to copy+delete.
            copy_path(src, dst)?;
            if src.is_dir() {
                fs::remove_dir_all(src)
            } else {
                fs::remove_file(src)
            }
        }
    }
}

/// Wire representation: a numeric `type` tag plus the union of all
/// variant-specific fields, all optional. A client on either end of the
/// wire can reconstruct a `Task` from this shape without knowing Rust's
/// enum layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaskDto {
    r#type: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    src: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dst: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_oid: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    converter: Option<Converter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tmpdst: Option<PathBuf>,
}

impl From<Task> for TaskDto {
    fn from(task: Task) -> Self {
        match task {
            Task::Echo { msg } => TaskDto {
                r#type: 0,
                msg: Some(msg),
                ..empty_dto()
            },
            Task::Sleep { seconds } => TaskDto {
                r#type: 1,
                seconds: Some(seconds),
                ..empty_dto()
            },
            Task::Fail => TaskDto {
                r#type: 2,
                ..empty_dto()
            },
            Task::Delete { src } => TaskDto {
                r#type: 3,
                src: Some(src),
                ..empty_dto()
            },
            Task::Copy { src, dst } => TaskDto {
                r#type: 4,
                src: Some(src),
                dst: Some(dst),
                ..empty_dto()
            },
            Task::Move {
                src,
                dst,
                parent_oid,
            } => TaskDto {
                r#type: 5,
                src: Some(src),
                dst: Some(dst),
                parent_oid,
                ..empty_dto()
            },
            Task::SimpleConvert { src, dst, converter } => TaskDto {
                r#type: 6,
                src: Some(src),
                dst: Some(dst),
                converter: Some(converter),
                ..empty_dto()
            },
            Task::Convert {
                src,
                dst,
                converter,
                tmpdst,
            } => TaskDto {
                r#type: 7,
                src: Some(src),
                dst: Some(dst),
                converter: Some(converter),
                tmpdst: Some(tmpdst),
                ..empty_dto()
            },
        }
    }
}

fn empty_dto() -> TaskDto {
    TaskDto {
        r#type: 0,
        msg: None,
        seconds: None,
        src: None,
        dst: None,
        parent_oid: None,
        converter: None,
        tmpdst: None,
    }
}

impl TryFrom<TaskDto> for Task {
    type Error = TaskDtoError;

    fn try_from(dto: TaskDto) -> Result<Self, Self::Error> {
        let field_src = |dto: &TaskDto| dto.src.clone().ok_or(TaskDtoError::MissingField("src"));
        let field_dst = |dto: &TaskDto| dto.dst.clone().ok_or(TaskDtoError::MissingField("dst"));

        Ok(match dto.r#type {
            0 => Task::Echo {
                msg: dto.msg.ok_or(TaskDtoError::MissingField("msg"))?,
            },
            1 => Task::Sleep {
                seconds: dto.seconds.ok_or(TaskDtoError::MissingField("seconds"))?,
            },
            2 => Task::Fail,
            3 => Task::Delete {
                src: field_src(&dto)?,
            },
            4 => Task::Copy {
                src: field_src(&dto)?,
                dst: field_dst(&dto)?,
            },
            5 => Task::Move {
                src: field_src(&dto)?,
                dst: field_dst(&dto)?,
                parent_oid: dto.parent_oid,
            },
            6 => Task::SimpleConvert {
                src: field_src(&dto)?,
                dst: field_dst(&dto)?,
                converter: dto.converter.ok_or(TaskDtoError::MissingField("converter"))?,
            },
            7 => Task::Convert {
                src: field_src(&dto)?,
                dst: field_dst(&dto)?,
                converter: dto.converter.ok_or(TaskDtoError::MissingField("converter"))?,
                tmpdst: dto.tmpdst.ok_or(TaskDtoError::MissingField("tmpdst"))?,
            },
            other => return Err(TaskDtoError::UnknownType(other)),
        })
    }
}

#[derive(Debug, Error)]
pub enum TaskDtoError {
    #[error("unknown task type tag {0}")]
    UnknownType(u8),
    #[error("missing field `{0}` for task variant")]
    MissingField(&'static str),
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
