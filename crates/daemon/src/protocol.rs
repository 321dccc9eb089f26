// SPDX-License-Identifier: MIT

//! Command codes and the request/response body shapes carried inside the
//! wire protocol's JSON header+body frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Integer command codes, stable across client/daemon versions since they
/// cross the wire as plain numbers, never as a serde string tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum Command {
    DaemonStart = 101,
    DaemonStop = 102,
    DaemonIsActive = 103,
    DaemonFacts = 104,
    QueueStart = 201,
    QueueStop = 202,
    QueueIsActive = 203,
    QueuePut = 204,
    QueueFlushPending = 205,
    QueueFlushAll = 206,
    QueueProgress = 207,
    QueueActiveProcesses = 208,
    QueueMaxProcesses = 210,
    QueueShow = 209,
}

/// Tells the client how to interpret a response's `payload` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum PayloadClass {
    Value = 1,
    Task = 2,
    QueueProgress = 3,
    TaskList = 4,
    DaemonFacts = 5,
}

/// Status carried in a response body. Distinct from `qop_storage::Status`:
/// a response can report `Fail` for a malformed request that never became
/// a queue row at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum Status {
    Fail = -1,
    Pending = 0,
    Ok = 1,
    Skip = 2,
    Active = 3,
}

/// Body of a `CommandMessage`: what a client sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub command: Command,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_class: Option<PayloadClass>,
}

impl Request {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            payload: None,
            payload_class: None,
        }
    }

    pub fn with_payload(command: Command, payload: Value, payload_class: PayloadClass) -> Self {
        Self {
            command,
            payload: Some(payload),
            payload_class: Some(payload_class),
        }
    }
}

/// Body of a `StatusMessage`: what the daemon sends back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_class: Option<PayloadClass>,
}

impl Response {
    pub fn ok(msg: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            msg: Some(msg.into()),
            payload: None,
            payload_class: None,
        }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self {
            status: Status::Fail,
            msg: Some(msg.into()),
            payload: None,
            payload_class: None,
        }
    }

    pub fn skip(msg: impl Into<String>) -> Self {
        Self {
            status: Status::Skip,
            msg: Some(msg.into()),
            payload: None,
            payload_class: None,
        }
    }

    pub fn with_payload(status: Status, payload: Value, payload_class: PayloadClass) -> Self {
        Self {
            status,
            msg: None,
            payload: Some(payload),
            payload_class: Some(payload_class),
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
