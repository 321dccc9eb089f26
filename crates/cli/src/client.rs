// SPDX-License-Identifier: MIT

//! A genuinely blocking daemon client: one TCP connection per request,
//! connect/send/recv/close, no shared state held across calls.
//!
//! Grounded on the wire shapes in `qop_daemon::protocol`/`protocol_wire`,
//! but reading and writing through `std::net::TcpStream` directly rather
//! than the daemon's `tokio`-async codec — a CLI invocation is a single
//! short-lived process, not a long-running connection pool, so there is
//! nothing an async runtime would buy here.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use qop_daemon::{Command, PayloadClass, Request, Response, Status as WireStatus};
use serde_json::Value;
use thiserror::Error;

/// How long `gather_facts` keeps retrying a connection that's refused or
/// resets before giving up. Mirrors the 10-attempt/0.1s retry loop the
/// original client used around `QUEUE_PROGRESS`.
const FACTS_MAX_ATTEMPTS: u32 = 10;
const FACTS_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not reach the daemon at {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error talking to the daemon: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed response from the daemon: {0}")]
    Json(#[from] serde_json::Error),
    #[error("the daemon rejected the request: {0}")]
    Rejected(String),
}

/// Running counts of `QUEUE_PUT` outcomes across every request this
/// client instance has sent, the way a batch `copy`/`convert` invocation
/// reports its progress as it walks many source paths.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub ok: u64,
    pub skip: u64,
    pub fail: u64,
}

impl Counters {
    pub fn total(&self) -> u64 {
        self.ok + self.skip + self.fail
    }

    fn record(&mut self, status: WireStatus, command: Command) {
        if command != Command::QueuePut {
            return;
        }
        match status {
            WireStatus::Ok => self.ok += 1,
            WireStatus::Skip => self.skip += 1,
            WireStatus::Fail => self.fail += 1,
            WireStatus::Pending | WireStatus::Active => {}
        }
    }
}

pub struct DaemonClient {
    addr: SocketAddr,
    pub counters: Counters,
}

impl DaemonClient {
    pub fn new(port: u16) -> Self {
        Self {
            addr: ([127, 0, 0, 1], port).into(),
            counters: Counters::default(),
        }
    }

    /// Send one request over a fresh connection and return the decoded
    /// response. Every call opens, uses, and drops its own `TcpStream`.
    pub fn send(&mut self, req: Request) -> Result<Response, ClientError> {
        let command = req.command;
        let mut stream = TcpStream::connect(self.addr).map_err(|source| ClientError::Connect {
            addr: self.addr,
            source,
        })?;

        write_frame(&mut stream, &req)?;
        let response: Response = read_frame(&mut stream)?;

        self.counters.record(response.status, command);
        Ok(response)
    }

    pub fn is_daemon_active(&mut self) -> bool {
        matches!(
            self.send(Request::new(Command::DaemonIsActive)),
            Ok(resp) if resp.status == WireStatus::Ok
        )
    }

    pub fn daemon_stop(&mut self) -> Result<Response, ClientError> {
        self.send(Request::new(Command::DaemonStop))
    }

    /// `DAEMON_FACTS`, retried up to [`FACTS_MAX_ATTEMPTS`] times with a
    /// short sleep in between — a daemon just past startup may still be
    /// binding its listener when the first attempt lands.
    pub fn gather_facts(&mut self) -> Result<Value, ClientError> {
        let mut attempt = 0;
        loop {
            match self.send(Request::new(Command::DaemonFacts)) {
                Ok(resp) => return payload_or_rejected(resp),
                Err(err) => {
                    attempt += 1;
                    if attempt >= FACTS_MAX_ATTEMPTS {
                        return Err(err);
                    }
                    std::thread::sleep(FACTS_RETRY_DELAY);
                }
            }
        }
    }

    pub fn is_queue_active(&mut self) -> Result<bool, ClientError> {
        let resp = self.send(Request::new(Command::QueueIsActive))?;
        let payload = payload_or_rejected(resp)?;
        Ok(payload["value"].as_bool().unwrap_or(false))
    }

    pub fn queue_start(&mut self) -> Result<Response, ClientError> {
        self.send(Request::new(Command::QueueStart))
    }

    pub fn queue_stop(&mut self) -> Result<Response, ClientError> {
        self.send(Request::new(Command::QueueStop))
    }

    pub fn queue_put(&mut self, task: &qop_core::Task) -> Result<Response, ClientError> {
        let payload = serde_json::to_value(task)?;
        self.send(Request::with_payload(Command::QueuePut, payload, PayloadClass::Task))
    }

    pub fn queue_flush_pending(&mut self) -> Result<u64, ClientError> {
        let resp = self.send(Request::new(Command::QueueFlushPending))?;
        let payload = payload_or_rejected(resp)?;
        Ok(payload["value"].as_u64().unwrap_or(0))
    }

    pub fn queue_flush_all(&mut self) -> Result<u64, ClientError> {
        let resp = self.send(Request::new(Command::QueueFlushAll))?;
        let payload = payload_or_rejected(resp)?;
        Ok(payload["value"].as_u64().unwrap_or(0))
    }

    pub fn queue_progress(&mut self) -> Result<Value, ClientError> {
        let resp = self.send(Request::new(Command::QueueProgress))?;
        payload_or_rejected(resp)
    }

    pub fn active_processes(&mut self) -> Result<Value, ClientError> {
        let resp = self.send(Request::new(Command::QueueActiveProcesses))?;
        payload_or_rejected(resp)
    }

    pub fn active_tasks(&mut self) -> Result<Vec<Value>, ClientError> {
        let resp = self.send(Request::new(Command::QueueShow))?;
        let payload = payload_or_rejected(resp)?;
        Ok(payload.as_array().cloned().unwrap_or_default())
    }

    /// Poll `DAEMON_IS_ACTIVE` until it reports the desired liveness or
    /// `timeout` elapses.
    pub fn wait_for_daemon(&mut self, want_active: bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_daemon_active() == want_active {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }
}

fn payload_or_rejected(resp: Response) -> Result<Value, ClientError> {
    if resp.status == WireStatus::Fail {
        return Err(ClientError::Rejected(
            resp.msg.unwrap_or_else(|| "request failed".to_string()),
        ));
    }
    Ok(resp.payload.unwrap_or(Value::Null))
}

/// Blocking mirror of `protocol_wire::write_request`: same 2-byte
/// length-prefixed JSON header + body framing, written synchronously.
fn write_frame(stream: &mut TcpStream, req: &Request) -> Result<(), ClientError> {
    let body = serde_json::to_vec(req)?;
    let header = serde_json::json!({
        "content-length": body.len(),
        "content-type": "text/json",
        "message-class": "CommandMessage",
    });
    let header_bytes = serde_json::to_vec(&header)?;

    stream.write_all(&(header_bytes.len() as u16).to_be_bytes())?;
    stream.write_all(&header_bytes)?;
    stream.write_all(&body)?;
    stream.flush()?;
    Ok(())
}

/// Blocking mirror of `protocol_wire::read_response`.
fn read_frame(stream: &mut TcpStream) -> Result<Response, ClientError> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf)?;
    let header_len = u16::from_be_bytes(len_buf) as usize;

    let mut header_buf = vec![0u8; header_len];
    stream.read_exact(&mut header_buf)?;
    let header: Value = serde_json::from_slice(&header_buf)?;
    let content_length = header
        .get("content-length")
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;

    let mut body = vec![0u8; content_length];
    stream.read_exact(&mut body)?;
    Ok(serde_json::from_slice(&body)?)
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
