// SPDX-License-Identifier: MIT

use super::*;
use qop_core::Task;
use qop_daemon::{Config, Daemon};
use std::net::TcpListener as StdTcpListener;
use std::time::Duration;

/// Ask the OS for an unused port by binding and immediately dropping a
/// listener on it. Racy in theory, fine in practice for test isolation.
fn free_port() -> u16 {
    StdTcpListener::bind(("127.0.0.1", 0))
        .expect("bind ephemeral port")
        .local_addr()
        .expect("local_addr")
        .port()
}

/// Start a real daemon on its own tokio runtime thread and return a client
/// already confirmed to be talking to it.
fn spawn_daemon(dir: &std::path::Path) -> DaemonClient {
    let port = free_port();
    let config = Config {
        port,
        queue_path: dir.join("queue.sqlite3"),
        persist_queue: false,
        max_transfer: 1,
        max_convert: 1,
    };

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("build runtime");
        rt.block_on(async {
            let _ = Daemon::new(config).serve().await;
        });
    });

    let mut client = DaemonClient::new(port);
    assert!(
        client.wait_for_daemon(true, Duration::from_secs(5)),
        "daemon never came up"
    );
    client
}

#[test]
fn is_daemon_active_reports_true_once_listening() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut client = spawn_daemon(dir.path());
    assert!(client.is_daemon_active());
}

#[test]
fn queue_put_then_progress_reflects_pending() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut client = spawn_daemon(dir.path());

    let resp = client
        .queue_put(&Task::Echo { msg: "hi".into() })
        .expect("queue_put");
    assert_eq!(resp.status, qop_daemon::Status::Ok);
    assert_eq!(client.counters.ok, 1);

    let progress = client.queue_progress().expect("progress");
    assert_eq!(progress["total"], 1);
}

#[test]
fn queue_put_rejects_missing_source_and_counts_as_fail() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut client = spawn_daemon(dir.path());

    let resp = client
        .queue_put(&Task::Delete {
            src: dir.path().join("does-not-exist"),
        })
        .expect("queue_put");
    assert_eq!(resp.status, qop_daemon::Status::Fail);
    assert_eq!(client.counters.fail, 1);
}

#[test]
fn gather_facts_reports_port_and_queue_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut client = spawn_daemon(dir.path());

    let facts = client.gather_facts().expect("facts");
    assert_eq!(facts["queue"]["persist"], false);
}

#[test]
fn daemon_stop_makes_the_daemon_unreachable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut client = spawn_daemon(dir.path());

    client.daemon_stop().expect("daemon_stop");
    assert!(client.wait_for_daemon(false, Duration::from_secs(5)));
}
