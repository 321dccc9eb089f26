//! Scenario: a plain copy lands the destination file and the queue
//! reports exactly one completed task.

use crate::prelude::*;

#[test]
fn basic_copy_lands_destination_and_reports_ok() {
    let daemon = Daemon::start();
    let dir = tempfile::tempdir().expect("tempdir");
    let src = dir.path().join("s.txt");
    let dst = dir.path().join("d.txt");
    std::fs::write(&src, b"foo").expect("write source");

    daemon
        .qop()
        .args(&["copy", &src.to_string_lossy(), &dst.to_string_lossy()])
        .passes()
        .stdout_has("OK");

    let landed = wait_for(SPEC_WAIT_MAX_MS, || dst.exists());
    assert!(landed, "destination should exist once the copy runs");
    assert_eq!(std::fs::read(&dst).expect("read destination"), b"foo");

    let settled = wait_for(SPEC_WAIT_MAX_MS, || {
        let progress = daemon.progress();
        progress["ok"] == 1 && progress["total"] == 1
    });
    assert!(settled, "queue progress should report ok=1, total=1");
}

#[test]
fn copy_of_a_missing_source_is_rejected_up_front() {
    let daemon = Daemon::start();
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("does-not-exist.txt");
    let dst = dir.path().join("d.txt");

    daemon
        .qop()
        .args(&["copy", &missing.to_string_lossy(), &dst.to_string_lossy()])
        .fails()
        .stdout_has("FAIL");

    assert!(!dst.exists(), "nothing should land for a source that never existed");
}
