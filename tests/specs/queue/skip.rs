//! Scenario: enqueuing a copy whose destination already matches the
//! source is idempotent — immediate SKIP, no new row.

use crate::prelude::*;

#[test]
fn copy_skips_when_destination_already_matches_source() {
    let daemon = Daemon::start();
    let dir = tempfile::tempdir().expect("tempdir");
    let src = dir.path().join("s.txt");
    let dst = dir.path().join("d.txt");
    std::fs::write(&src, b"foo").expect("write source");
    std::fs::write(&dst, b"foo").expect("write destination");

    let before = daemon.progress();

    daemon
        .qop()
        .args(&["copy", &src.to_string_lossy(), &dst.to_string_lossy()])
        .passes()
        .stdout_has("SKIP");

    let after = daemon.progress();
    assert_eq!(
        before["total"], after["total"],
        "a skipped copy must not insert a new row"
    );
}

#[test]
fn copy_fails_when_destination_exists_and_differs() {
    let daemon = Daemon::start();
    let dir = tempfile::tempdir().expect("tempdir");
    let src = dir.path().join("s.txt");
    let dst = dir.path().join("d.txt");
    std::fs::write(&src, b"foo").expect("write source");
    std::fs::write(&dst, b"bar").expect("write differing destination");

    daemon
        .qop()
        .args(&["copy", &src.to_string_lossy(), &dst.to_string_lossy()])
        .fails()
        .stdout_has("FAIL");

    assert_eq!(std::fs::read(&dst).expect("read destination"), b"bar");
}
