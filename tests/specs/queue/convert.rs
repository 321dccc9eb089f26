//! Scenario: a convert stages its output, then a spawned Move (priority
//! −1, linked via `parent`) lands it at the final destination.
//!
//! Uses `--copy-only` so the pipeline is exercised without depending on a
//! real `ffmpeg` binary being on the test runner's `PATH` — the staging
//! and follow-up-move mechanics are identical either way.

use std::path::PathBuf;

use crate::prelude::*;

#[test]
fn convert_pipeline_stages_then_moves_into_place() {
    let daemon = Daemon::start();
    let dir = tempfile::tempdir().expect("tempdir");
    let src = dir.path().join("s.flac");
    let dst = dir.path().join("d.mp3");
    std::fs::write(&src, b"pretend this is audio").expect("write source");

    daemon
        .qop()
        .args(&[
            "convert",
            &src.to_string_lossy(),
            &dst.to_string_lossy(),
            "--copy-only",
        ])
        .passes()
        .stdout_has("OK");

    let landed = wait_for(SPEC_WAIT_MAX_MS, || dst.exists());
    assert!(landed, "destination should exist once the staged file is moved into place");
    assert_eq!(
        std::fs::read(&dst).expect("read destination"),
        std::fs::read(&src).expect("read source"),
    );

    let staged = PathBuf::from(format!("{}.qop-stage", dst.display()));
    assert!(!staged.exists(), "the staging file must be moved away, not left behind");

    let both_ok = wait_for(SPEC_WAIT_MAX_MS, || daemon.progress()["ok"] == 2);
    assert!(both_ok, "both the convert row and its spawned move should end ok");
}
