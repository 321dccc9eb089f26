//! Scenario: a task that always fails reaches a terminal FAIL state
//! without taking the daemon down with it.

use crate::prelude::*;

#[test]
fn fail_task_reaches_fail_state_and_daemon_stays_responsive() {
    let daemon = Daemon::start();

    daemon.qop().args(&["fail"]).passes().stdout_has("OK");

    let settled = wait_for(SPEC_WAIT_MAX_MS, || {
        let progress = daemon.progress();
        progress["fail"] == 1 && progress["pending"] == 0
    });
    assert!(settled, "the fail task should reach a terminal fail state");

    daemon
        .qop()
        .args(&["daemon", "is-active"])
        .passes()
        .stdout_has("true");
}
