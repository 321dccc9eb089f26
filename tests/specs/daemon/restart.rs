//! Scenario: killing the daemon mid-task and restarting it against the
//! same store resets in-flight rows to PENDING and lets workers resume
//! them to completion.

use crate::prelude::*;

#[test]
fn restart_recovers_in_flight_tasks_and_resumes_them() {
    let mut daemon = Daemon::start_persistent(5);

    for _ in 0..5 {
        daemon
            .qop()
            .args(&["sleep", "3", "--enqueue-only"])
            .passes();
    }
    daemon.qop().args(&["queue", "start"]).passes();

    let all_active = wait_for(SPEC_WAIT_MAX_MS, || daemon.progress()["active"] == 5);
    assert!(all_active, "all five sleeps should be claimed by the five-wide transfer pool");

    daemon.kill();
    daemon.restart();

    let progress = daemon.progress();
    assert_eq!(
        progress["active"], 0,
        "a restart must reset every in-flight row before anything resumes"
    );

    let all_ok = wait_for(SPEC_WAIT_MAX_MS * 3, || daemon.progress()["ok"] == 5);
    assert!(all_ok, "workers should resume the reset rows and eventually complete all five");
}
