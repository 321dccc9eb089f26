//! Scenario: `DAEMON_IS_ACTIVE` reflects reality before and after
//! `DAEMON_STOP`, and the port stops accepting connections once stopped.

use crate::prelude::*;

#[test]
fn daemon_is_active_then_unreachable_after_stop() {
    let daemon = Daemon::start();

    daemon
        .qop()
        .args(&["daemon", "is-active"])
        .passes()
        .stdout_has("true");

    daemon
        .qop()
        .args(&["daemon", "stop"])
        .passes()
        .stdout_has("OK");

    let unreachable = wait_for(SPEC_WAIT_MAX_MS, || {
        std::net::TcpStream::connect(("127.0.0.1", daemon.port())).is_err()
    });
    assert!(unreachable, "the port should stop accepting connections after DAEMON_STOP");
}
