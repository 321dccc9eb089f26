//! Test helpers for behavioral specifications.
//!
//! Provides a small DSL for driving a real `qopd` daemon subprocess with
//! the `qop` CLI, the way `tests/specs/daemon/lifecycle.rs` drives `ojd`/
//! `oj` — except here the daemon has no auto-spawn-on-demand model, so
//! each test owns an explicit [`Daemon`] handle for its whole lifetime.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::net::TcpListener as StdTcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};

pub const SPEC_POLL_INTERVAL_MS: u64 = 20;
pub const SPEC_WAIT_MAX_MS: u64 = 5_000;

/// Returns the path to a workspace-built binary.
///
/// Declared the same way `tests/specs/prelude.rs` resolves `oj`/`ojd`
/// binaries: relative to `target/debug`, with a fallback that derives the
/// debug directory from the running test binary's own path for the case
/// where `CARGO_MANIFEST_DIR` points somewhere stale.
fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }
    standard
}

fn qop_binary() -> PathBuf {
    binary_path("qop")
}

fn qopd_binary() -> PathBuf {
    binary_path("qopd")
}

/// Bind an ephemeral port and release it immediately. Racy in theory, good
/// enough in practice for handing a free port to a spawned daemon.
fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

pub fn wait_for<F>(timeout_ms: u64, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(timeout_ms);
    let poll_interval = std::time::Duration::from_millis(SPEC_POLL_INTERVAL_MS);

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(poll_interval);
    }
    false
}

// =============================================================================
// CLI
// =============================================================================

/// Fluent builder for one `qop` invocation against a fixed port.
pub struct CliBuilder {
    port: u16,
    args: Vec<String>,
}

impl CliBuilder {
    fn new(port: u16) -> Self {
        Self {
            port,
            args: Vec::new(),
        }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    fn command(self) -> Command {
        let mut cmd = Command::new(qop_binary());
        cmd.arg("--port").arg(self.port.to_string());
        cmd.args(&self.args);
        cmd
    }

    pub fn passes(self) -> RunAssert {
        let mut cmd = self.command();
        let output = cmd.output().expect("qop should run");
        assert!(
            output.status.success(),
            "expected qop to pass, got exit code {:?}\nstdout: {}\nstderr: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
        RunAssert { output }
    }

    pub fn fails(self) -> RunAssert {
        let mut cmd = self.command();
        let output = cmd.output().expect("qop should run");
        assert!(
            !output.status.success(),
            "expected qop to fail, but it passed\nstdout: {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
        RunAssert { output }
    }
}

pub struct RunAssert {
    output: Output,
}

impl RunAssert {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub fn stdout_has(self, expected: &str) -> Self {
        let stdout = self.stdout();
        assert!(
            stdout.contains(expected),
            "stdout does not contain '{expected}'\nstdout: {stdout}"
        );
        self
    }

    pub fn stdout_lacks(self, unexpected: &str) -> Self {
        let stdout = self.stdout();
        assert!(
            !stdout.contains(unexpected),
            "stdout should not contain '{unexpected}'\nstdout: {stdout}"
        );
        self
    }

    pub fn stderr_has(self, expected: &str) -> Self {
        let stderr = String::from_utf8_lossy(&self.output.stderr).into_owned();
        assert!(
            stderr.contains(expected),
            "stderr does not contain '{expected}'\nstderr: {stderr}"
        );
        self
    }
}

// =============================================================================
// Daemon
// =============================================================================

/// A `qopd` subprocess bound to its own port and temp-dir-scoped queue
/// file, with a `qop` builder pre-wired to reach it.
pub struct Daemon {
    child: Option<Child>,
    port: u16,
    queue_path: PathBuf,
    persist: bool,
    max_transfer: usize,
    max_convert: usize,
    _tmp: tempfile::TempDir,
}

impl Daemon {
    /// Start a fresh daemon: default two-worker pools, queue file removed
    /// on stop (the common case for every scenario but restart recovery).
    pub fn start() -> Self {
        Self::with_config(false, 2, 2)
    }

    /// Start a daemon whose queue store survives a stop, with a given
    /// transfer pool width — needed to get several tasks genuinely ACTIVE
    /// at once before killing the process.
    pub fn start_persistent(max_transfer: usize) -> Self {
        Self::with_config(true, max_transfer, 1)
    }

    fn with_config(persist: bool, max_transfer: usize, max_convert: usize) -> Self {
        let tmp = tempfile::tempdir().expect("tempdir");
        let queue_path = tmp.path().join("queue.sqlite3");
        let port = free_port();
        let mut daemon = Self {
            child: None,
            port,
            queue_path,
            persist,
            max_transfer,
            max_convert,
            _tmp: tmp,
        };
        daemon.spawn();
        daemon
    }

    fn spawn(&mut self) {
        let child = Command::new(qopd_binary())
            .env("QOP_PORT", self.port.to_string())
            .env("QOP_QUEUE_PATH", &self.queue_path)
            .env("QOP_PERSIST_QUEUE", self.persist.to_string())
            .env("QOP_MAX_TRANSFER", self.max_transfer.to_string())
            .env("QOP_MAX_CONVERT", self.max_convert.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("qopd should start");
        self.child = Some(child);

        let reachable = wait_for(SPEC_WAIT_MAX_MS, || {
            std::net::TcpStream::connect(("127.0.0.1", self.port)).is_ok()
        });
        assert!(reachable, "qopd never became reachable on port {}", self.port);
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn queue_path(&self) -> &Path {
        &self.queue_path
    }

    pub fn qop(&self) -> CliBuilder {
        CliBuilder::new(self.port)
    }

    /// `queue progress`, parsed. Every scenario test polls this rather than
    /// asserting on a single snapshot, since tasks complete asynchronously.
    pub fn progress(&self) -> serde_json::Value {
        let out = self.qop().args(&["queue", "progress"]).passes().stdout();
        serde_json::from_str(&out).expect("progress output should be JSON")
    }

    /// SIGKILL the daemon process, simulating a crash with no graceful
    /// shutdown.
    pub fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    /// Respawn a killed daemon against the same port and queue file.
    pub fn restart(&mut self) {
        assert!(self.child.is_none(), "daemon must be killed before restarting");
        self.spawn();
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.kill();
    }
}
