// SPDX-License-Identifier: MIT

//! qopd: background daemon for queued bulk file operations.
//!
//! Listens on a TCP port (see `QOP_PORT`), accepts one `CommandMessage`
//! per connection, and dispatches it against a SQLite-backed task queue
//! and a two-class worker pool (transfer workers for copy/move/delete,
//! convert workers for audio transcodes).

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use qop_daemon::{Config, Daemon};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logging();

    let config = Config::from_env();
    info!(port = config.port, queue_path = %config.queue_path.display(), "starting qopd");

    let daemon = Daemon::new(config);

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        result = daemon.serve() => {
            if let Err(err) = result {
                error!(error = %err, "daemon exited with an error");
                return Err(err.into());
            }
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, stopping");
        }
        _ = sigint.recv() => {
            info!("received SIGINT, stopping");
        }
    }

    Ok(())
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
