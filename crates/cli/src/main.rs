// SPDX-License-Identifier: MIT

//! qop: thin CLI front end for the `qopd` queue daemon.
//!
//! Every subcommand is a one-shot wire request or two (an enqueue,
//! optionally followed by a `QUEUE_START`); there is no local state
//! beyond what's needed to build a `Task` and hand it to the daemon.

mod client;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use qop_core::{Converter, Task};
use qop_daemon::Status as WireStatus;

use client::{ClientError, DaemonClient};

const DEFAULT_PORT: u16 = 9393;

#[derive(Parser)]
#[command(name = "qop", version, about = "Queued bulk file operations")]
struct Cli {
    /// Daemon port to talk to
    #[arg(long, global = true, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a byte-for-byte copy
    Copy(TransferArgs),
    /// Enqueue a move (rename, or copy+delete across devices)
    Move(TransferArgs),
    /// Enqueue a transcode (staged, then moved into place)
    Convert(ConvertArgs),
    /// Enqueue a deletion
    Delete {
        src: PathBuf,
        /// Skip the automatic QUEUE_START after enqueuing
        #[arg(long)]
        enqueue_only: bool,
    },
    /// Enqueue a task that just prints a message when it runs
    Echo {
        msg: Vec<String>,
        #[arg(long)]
        enqueue_only: bool,
    },
    /// Enqueue a task that sleeps for the given number of seconds
    Sleep {
        seconds: f64,
        #[arg(long)]
        enqueue_only: bool,
    },
    /// Enqueue a task that always fails, for exercising error handling
    Fail {
        #[arg(long)]
        enqueue_only: bool,
    },
    /// Queue management
    Queue(QueueArgs),
    /// Daemon management
    Daemon(DaemonArgs),
}

#[derive(Args)]
struct TransferArgs {
    src: PathBuf,
    dst: PathBuf,
    #[arg(long)]
    enqueue_only: bool,
}

#[derive(Args)]
struct ConvertArgs {
    src: PathBuf,
    dst: PathBuf,
    /// Output container/format passed to ffmpeg (e.g. mp3, ogg, flac)
    #[arg(long, default_value = "mp3")]
    format: String,
    #[arg(long)]
    codec: Option<String>,
    #[arg(long)]
    bitrate: Option<String>,
    /// Strip embedded album art from the output
    #[arg(long)]
    remove_album_art: bool,
    /// Reproduce the source byte-for-byte instead of transcoding
    #[arg(long)]
    copy_only: bool,
    #[arg(long)]
    enqueue_only: bool,
}

#[derive(Args)]
struct QueueArgs {
    #[command(subcommand)]
    command: QueueCommand,
}

#[derive(Subcommand)]
enum QueueCommand {
    /// Start the worker pool
    Start,
    /// Stop the worker pool
    Stop,
    /// Remove every row, pending or otherwise
    Flush,
    /// Remove only rows still pending
    FlushPending,
    /// Report pending/active/ok/skip/fail counts
    Progress,
    /// Report how many transfer/convert workers are running
    Active,
    /// Report whether the worker pool is running
    IsActive,
    /// List the rows currently in flight
    Show,
}

#[derive(Args)]
struct DaemonArgs {
    #[command(subcommand)]
    command: DaemonCommand,
}

#[derive(Subcommand)]
enum DaemonCommand {
    /// Ask the daemon to stop, draining its worker pool first
    Stop,
    /// Report whether the daemon is reachable
    IsActive,
    /// Report port, queue path, pool sizes, and task counts
    Facts,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut client = DaemonClient::new(cli.port);

    match run(cli.command, &mut client) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("qop: {err}");
            ExitCode::FAILURE
        }
    }
}

/// `0` on success, matching §6's "CLI: 0 on command OK, non-zero on
/// protocol failure" exit code contract.
fn run(command: Commands, client: &mut DaemonClient) -> Result<u8, ClientError> {
    match command {
        Commands::Copy(args) => enqueue_transfer(client, args, |src, dst| Task::Copy { src, dst }),
        Commands::Move(args) => enqueue_transfer(client, args, |src, dst| Task::Move {
            src,
            dst,
            parent_oid: None,
        }),
        Commands::Convert(args) => enqueue_convert(client, args),
        Commands::Delete { src, enqueue_only } => {
            enqueue(client, Task::Delete { src }, enqueue_only)
        }
        Commands::Echo { msg, enqueue_only } => {
            enqueue(client, Task::Echo { msg: msg.join(" ") }, enqueue_only)
        }
        Commands::Sleep {
            seconds,
            enqueue_only,
        } => enqueue(client, Task::Sleep { seconds }, enqueue_only),
        Commands::Fail { enqueue_only } => enqueue(client, Task::Fail, enqueue_only),
        Commands::Queue(args) => run_queue(client, args.command),
        Commands::Daemon(args) => run_daemon(client, args.command),
    }
}

fn enqueue_transfer(
    client: &mut DaemonClient,
    args: TransferArgs,
    build: impl FnOnce(PathBuf, PathBuf) -> Task,
) -> Result<u8, ClientError> {
    let src = absolutize(&args.src);
    let dst = absolutize(&args.dst);
    enqueue(client, build(src, dst), args.enqueue_only)
}

fn enqueue_convert(client: &mut DaemonClient, args: ConvertArgs) -> Result<u8, ClientError> {
    let src = absolutize(&args.src);
    let dst = absolutize(&args.dst);

    let converter = if args.copy_only {
        Converter::Copy
    } else {
        Converter::Pydub {
            format: args.format,
            codec: args.codec,
            bitrate: args.bitrate,
            extra_params: Vec::new(),
            id3v2_version: None,
            remove_album_art: args.remove_album_art,
        }
    };
    let tmpdst = stage_path(&dst);

    enqueue(
        client,
        Task::Convert {
            src,
            dst,
            converter,
            tmpdst,
        },
        args.enqueue_only,
    )
}

/// A sibling of `dst`, same directory, with a `.qop-stage` suffix so a
/// transcode in progress never collides with its own final name.
fn stage_path(dst: &std::path::Path) -> PathBuf {
    let mut staged = dst.as_os_str().to_owned();
    staged.push(".qop-stage");
    PathBuf::from(staged)
}

fn absolutize(path: &std::path::Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

fn enqueue(client: &mut DaemonClient, task: Task, enqueue_only: bool) -> Result<u8, ClientError> {
    let resp = client.queue_put(&task)?;
    print_response(&resp);

    if !enqueue_only && resp.status != WireStatus::Fail {
        client.queue_start()?;
    }

    Ok(exit_status_for(resp.status))
}

fn run_queue(client: &mut DaemonClient, command: QueueCommand) -> Result<u8, ClientError> {
    match command {
        QueueCommand::Start => {
            let resp = client.queue_start()?;
            print_response(&resp);
            Ok(exit_status_for(resp.status))
        }
        QueueCommand::Stop => {
            let resp = client.queue_stop()?;
            print_response(&resp);
            Ok(exit_status_for(resp.status))
        }
        QueueCommand::Flush => {
            let n = client.queue_flush_all()?;
            println!("removed {n} rows");
            Ok(0)
        }
        QueueCommand::FlushPending => {
            let n = client.queue_flush_pending()?;
            println!("removed {n} pending rows");
            Ok(0)
        }
        QueueCommand::Progress => {
            let progress = client.queue_progress()?;
            println!("{}", serde_json::to_string_pretty(&progress).unwrap_or_default());
            Ok(0)
        }
        QueueCommand::Active => {
            let active = client.active_processes()?;
            println!("{}", serde_json::to_string_pretty(&active).unwrap_or_default());
            Ok(0)
        }
        QueueCommand::IsActive => {
            let active = client.is_queue_active()?;
            println!("{active}");
            Ok(0)
        }
        QueueCommand::Show => {
            let rows = client.active_tasks()?;
            println!("{}", serde_json::to_string_pretty(&rows).unwrap_or_default());
            Ok(0)
        }
    }
}

fn run_daemon(client: &mut DaemonClient, command: DaemonCommand) -> Result<u8, ClientError> {
    match command {
        DaemonCommand::Stop => {
            if !client.is_daemon_active() {
                println!("daemon is not active");
                return Ok(0);
            }
            let resp = client.daemon_stop()?;
            print_response(&resp);
            Ok(exit_status_for(resp.status))
        }
        DaemonCommand::IsActive => {
            println!("{}", client.is_daemon_active());
            Ok(0)
        }
        DaemonCommand::Facts => {
            let facts = client.gather_facts()?;
            println!("{}", serde_json::to_string_pretty(&facts).unwrap_or_default());
            Ok(0)
        }
    }
}

fn print_response(resp: &qop_daemon::Response) {
    let status = match resp.status {
        WireStatus::Ok => "OK",
        WireStatus::Fail => "FAIL",
        WireStatus::Skip => "SKIP",
        WireStatus::Pending => "PENDING",
        WireStatus::Active => "ACTIVE",
    };
    match &resp.msg {
        Some(msg) => println!("{status} {msg}"),
        None => println!("{status}"),
    }
}

fn exit_status_for(status: WireStatus) -> u8 {
    match status {
        WireStatus::Fail => 1,
        _ => 0,
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
