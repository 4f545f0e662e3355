//! snoozed - the CloudSnooze daemon entry point.
//!
//! Bootstraps the idle-watching control loop and the control socket:
//! - configuration loading (missing file writes defaults)
//! - provider detection or explicit binding
//! - signal handling for graceful shutdown
//!
//! ## Usage
//!
//! - `snoozed` or `snoozed serve` - run the daemon (default)
//! - `snoozed version` - print the version
//! - `snoozed help` - usage

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use cloudsnooze::config::DEFAULT_CONFIG_PATH;
use cloudsnooze::ipc::{self, get_socket_path};
use cloudsnooze::shutdown::ShutdownResult;
use cloudsnooze::{telemetry, BootstrapError, Daemon};

/// Grace period for draining in-flight socket clients.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("serve");

    match command {
        "serve" | "" => serve(args.get(2..).unwrap_or(&[])).await,
        "version" | "--version" | "-V" => {
            println!("snoozed {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        flag if flag.starts_with("--") => serve(&args[1..]).await,
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

struct ServeFlags {
    config_path: PathBuf,
    socket_path: String,
    log_json: bool,
}

fn parse_serve_flags(args: &[String]) -> Result<ServeFlags, String> {
    let mut flags = ServeFlags {
        config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
        socket_path: get_socket_path(),
        log_json: false,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                let value = args.get(i + 1).ok_or("missing value for --config")?;
                flags.config_path = PathBuf::from(value);
                i += 2;
            }
            "--socket" => {
                let value = args.get(i + 1).ok_or("missing value for --socket")?;
                flags.socket_path = value.clone();
                i += 2;
            }
            "--log-json" => {
                flags.log_json = true;
                i += 1;
            }
            other => return Err(format!("unknown flag: {}", other)),
        }
    }
    Ok(flags)
}

async fn serve(args: &[String]) -> ExitCode {
    let flags = match parse_serve_flags(args) {
        Ok(flags) => flags,
        Err(message) => {
            eprintln!("{}", message);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    telemetry::init_tracing(flags.log_json);
    telemetry::init_metrics();

    let daemon = match Daemon::bootstrap(flags.config_path).await {
        Ok(daemon) => daemon,
        Err(e @ BootstrapError::Config(_)) => {
            // Startup configuration errors are fatal by contract.
            eprintln!("Fatal: {}", e);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Fatal: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run_until_signal(daemon, flags.socket_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_until_signal(
    daemon: Daemon,
    socket_path: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let Daemon {
        handler,
        shutdown,
        control,
        ..
    } = daemon;

    let cancel = CancellationToken::new();
    let loop_handle = tokio::spawn(control.run(cancel.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_handle = tokio::spawn(ipc::run_server(socket_path, handler, shutdown_rx));

    wait_for_shutdown_signal().await?;
    tracing::info!("shutdown signal received, draining");

    // Stop ticking, stop accepting, then drain in-flight clients.
    cancel.cancel();
    let _ = shutdown_tx.send(true);
    match shutdown.initiate(DRAIN_GRACE).await {
        ShutdownResult::Complete => tracing::info!("shutdown complete"),
        ShutdownResult::Timeout { remaining } => {
            tracing::warn!(remaining, "shutdown grace period expired");
        }
    }

    let _ = loop_handle.await;
    server_handle.await??;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

fn print_usage() {
    eprintln!(
        "snoozed - CloudSnooze daemon v{}

USAGE:
    snoozed [COMMAND] [OPTIONS]

COMMANDS:
    serve        Run the daemon (default when no command given)
    version      Show version information
    help         Show this help message

OPTIONS:
    --config PATH  Configuration file (default: {})
    --socket PATH  Control socket path (default: {})
    --log-json     Emit logs as JSON

ENVIRONMENT:
    SNOOZE_SOCKET_PATH      Control socket path
    SNOOZE_SKIP_DETECTION   Skip provider detection (local-only mode)
    RUST_LOG                Log level (debug, info, warn, error)

The control CLI is the separate `snooze` binary; see `snooze help`.
",
        env!("CARGO_PKG_VERSION"),
        DEFAULT_CONFIG_PATH,
        cloudsnooze::ipc::DEFAULT_SOCKET_PATH,
    );
}
