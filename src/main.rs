//! i3hub binary.
//!
//! Loads the configuration, connects to the window manager and runs the
//! hub until the window manager exits or the process is told to stop.
//!
//! # Usage
//!
//! ```text
//! # as a daemon, from the i3 config
//! exec --no-startup-id i3hub
//!
//! # as the bar's status command
//! bar {
//!     status_command i3hub --run-as-status
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use i3hub::transport::{Connection, resolve_socket_path};
use i3hub::{Config, Hub, Result, SignalConfig, config, extensions, signals};

// ============================================================================
// Constants
// ============================================================================

/// Filter applied when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "i3hub=info";

/// Log file name inside the runtime directory.
const LOG_FILE: &str = "i3hub.log";

/// Grace period for runtime shutdown. The stdin reader thread cannot be
/// cancelled, so the runtime is not waited on indefinitely.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(200);

// ============================================================================
// Command Line
// ============================================================================

/// Event hub and status line source for i3.
#[derive(Debug, Parser)]
#[command(name = "i3hub", version, about)]
struct Args {
    /// Load an extension, after those listed in the configuration.
    #[arg(long = "load", value_name = "NAME")]
    load: Vec<String>,

    /// Configuration file [default: $XDG_CONFIG_HOME/i3hub/i3hub.toml].
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Colon separated directories of additional `*.toml` files
    /// [default: $XDG_CONFIG_HOME/i3hub/config.d].
    #[arg(long, value_name = "DIRS", value_delimiter = ':')]
    extra_config_dirs: Vec<PathBuf>,

    /// Run as the bar's status command (status on stdout, clicks on stdin).
    #[arg(long)]
    run_as_status: bool,

    /// Write logs to this file [default with --run-as-status:
    /// $XDG_RUNTIME_DIR/i3hub/i3hub.log].
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Control socket [default: $I3SOCK, else `i3 --get-socketpath`].
    #[arg(long, value_name = "PATH")]
    socket_path: Option<PathBuf>,
}

// ============================================================================
// Entry Point
// ============================================================================

fn main() -> ExitCode {
    let args = Args::parse();

    let runtime_dir = config::runtime_dir();
    if let Err(e) = fs::create_dir_all(&runtime_dir) {
        eprintln!("i3hub: cannot create {}: {e}", runtime_dir.display());
        return ExitCode::FAILURE;
    }

    if let Err(e) = init_logging(&args, &runtime_dir) {
        eprintln!("i3hub: cannot set up logging: {e}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("i3hub: cannot start the async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(args, runtime_dir));
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "i3hub failed");
            eprintln!("i3hub: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Installs the tracing subscriber.
///
/// Logs go to a file when running as status, since stdout carries the
/// status stream.
fn init_logging(args: &Args, runtime_dir: &Path) -> std::io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let log_file = match (&args.log_file, args.run_as_status) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => Some(runtime_dir.join(LOG_FILE)),
        (None, false) => None,
    };

    match log_file {
        Some(path) => {
            let file = File::create(&path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    Ok(())
}

async fn run(args: Args, runtime_dir: PathBuf) -> Result<()> {
    let config_path = args.config.unwrap_or_else(config::default_config_path);
    let extra_dirs = if args.extra_config_dirs.is_empty() {
        vec![config::default_extra_config_dir()]
    } else {
        args.extra_config_dirs
    };
    let config = Config::load(&config_path, &extra_dirs)?;

    let mut names = config.extensions;
    names.extend(args.load);
    let loaded = extensions::resolve(&names);

    let socket_path = resolve_socket_path(args.socket_path).await?;
    let conn = Connection::connect(&socket_path).await?;
    info!(socket = %socket_path.display(), "Connected");

    let mut builder = Hub::builder()
        .extensions(loaded)
        .sections(config.sections)
        .runtime_dir(runtime_dir);
    if args.run_as_status {
        builder = builder.status_io(tokio::io::stdout(), Some(tokio::io::stdin()));
    }
    let hub = builder.build(conn)?;

    let status_signals = args.run_as_status.then(SignalConfig::default);
    let listener = signals::spawn_listener(hub.handle(), status_signals)?;
    let result = hub.run().await;
    listener.abort();

    result
}
