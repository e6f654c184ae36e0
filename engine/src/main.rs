//! VibeStatus - desktop status indicator engine.
//!
//! This binary runs the session status engine against a shared directory of
//! per-session status files and reports the aggregate status. Rendering is
//! left to a presentation layer; `run` logs every published change, `status`
//! prints a one-shot snapshot, and `seed` writes a status file for demos.
//!
//! # Commands
//!
//! - `vibestatus run`: Start the engine and log published snapshots
//! - `vibestatus status`: Print the current snapshot as JSON and exit
//! - `vibestatus seed`: Write a status file through the codec
//!
//! # Environment Variables
//!
//! See the [`vibestatus_engine::config`] module for available options.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vibestatus_engine::config::Config;
use vibestatus_engine::process::SystemProbe;
use vibestatus_engine::status_file::{self, StatusRecord};
use vibestatus_engine::types::{SessionState, StatusSnapshot};
use vibestatus_engine::{aggregate, scanner, StatusEngine};

/// VibeStatus - worker session status indicator engine.
///
/// Watches a shared directory of per-session status files and derives a
/// single aggregate status for display.
#[derive(Parser, Debug)]
#[command(name = "vibestatus")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    VIBESTATUS_DIR                  Status file directory (default: system temp dir)
    VIBESTATUS_FILE_PREFIX          Status file prefix (default: vibestatus-)
    VIBESTATUS_FILE_SUFFIX          Status file suffix (default: .json)
    VIBESTATUS_POLL_MS              Poll interval in ms (default: 500)
    VIBESTATUS_PROCESS_CHECK_MS     Worker liveness interval in ms (default: 2000)
    VIBESTATUS_DEBOUNCE_MS          Debounce window in ms (default: 100)
    VIBESTATUS_SESSION_TIMEOUT_SECS Session timeout in s (default: 300)
    VIBESTATUS_WORKER_PATTERN       Worker process pattern (default: claude)
    VIBESTATUS_IDLE_SOUND           Sound id for working -> idle (default: Glass)
    VIBESTATUS_NEEDS_INPUT_SOUND    Sound id for working -> needs_input (default: Ping)

EXAMPLES:
    # Start the engine
    vibestatus run

    # Inspect the current state once
    vibestatus status

    # Seed a demo session
    vibestatus seed --session abc --state working --project demo
")]
struct Cli {
    /// Status file directory, overriding VIBESTATUS_DIR.
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the engine and log every published snapshot change.
    Run,

    /// Run a single scan and print the snapshot as JSON.
    Status,

    /// Write a session status file through the codec.
    Seed {
        /// Session identifier (becomes part of the file name).
        #[arg(long)]
        session: String,

        /// Session state to record.
        #[arg(long, value_parser = parse_state)]
        state: SessionState,

        /// Project display label.
        #[arg(long, default_value = "Unknown")]
        project: String,

        /// Optional human-readable message.
        #[arg(long)]
        message: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(dir) = cli.dir {
        config.status_dir = dir;
    }

    match cli.command {
        Command::Run => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(run_engine(config))
        }
        Command::Status => run_status(&config),
        Command::Seed {
            session,
            state,
            project,
            message,
        } => run_seed(&config, &session, state, project, message),
    }
}

/// Runs the engine until a shutdown signal arrives.
async fn run_engine(config: Config) -> Result<()> {
    init_logging();

    info!(
        status_dir = %config.status_dir.display(),
        worker_pattern = %config.worker_pattern,
        "Starting VibeStatus engine"
    );

    let mut engine = StatusEngine::new(config, Arc::new(SystemProbe::new()));

    engine.set_sound_hook(|sound_id| {
        // Playback belongs to the presentation layer; surface the request.
        info!(sound = %sound_id, "Sound requested");
    });

    let mut snapshots = engine.subscribe();
    engine.start().context("Failed to start engine")?;

    info!("Engine running. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("Shutdown signal received");
                break;
            }

            changed = snapshots.changed() => {
                if changed.is_err() {
                    warn!("Engine stopped publishing");
                    break;
                }
                let snapshot = snapshots.borrow().clone();
                info!(
                    aggregate = %snapshot.aggregate,
                    sessions = snapshot.active_session_count,
                    "Status changed"
                );
            }
        }
    }

    engine.stop().await;
    info!("Engine stopped");
    Ok(())
}

/// Runs a single scan and prints the snapshot as JSON.
fn run_status(config: &Config) -> Result<()> {
    let probe = SystemProbe::new();
    let outcome = scanner::scan(
        &config.status_dir,
        &config.file_prefix,
        &config.file_suffix,
        Utc::now(),
        config.session_timeout,
        &probe,
    );

    let snapshot = StatusSnapshot::new(aggregate::aggregate(&outcome.sessions), &outcome.sessions);
    let json = serde_json::to_string_pretty(&snapshot).context("Failed to serialize snapshot")?;
    println!("{json}");

    Ok(())
}

/// Writes a status file for the given session.
fn run_seed(
    config: &Config,
    session: &str,
    state: SessionState,
    project: String,
    message: Option<String>,
) -> Result<()> {
    // No owner_pid: the seeding process exits immediately, and a record
    // without one is assumed alive until its timestamp ages out.
    let record = StatusRecord {
        state,
        message,
        timestamp: Utc::now(),
        project,
        owner_pid: None,
    };

    let file_name = format!("{}{}{}", config.file_prefix, session, config.file_suffix);
    let path = config.status_dir.join(&file_name);

    std::fs::write(&path, status_file::encode(&record))
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("{}", path.display());
    Ok(())
}

/// Parses a session state argument.
fn parse_state(value: &str) -> Result<SessionState, String> {
    match value {
        "working" => Ok(SessionState::Working),
        "idle" => Ok(SessionState::Idle),
        "needs_input" => Ok(SessionState::NeedsInput),
        other => Err(format!(
            "unknown state '{other}' (expected working, idle, or needs_input)"
        )),
    }
}

/// Initializes the logging subsystem.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
