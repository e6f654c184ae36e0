//! VibeStatus Hook - status file writer for worker hook events.
//!
//! This binary is invoked by the worker's hook system on lifecycle events.
//! It reads one hook event JSON from stdin, maps the event to a session
//! state, and writes (or removes) the session's status file in the shared
//! directory using the engine's codec.
//!
//! A hook must never break the worker that invoked it: unknown events and
//! unparseable input exit 0 without writing anything. Only a filesystem
//! failure while writing a mapped event is reported as an error.
//!
//! # Commands
//!
//! - `vibestatus-hook handle`: Read a hook event from stdin and update the
//!   session's status file.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use vibestatus_engine::config::Config;
use vibestatus_engine::status_file::{self, StatusRecord, UNKNOWN_PROJECT};
use vibestatus_engine::types::SessionState;

/// VibeStatus Hook - session status file writer.
#[derive(Parser, Debug)]
#[command(name = "vibestatus-hook")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Handle a hook event (reads JSON from stdin).
    Handle,
}

/// Hook event payload as delivered by the worker.
///
/// Unknown additional fields are ignored.
#[derive(Debug, Deserialize)]
struct HookEvent {
    hook_event_name: String,

    session_id: String,

    #[serde(default)]
    cwd: Option<String>,

    #[serde(default)]
    message: Option<String>,
}

/// What a hook event means for the session's status file.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    /// Write the file with this state.
    Write(SessionState),
    /// Remove the file; the session ended.
    Remove,
    /// Do nothing.
    Ignore,
}

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        Command::Handle => handle(),
    }
}

/// Reads a hook event from stdin and applies it.
fn handle() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    let mut input = String::new();
    if std::io::stdin().read_to_string(&mut input).is_err() {
        warn!("Failed to read hook input, ignoring event");
        return Ok(());
    }

    let event: HookEvent = match serde_json::from_str(&input) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Unparseable hook event, ignoring");
            return Ok(());
        }
    };

    apply_event(&config, &event, owner_pid())
}

/// Applies a hook event to the session's status file.
fn apply_event(config: &Config, event: &HookEvent, owner_pid: Option<u32>) -> Result<()> {
    let path = status_path(config, &event.session_id);

    match map_event(&event.hook_event_name) {
        Action::Write(state) => {
            let record = StatusRecord {
                state,
                message: event.message.clone(),
                timestamp: Utc::now(),
                project: project_label(event.cwd.as_deref()),
                owner_pid,
            };

            std::fs::write(&path, status_file::encode(&record))
                .with_context(|| format!("Failed to write {}", path.display()))?;

            debug!(path = %path.display(), state = %state, "Wrote status file");
            Ok(())
        }

        Action::Remove => {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove status file");
                }
            }
            debug!(path = %path.display(), "Session ended, status file removed");
            Ok(())
        }

        Action::Ignore => {
            debug!(event = %event.hook_event_name, "Ignoring hook event");
            Ok(())
        }
    }
}

/// Maps a hook event name to a status file action.
fn map_event(event_name: &str) -> Action {
    match event_name {
        "UserPromptSubmit" | "PreToolUse" | "PostToolUse" => Action::Write(SessionState::Working),
        "Stop" => Action::Write(SessionState::Idle),
        "Notification" => Action::Write(SessionState::NeedsInput),
        "SessionEnd" => Action::Remove,
        _ => Action::Ignore,
    }
}

/// Builds the status file path for a session.
fn status_path(config: &Config, session_id: &str) -> PathBuf {
    let file_name = format!(
        "{}{}{}",
        config.file_prefix, session_id, config.file_suffix
    );
    config.status_dir.join(file_name)
}

/// Derives the project display label from the worker's working directory.
fn project_label(cwd: Option<&str>) -> String {
    cwd.map(Path::new)
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_PROJECT.to_string())
}

/// The worker's PID: the hook runs as a direct child of the worker.
#[cfg(unix)]
fn owner_pid() -> Option<u32> {
    // SAFETY: getppid cannot fail.
    let ppid = unsafe { libc::getppid() };
    u32::try_from(ppid).ok()
}

#[cfg(not(unix))]
fn owner_pid() -> Option<u32> {
    None
}

/// Initializes logging to stderr; hooks stay quiet by default.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
