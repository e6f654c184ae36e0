//! Directory scanner for session status files.
//!
//! Lists and reads candidate status files from the shared directory,
//! applies liveness and timeout filtering, and emits a parsed snapshot.
//! This is the only component that touches the filesystem.
//!
//! # Self-healing deletion
//!
//! Files owned by a dead process and files older than the session timeout
//! are deleted during the scan. The shared directory must never accumulate
//! orphaned files indefinitely; deleting them here makes the scan
//! idempotent and crash-tolerant without an external reaper. A repeat
//! delete of an already-gone file is not an error.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use crate::process::ProcessProbe;
use crate::status_file;
use crate::types::Session;

/// Result of one directory scan.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Live sessions keyed by status file name.
    pub sessions: HashMap<String, Session>,

    /// Count of transient failures observed during the scan: an unlistable
    /// directory, unreadable files, or undecodable records. Diagnostic
    /// only; never surfaced as a user-facing error.
    pub error_count: usize,
}

/// Scans `dir` for status files and returns the live session set.
///
/// Entries whose names do not start with `prefix` and end with `suffix`
/// are ignored. Empty files are skipped silently (a writer may be
/// mid-write). Files that fail to decode are skipped, counted, and left on
/// disk to be retried next cycle. Files owned by a dead process or older
/// than `timeout` are deleted and skipped. A record without an `owner_pid`
/// is assumed alive.
pub fn scan(
    dir: &Path,
    prefix: &str,
    suffix: &str,
    now: DateTime<Utc>,
    timeout: Duration,
    probe: &dyn ProcessProbe,
) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to list status directory");
            outcome.error_count = 1;
            return outcome;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(prefix) || !name.ends_with(suffix) {
            continue;
        }
        if !path.is_file() {
            continue;
        }

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Failed to read status file");
                outcome.error_count += 1;
                continue;
            }
        };

        // A zero-length file is a writer mid-write, not an error.
        if bytes.is_empty() {
            trace!(path = %path.display(), "Skipping empty status file");
            continue;
        }

        let record = match status_file::decode(&bytes, now) {
            Ok(record) => record,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping undecodable status file");
                outcome.error_count += 1;
                continue;
            }
        };

        if let Some(pid) = record.owner_pid {
            if !probe.pid_alive(pid) {
                debug!(
                    path = %path.display(),
                    pid,
                    "Owning process is dead, removing status file"
                );
                remove_status_file(&path);
                continue;
            }
        }

        let age = now.signed_duration_since(record.timestamp);
        if age >= chrono_timeout(timeout) {
            debug!(
                path = %path.display(),
                age_secs = age.num_seconds(),
                "Session timed out, removing status file"
            );
            remove_status_file(&path);
            continue;
        }

        outcome.sessions.insert(
            name.to_string(),
            Session {
                id: name.to_string(),
                status: record.state,
                project: record.project,
                last_seen: record.timestamp,
            },
        );
    }

    debug!(
        session_count = outcome.sessions.len(),
        error_count = outcome.error_count,
        "Scan complete"
    );

    outcome
}

/// Deletes a dead or stale status file, tolerating one that is already gone.
fn remove_status_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove status file");
        }
    }
}

fn chrono_timeout(timeout: Duration) -> chrono::Duration {
    chrono::Duration::from_std(timeout).unwrap_or(chrono::TimeDelta::MAX)
}
