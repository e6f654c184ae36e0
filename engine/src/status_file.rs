//! Status file codec.
//!
//! Each worker session writes one small JSON file describing its current
//! state. This module parses and serializes that on-disk record format. It
//! is pure: the caller hands it bytes, it hands back a [`StatusRecord`].
//!
//! # File format
//!
//! ```json
//! {
//!   "state": "working",
//!   "message": "Refactoring parser",
//!   "timestamp": "2025-01-01T00:00:00Z",
//!   "project": "my-project",
//!   "owner_pid": 12345
//! }
//! ```
//!
//! Only `state` is required. Unknown additional fields are ignored, not
//! rejected. Timestamps use a single canonical textual format (UTC, second
//! precision); any other format is treated as "timestamp absent".

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::SessionState;

/// Canonical timestamp format, e.g. `2025-01-01T00:00:00Z`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Project label used when a record does not carry one.
pub const UNKNOWN_PROJECT: &str = "Unknown";

/// Errors that can occur while decoding a status file.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The input was empty or whitespace-only.
    #[error("empty status file")]
    Empty,

    /// The input was not valid JSON, or `state` held an unrecognized value.
    #[error("malformed status file: {0}")]
    Json(#[from] serde_json::Error),
}

/// A fully resolved status record.
///
/// Optional on-disk fields are resolved to their defaults at decode time:
/// a missing `timestamp` becomes the caller-supplied "now", a missing
/// `project` becomes [`UNKNOWN_PROJECT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    /// Canonical session state.
    pub state: SessionState,

    /// Human-readable message, display-only.
    pub message: Option<String>,

    /// When the record was written, second precision.
    pub timestamp: DateTime<Utc>,

    /// Display label for the owning project.
    pub project: String,

    /// Process identifier of the writer, if reported.
    pub owner_pid: Option<u32>,
}

/// On-disk JSON shape. Unknown fields are ignored by serde's default
/// behavior; optional fields are omitted when absent.
#[derive(Debug, Serialize, Deserialize)]
struct WireRecord {
    state: SessionState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    project: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    owner_pid: Option<u32>,
}

/// Decodes a status record from raw file bytes.
///
/// `now` is used as the effective timestamp when the record carries none,
/// or when the textual timestamp is not in the canonical format.
///
/// # Errors
///
/// Returns [`DecodeError::Empty`] for empty input and [`DecodeError::Json`]
/// for malformed JSON or an unrecognized `state` value.
pub fn decode(bytes: &[u8], now: DateTime<Utc>) -> Result<StatusRecord, DecodeError> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(DecodeError::Empty);
    }

    let wire: WireRecord = serde_json::from_slice(bytes)?;

    let timestamp = wire
        .timestamp
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or(now);

    Ok(StatusRecord {
        state: wire.state,
        message: wire.message,
        timestamp,
        project: wire.project.unwrap_or_else(|| UNKNOWN_PROJECT.to_string()),
        owner_pid: wire.owner_pid,
    })
}

/// Encodes a status record to its canonical JSON byte form.
///
/// Round-trips with [`decode`] for every field that survives the canonical
/// second-precision timestamp format.
#[must_use]
pub fn encode(record: &StatusRecord) -> Vec<u8> {
    let wire = WireRecord {
        state: record.state,
        message: record.message.clone(),
        timestamp: Some(format_timestamp(record.timestamp)),
        project: Some(record.project.clone()),
        owner_pid: record.owner_pid,
    };

    // Serializing a struct of plain fields cannot fail.
    serde_json::to_vec(&wire).unwrap_or_default()
}

/// Formats a timestamp in the canonical on-disk format.
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a canonical-format timestamp, returning `None` for any other
/// textual form.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
