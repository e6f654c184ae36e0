//! Configuration module for the VibeStatus engine.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `VIBESTATUS_DIR` | No | system temp dir | Shared status-file directory |
//! | `VIBESTATUS_FILE_PREFIX` | No | `vibestatus-` | Status file name prefix |
//! | `VIBESTATUS_FILE_SUFFIX` | No | `.json` | Status file name suffix |
//! | `VIBESTATUS_POLL_MS` | No | 500 | Poll fallback interval (ms) |
//! | `VIBESTATUS_PROCESS_CHECK_MS` | No | 2000 | Worker liveness check interval (ms) |
//! | `VIBESTATUS_DEBOUNCE_MS` | No | 100 | Change-notification debounce window (ms) |
//! | `VIBESTATUS_SESSION_TIMEOUT_SECS` | No | 300 | Session expiry window (s) |
//! | `VIBESTATUS_WORKER_PATTERN` | No | `claude` | Worker process name pattern |
//! | `VIBESTATUS_IDLE_SOUND` | No | `Glass` | Sound id for working -> idle |
//! | `VIBESTATUS_NEEDS_INPUT_SOUND` | No | `Ping` | Sound id for working -> needs_input |
//!
//! # Example
//!
//! ```no_run
//! use vibestatus_engine::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Watching: {}", config.status_dir.display());
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default status file name prefix.
pub const DEFAULT_FILE_PREFIX: &str = "vibestatus-";

/// Default status file name suffix.
pub const DEFAULT_FILE_SUFFIX: &str = ".json";

/// Default poll fallback interval in milliseconds.
const DEFAULT_POLL_MS: u64 = 500;

/// Default worker-process liveness check interval in milliseconds.
const DEFAULT_PROCESS_CHECK_MS: u64 = 2000;

/// Default debounce window in milliseconds.
const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Default session timeout in seconds.
const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 300;

/// Default worker process name pattern.
const DEFAULT_WORKER_PATTERN: &str = "claude";

/// Default sound id requested on a working -> idle transition.
const DEFAULT_IDLE_SOUND: &str = "Glass";

/// Default sound id requested on a working -> needs_input transition.
const DEFAULT_NEEDS_INPUT_SOUND: &str = "Ping";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Configuration for the VibeStatus engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing per-session status files.
    pub status_dir: PathBuf,

    /// Status file name prefix; entries not starting with it are ignored.
    pub file_prefix: String,

    /// Status file name suffix; entries not ending with it are ignored.
    pub file_suffix: String,

    /// Fixed-interval poll fallback between cycles.
    pub poll_interval: Duration,

    /// Interval of the slower worker-process family liveness probe.
    pub process_check_interval: Duration,

    /// Window within which change-notification cycle requests coalesce.
    pub debounce_window: Duration,

    /// Sessions whose effective timestamp is older than this are evicted.
    pub session_timeout: Duration,

    /// Process name pattern identifying the worker family.
    pub worker_pattern: String,

    /// Symbolic sound id requested on a working -> idle transition.
    pub idle_sound: String,

    /// Symbolic sound id requested on a working -> needs_input transition.
    pub needs_input_sound: String,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// Every variable has a default; only malformed values fail.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if an interval or timeout variable is set but
    /// is not a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        let status_dir = env::var("VIBESTATUS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir());

        let file_prefix = env::var("VIBESTATUS_FILE_PREFIX")
            .unwrap_or_else(|_| DEFAULT_FILE_PREFIX.to_string());

        let file_suffix = env::var("VIBESTATUS_FILE_SUFFIX")
            .unwrap_or_else(|_| DEFAULT_FILE_SUFFIX.to_string());

        let poll_interval =
            Duration::from_millis(positive_u64("VIBESTATUS_POLL_MS", DEFAULT_POLL_MS)?);

        let process_check_interval = Duration::from_millis(positive_u64(
            "VIBESTATUS_PROCESS_CHECK_MS",
            DEFAULT_PROCESS_CHECK_MS,
        )?);

        let debounce_window =
            Duration::from_millis(positive_u64("VIBESTATUS_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS)?);

        let session_timeout = Duration::from_secs(positive_u64(
            "VIBESTATUS_SESSION_TIMEOUT_SECS",
            DEFAULT_SESSION_TIMEOUT_SECS,
        )?);

        let worker_pattern = env::var("VIBESTATUS_WORKER_PATTERN")
            .unwrap_or_else(|_| DEFAULT_WORKER_PATTERN.to_string());

        let idle_sound =
            env::var("VIBESTATUS_IDLE_SOUND").unwrap_or_else(|_| DEFAULT_IDLE_SOUND.to_string());

        let needs_input_sound = env::var("VIBESTATUS_NEEDS_INPUT_SOUND")
            .unwrap_or_else(|_| DEFAULT_NEEDS_INPUT_SOUND.to_string());

        Ok(Self {
            status_dir,
            file_prefix,
            file_suffix,
            poll_interval,
            process_check_interval,
            debounce_window,
            session_timeout,
            worker_pattern,
            idle_sound,
            needs_input_sound,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            status_dir: env::temp_dir(),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            file_suffix: DEFAULT_FILE_SUFFIX.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
            process_check_interval: Duration::from_millis(DEFAULT_PROCESS_CHECK_MS),
            debounce_window: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            session_timeout: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
            worker_pattern: DEFAULT_WORKER_PATTERN.to_string(),
            idle_sound: DEFAULT_IDLE_SOUND.to_string(),
            needs_input_sound: DEFAULT_NEEDS_INPUT_SOUND.to_string(),
        }
    }
}

/// Parses an environment variable as a positive integer, with a default.
fn positive_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(val) => {
            let parsed = val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected positive integer, got '{val}'"),
            })?;
            if parsed == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than 0".to_string(),
                });
            }
            Ok(parsed)
        }
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to run tests with isolated environment variables.
    /// Clears all VIBESTATUS_* vars before the test and restores them after.
    fn with_clean_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let saved_vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| k.starts_with("VIBESTATUS_"))
            .collect();

        for (key, _) in &saved_vars {
            env::remove_var(key);
        }

        let result = f();

        for (key, value) in saved_vars {
            env::set_var(key, value);
        }

        result
    }

    #[test]
    #[serial]
    fn test_defaults() {
        with_clean_env(|| {
            let config = Config::from_env().expect("should parse default config");

            assert_eq!(config.status_dir, env::temp_dir());
            assert_eq!(config.file_prefix, "vibestatus-");
            assert_eq!(config.file_suffix, ".json");
            assert_eq!(config.poll_interval, Duration::from_millis(500));
            assert_eq!(config.process_check_interval, Duration::from_millis(2000));
            assert_eq!(config.debounce_window, Duration::from_millis(100));
            assert_eq!(config.session_timeout, Duration::from_secs(300));
            assert_eq!(config.worker_pattern, "claude");
            assert_eq!(config.idle_sound, "Glass");
            assert_eq!(config.needs_input_sound, "Ping");
        });
    }

    #[test]
    #[serial]
    fn test_full_overrides() {
        with_clean_env(|| {
            env::set_var("VIBESTATUS_DIR", "/custom/status");
            env::set_var("VIBESTATUS_FILE_PREFIX", "agent-");
            env::set_var("VIBESTATUS_FILE_SUFFIX", ".status");
            env::set_var("VIBESTATUS_POLL_MS", "250");
            env::set_var("VIBESTATUS_PROCESS_CHECK_MS", "5000");
            env::set_var("VIBESTATUS_DEBOUNCE_MS", "50");
            env::set_var("VIBESTATUS_SESSION_TIMEOUT_SECS", "60");
            env::set_var("VIBESTATUS_WORKER_PATTERN", "codex");
            env::set_var("VIBESTATUS_IDLE_SOUND", "Chime");
            env::set_var("VIBESTATUS_NEEDS_INPUT_SOUND", "Alert");

            let config = Config::from_env().expect("should parse full config");

            assert_eq!(config.status_dir, PathBuf::from("/custom/status"));
            assert_eq!(config.file_prefix, "agent-");
            assert_eq!(config.file_suffix, ".status");
            assert_eq!(config.poll_interval, Duration::from_millis(250));
            assert_eq!(config.process_check_interval, Duration::from_millis(5000));
            assert_eq!(config.debounce_window, Duration::from_millis(50));
            assert_eq!(config.session_timeout, Duration::from_secs(60));
            assert_eq!(config.worker_pattern, "codex");
            assert_eq!(config.idle_sound, "Chime");
            assert_eq!(config.needs_input_sound, "Alert");
        });
    }

    #[test]
    #[serial]
    fn test_invalid_poll_interval() {
        with_clean_env(|| {
            env::set_var("VIBESTATUS_POLL_MS", "soon");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, .. } if key == "VIBESTATUS_POLL_MS"
            ));
        });
    }

    #[test]
    #[serial]
    fn test_zero_timeout_rejected() {
        with_clean_env(|| {
            env::set_var("VIBESTATUS_SESSION_TIMEOUT_SECS", "0");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, ref message }
                    if key == "VIBESTATUS_SESSION_TIMEOUT_SECS"
                    && message.contains("greater than 0")
            ));
        });
    }

    #[test]
    #[serial]
    fn test_default_matches_from_env_defaults() {
        with_clean_env(|| {
            let from_env = Config::from_env().unwrap();
            let default = Config::default();

            assert_eq!(from_env.file_prefix, default.file_prefix);
            assert_eq!(from_env.poll_interval, default.poll_interval);
            assert_eq!(from_env.session_timeout, default.session_timeout);
        });
    }
}
