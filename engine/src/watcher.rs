//! Directory change notification.
//!
//! Wraps a platform file system watcher behind a small capability: send an
//! approximate "something under this directory changed" event whenever a
//! status file is created, modified, or removed. The notify callback is
//! kept lightweight; it only filters events and forwards a marker through
//! a channel, never blocking the watcher thread.
//!
//! The engine treats this capability as optional. When no watcher can be
//! established the polling timer alone drives cycles, just less promptly.

use std::path::{Path, PathBuf};

use notify::{
    event::{CreateKind, ModifyKind, RemoveKind},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

/// Marker for an approximate directory change.
///
/// Carries no payload: the engine re-scans the whole directory on every
/// cycle, so which file changed is irrelevant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent;

/// Errors that can occur while establishing a directory watch.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to initialize the file system watcher.
    #[error("failed to create watcher: {0}")]
    WatcherInit(#[from] notify::Error),

    /// The watch directory does not exist or is inaccessible.
    #[error("watch directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),
}

/// Watches the status directory for changes to matching files.
///
/// Dropping the watcher stops the subscription.
#[derive(Debug)]
pub struct DirectoryWatcher {
    /// Kept alive to maintain the watch subscription.
    #[allow(dead_code)]
    watcher: RecommendedWatcher,

    /// The directory being watched.
    watch_dir: PathBuf,
}

impl DirectoryWatcher {
    /// Creates a watcher over `watch_dir`, forwarding a [`ChangeEvent`]
    /// for every create/modify/remove touching a `<prefix>*<suffix>` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist or the platform
    /// watcher cannot be initialized. Both are non-fatal to the engine.
    pub fn new(
        watch_dir: PathBuf,
        prefix: &str,
        suffix: &str,
        tx: mpsc::Sender<ChangeEvent>,
    ) -> Result<Self, WatcherError> {
        if !watch_dir.is_dir() {
            return Err(WatcherError::DirectoryNotFound(watch_dir));
        }

        let prefix = prefix.to_string();
        let suffix = suffix.to_string();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                handle_notify_event(res, &prefix, &suffix, &tx);
            },
            Config::default(),
        )?;

        // The status directory is flat; no recursion needed.
        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

        debug!(watch_dir = %watch_dir.display(), "Started directory watch");

        Ok(Self { watcher, watch_dir })
    }

    /// Returns the directory being watched.
    #[must_use]
    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }
}

/// Filters a notify event and forwards a change marker.
fn handle_notify_event(
    res: Result<Event, notify::Error>,
    prefix: &str,
    suffix: &str,
    tx: &mpsc::Sender<ChangeEvent>,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "File watcher error");
            return;
        }
    };

    if !is_relevant_kind(&event.kind) {
        trace!(kind = ?event.kind, "Ignoring event kind");
        return;
    }

    if !event
        .paths
        .iter()
        .any(|path| name_matches(path, prefix, suffix))
    {
        return;
    }

    // try_send keeps the notify thread unblocked; a full channel means a
    // cycle is already queued, so dropping the marker loses nothing.
    if let Err(e) = tx.try_send(ChangeEvent) {
        if matches!(e, mpsc::error::TrySendError::Closed(_)) {
            warn!("Change event channel closed");
        }
    }
}

/// Returns whether an event kind can indicate a status file change.
fn is_relevant_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(CreateKind::File)
            | EventKind::Create(CreateKind::Any)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Remove(RemoveKind::File)
            | EventKind::Remove(RemoveKind::Any)
    )
}

/// Returns whether a path names a status file.
fn name_matches(path: &Path, prefix: &str, suffix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with(prefix) && name.ends_with(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::DataChange;
    use tempfile::TempDir;

    #[test]
    fn name_matching_requires_prefix_and_suffix() {
        assert!(name_matches(
            Path::new("/tmp/vibestatus-abc.json"),
            "vibestatus-",
            ".json"
        ));
        assert!(!name_matches(
            Path::new("/tmp/other-abc.json"),
            "vibestatus-",
            ".json"
        ));
        assert!(!name_matches(
            Path::new("/tmp/vibestatus-abc.tmp"),
            "vibestatus-",
            ".json"
        ));
        assert!(!name_matches(Path::new("/tmp"), "vibestatus-", ".json"));
    }

    #[test]
    fn relevant_kinds_cover_create_modify_remove() {
        assert!(is_relevant_kind(&EventKind::Create(CreateKind::File)));
        assert!(is_relevant_kind(&EventKind::Modify(ModifyKind::Data(
            DataChange::Content
        ))));
        assert!(is_relevant_kind(&EventKind::Remove(RemoveKind::File)));
        assert!(!is_relevant_kind(&EventKind::Access(
            notify::event::AccessKind::Read
        )));
    }

    #[tokio::test]
    async fn watcher_rejects_missing_directory() {
        let (tx, _rx) = mpsc::channel(8);
        let result = DirectoryWatcher::new(
            PathBuf::from("/nonexistent/vibestatus"),
            "vibestatus-",
            ".json",
            tx,
        );
        assert!(matches!(result, Err(WatcherError::DirectoryNotFound(_))));
    }

    #[tokio::test]
    async fn watcher_starts_on_existing_directory() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::channel(8);

        let watcher =
            DirectoryWatcher::new(dir.path().to_path_buf(), "vibestatus-", ".json", tx)
                .expect("should create watcher");

        assert_eq!(watcher.watch_dir(), dir.path());
    }

    #[test]
    fn watcher_error_display() {
        let err = WatcherError::DirectoryNotFound(PathBuf::from("/test/path"));
        assert_eq!(err.to_string(), "watch directory does not exist: /test/path");
    }
}
