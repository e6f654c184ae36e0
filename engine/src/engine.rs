//! Status engine orchestration.
//!
//! Owns the polling/scheduling loop: debounces rapid wake-ups, runs one
//! full scan -> transition-detect -> aggregate -> publish cycle at a time,
//! and requests notification sounds. Cycles execute sequentially on a
//! single background task, so a later cycle can never publish state
//! gathered before an earlier cycle's publish.
//!
//! # Wake-up sources
//!
//! - the fixed-interval poll timer (always available fallback);
//! - directory change notifications, coalesced within the debounce window;
//! - an immediate extra cycle when the worker process family appears while
//!   the published aggregate is `not_running`.
//!
//! # Failure semantics
//!
//! Scan errors never abort a cycle; they accumulate in a diagnostic
//! counter. A cycle that panics is caught at the cycle boundary and
//! skipped, and the next scheduled cycle proceeds normally.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::aggregate;
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::process::ProcessProbe;
use crate::scanner;
use crate::store::SessionStore;
use crate::transitions::{self, SoundKind, Transitions};
use crate::types::{AggregateStatus, StatusSnapshot};
use crate::watcher::{ChangeEvent, DirectoryWatcher};

/// Capacity of the change-notification channel. A full channel only means
/// a cycle is already queued, so overflow markers are droppable.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Fire-and-forget callback invoked with a symbolic sound identifier.
pub type SoundHook = Arc<dyn Fn(&str) + Send + Sync>;

/// The session status engine.
///
/// Constructed once at process start; lifecycle is explicit via
/// [`start`](Self::start) and [`stop`](Self::stop). Published state is read
/// through [`snapshot`](Self::snapshot) or observed through
/// [`subscribe`](Self::subscribe), which only signals on change.
pub struct StatusEngine {
    config: Config,
    probe: Arc<dyn ProcessProbe>,

    published_tx: Option<watch::Sender<StatusSnapshot>>,
    published_rx: watch::Receiver<StatusSnapshot>,

    change_tx: mpsc::Sender<ChangeEvent>,
    change_rx: Option<mpsc::Receiver<ChangeEvent>>,

    shutdown_tx: Option<watch::Sender<bool>>,
    runner: Option<JoinHandle<()>>,

    sound_hook: Option<SoundHook>,
    errors: Arc<AtomicUsize>,
}

impl StatusEngine {
    /// Creates an engine over the given configuration and liveness probe.
    ///
    /// The engine does nothing until [`start`](Self::start) is called.
    #[must_use]
    pub fn new(config: Config, probe: Arc<dyn ProcessProbe>) -> Self {
        let (published_tx, published_rx) = watch::channel(StatusSnapshot::default());
        let (change_tx, change_rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);

        Self {
            config,
            probe,
            published_tx: Some(published_tx),
            published_rx,
            change_tx,
            change_rx: Some(change_rx),
            shutdown_tx: None,
            runner: None,
            sound_hook: None,
            errors: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Installs the sound-request callback.
    ///
    /// The engine invokes it with the configured symbolic sound id and does
    /// not wait for or observe playback. Must be called before `start`.
    pub fn set_sound_hook<F>(&mut self, hook: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.sound_hook = Some(Arc::new(hook));
    }

    /// Starts the cycle-runner task.
    ///
    /// Attempts to establish a directory watch; when that fails the engine
    /// still functions, driven by the poll timer alone.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyStarted`] if the engine is running or
    /// was already stopped. An engine instance starts at most once.
    pub fn start(&mut self) -> Result<()> {
        let change_rx = self.change_rx.take().ok_or(EngineError::AlreadyStarted)?;
        let published_tx = self.published_tx.take().ok_or(EngineError::AlreadyStarted)?;

        let watcher = match DirectoryWatcher::new(
            self.config.status_dir.clone(),
            &self.config.file_prefix,
            &self.config.file_suffix,
            self.change_tx.clone(),
        ) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(error = %e, "No directory watch available, relying on polling");
                None
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runner = CycleRunner {
            config: self.config.clone(),
            probe: Arc::clone(&self.probe),
            store: SessionStore::new(),
            published: published_tx,
            sound_hook: self.sound_hook.clone(),
            errors: Arc::clone(&self.errors),
            worker_was_running: false,
        };

        self.runner = Some(tokio::spawn(runner.run(shutdown_rx, change_rx, watcher)));
        self.shutdown_tx = Some(shutdown_tx);

        info!(
            status_dir = %self.config.status_dir.display(),
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "Status engine started"
        );

        Ok(())
    }

    /// Stops the engine.
    ///
    /// Idempotent. Cancels any pending timer or debounce wait and joins the
    /// runner task; no publish or sound request occurs after this returns.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown_tx.take() {
            let _ = shutdown.send(true);
        }

        if let Some(runner) = self.runner.take() {
            if runner.await.is_err() {
                error!("Engine runner task terminated abnormally");
            }
            info!("Status engine stopped");
        }
    }

    /// Returns the most recently published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        self.published_rx.borrow().clone()
    }

    /// Returns a receiver that observes every published change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.published_rx.clone()
    }

    /// Requests an extra cycle, subject to the debounce window.
    ///
    /// This is the external wake-up capability: any change-notification
    /// source can call it. Requests arriving while one is already pending
    /// coalesce into a single cycle.
    pub fn request_cycle(&self) {
        let _ = self.change_tx.try_send(ChangeEvent);
    }

    /// Total count of transient scan failures observed so far.
    ///
    /// Diagnostic only.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }
}

/// State owned by the background cycle task.
struct CycleRunner {
    config: Config,
    probe: Arc<dyn ProcessProbe>,
    store: SessionStore,
    published: watch::Sender<StatusSnapshot>,
    sound_hook: Option<SoundHook>,
    errors: Arc<AtomicUsize>,
    worker_was_running: bool,
}

impl CycleRunner {
    /// Runs the scheduling loop until shutdown.
    async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
        mut changes: mpsc::Receiver<ChangeEvent>,
        _watcher: Option<DirectoryWatcher>,
    ) {
        let mut poll = interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut probe_tick = interval(self.config.process_check_interval);
        probe_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Disabled once every notification sender is gone; polling still
        // drives cycles after that.
        let mut changes_open = true;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,

                _ = poll.tick() => {
                    self.cycle(&shutdown);
                }

                event = changes.recv(), if changes_open => {
                    match event {
                        Some(_) => {
                            if !absorb_burst(self.config.debounce_window, &mut shutdown, &mut changes).await {
                                break;
                            }
                            self.cycle(&shutdown);
                        }
                        None => changes_open = false,
                    }
                }

                _ = probe_tick.tick() => {
                    self.probe_worker_family(&shutdown);
                }
            }
        }

        debug!("Cycle runner terminated");
    }

    /// Runs one cycle, isolating panics at the cycle boundary.
    fn cycle(&mut self, shutdown: &watch::Receiver<bool>) {
        let computed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.compute_cycle()
        }));

        match computed {
            Ok((snapshot, transitions)) => self.publish(snapshot, transitions, shutdown),
            Err(_) => error!("Cycle panicked, skipping"),
        }
    }

    /// Cycle body: scan, detect transitions, aggregate, remember.
    fn compute_cycle(&mut self) -> (StatusSnapshot, Transitions) {
        let now = Utc::now();

        let outcome = scanner::scan(
            &self.config.status_dir,
            &self.config.file_prefix,
            &self.config.file_suffix,
            now,
            self.config.session_timeout,
            self.probe.as_ref(),
        );

        if outcome.error_count > 0 {
            self.errors.fetch_add(outcome.error_count, Ordering::Relaxed);
        }

        self.store.replace(outcome.sessions);
        self.store.prune_expired(now, self.config.session_timeout);

        let transitions = transitions::detect(self.store.previous_statuses(), self.store.sessions());
        let aggregate = aggregate::aggregate(self.store.sessions());
        self.store.remember();

        (StatusSnapshot::new(aggregate, self.store.sessions()), transitions)
    }

    /// Publishes a snapshot if it differs from the last published value and
    /// requests at most one sound.
    fn publish(
        &self,
        snapshot: StatusSnapshot,
        transitions: Transitions,
        shutdown: &watch::Receiver<bool>,
    ) {
        if *shutdown.borrow() {
            return;
        }

        let changed = self.published.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot.clone();
                true
            }
        });

        if changed {
            debug!(
                aggregate = %snapshot.aggregate,
                sessions = snapshot.active_session_count,
                "Published snapshot"
            );
        }

        if let Some(kind) = transitions.sound() {
            let sound_id = match kind {
                SoundKind::NeedsInput => &self.config.needs_input_sound,
                SoundKind::Idle => &self.config.idle_sound,
            };
            debug!(sound = %sound_id, "Requesting notification sound");
            if let Some(hook) = &self.sound_hook {
                hook(sound_id);
            }
        }
    }

    /// Slow-interval probe of the worker process family.
    ///
    /// With no sessions and no worker processes, forces `not_running`
    /// without waiting for the next file-based cycle. When the family newly
    /// appears while the aggregate is `not_running`, runs an immediate
    /// extra cycle.
    fn probe_worker_family(&mut self, shutdown: &watch::Receiver<bool>) {
        let running = self.probe.worker_running(&self.config.worker_pattern);
        let was_running = self.worker_was_running;
        self.worker_was_running = running;

        if !running {
            if self.store.is_empty() && !*shutdown.borrow() {
                let forced = self.published.send_if_modified(|current| {
                    if current.aggregate == AggregateStatus::NotRunning
                        && current.sessions.is_empty()
                    {
                        false
                    } else {
                        *current = StatusSnapshot::default();
                        true
                    }
                });
                if forced {
                    debug!("Worker family gone, forced not_running");
                }
            }
        } else if !was_running && self.published.borrow().aggregate == AggregateStatus::NotRunning {
            debug!("Worker family appeared, running immediate cycle");
            self.cycle(shutdown);
        }
    }
}

/// Absorbs a burst of change notifications into a single pending cycle.
///
/// Returns `false` when shutdown was requested during the wait.
async fn absorb_burst(
    window: Duration,
    shutdown: &mut watch::Receiver<bool>,
    changes: &mut mpsc::Receiver<ChangeEvent>,
) -> bool {
    let deadline = Instant::now() + window;

    loop {
        tokio::select! {
            _ = shutdown.changed() => return false,

            _ = sleep_until(deadline) => return true,

            more = changes.recv() => {
                if more.is_none() {
                    return true;
                }
                // Coalesced into the pending cycle.
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status_file::{encode, StatusRecord};
    use crate::types::SessionState;
    use std::fs;
    use std::sync::atomic::AtomicBool;
    use tempfile::TempDir;
    use tokio::time::{sleep, timeout};

    /// Probe with settable worker-family liveness; every PID is alive.
    struct FakeProbe {
        worker_running: AtomicBool,
    }

    impl FakeProbe {
        fn new(worker_running: bool) -> Arc<Self> {
            Arc::new(Self {
                worker_running: AtomicBool::new(worker_running),
            })
        }
    }

    impl ProcessProbe for FakeProbe {
        fn pid_alive(&self, _pid: u32) -> bool {
            true
        }

        fn worker_running(&self, _pattern: &str) -> bool {
            self.worker_running.load(Ordering::Relaxed)
        }
    }

    fn test_config(dir: &TempDir) -> Config {
        Config {
            status_dir: dir.path().to_path_buf(),
            poll_interval: Duration::from_millis(20),
            process_check_interval: Duration::from_millis(40),
            debounce_window: Duration::from_millis(10),
            ..Config::default()
        }
    }

    fn write_status(dir: &TempDir, name: &str, state: SessionState) {
        let record = StatusRecord {
            state,
            message: None,
            timestamp: Utc::now(),
            project: "demo".to_string(),
            owner_pid: None,
        };
        fs::write(dir.path().join(name), encode(&record)).unwrap();
    }

    async fn wait_for_aggregate(
        rx: &mut watch::Receiver<StatusSnapshot>,
        expected: AggregateStatus,
    ) -> StatusSnapshot {
        timeout(Duration::from_secs(5), async {
            loop {
                if rx.borrow().aggregate == expected {
                    return rx.borrow().clone();
                }
                rx.changed().await.expect("publisher dropped");
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {expected:?}"))
    }

    #[tokio::test]
    async fn initial_snapshot_is_not_running() {
        let dir = TempDir::new().unwrap();
        let engine = StatusEngine::new(test_config(&dir), FakeProbe::new(false));

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.aggregate, AggregateStatus::NotRunning);
        assert!(snapshot.sessions.is_empty());
    }

    #[tokio::test]
    async fn engine_discovers_sessions_and_publishes() {
        let dir = TempDir::new().unwrap();
        write_status(&dir, "vibestatus-abc.json", SessionState::Working);

        let mut engine = StatusEngine::new(test_config(&dir), FakeProbe::new(true));
        let mut rx = engine.subscribe();
        engine.start().unwrap();

        let snapshot = wait_for_aggregate(&mut rx, AggregateStatus::Working).await;
        assert_eq!(snapshot.active_session_count, 1);
        assert_eq!(snapshot.sessions[0].id, "vibestatus-abc.json");

        engine.stop().await;
    }

    #[tokio::test]
    async fn transition_to_idle_requests_idle_sound() {
        let dir = TempDir::new().unwrap();
        write_status(&dir, "vibestatus-abc.json", SessionState::Working);

        let (sound_tx, mut sound_rx) = mpsc::unbounded_channel();
        let mut engine = StatusEngine::new(test_config(&dir), FakeProbe::new(true));
        engine.set_sound_hook(move |id| {
            let _ = sound_tx.send(id.to_string());
        });

        let mut rx = engine.subscribe();
        engine.start().unwrap();
        wait_for_aggregate(&mut rx, AggregateStatus::Working).await;

        write_status(&dir, "vibestatus-abc.json", SessionState::Idle);
        engine.request_cycle();

        let sound = timeout(Duration::from_secs(5), sound_rx.recv())
            .await
            .expect("timed out waiting for sound")
            .expect("sound channel closed");
        assert_eq!(sound, "Glass");

        engine.stop().await;
    }

    #[tokio::test]
    async fn start_twice_fails() {
        let dir = TempDir::new().unwrap();
        let mut engine = StatusEngine::new(test_config(&dir), FakeProbe::new(false));

        engine.start().unwrap();
        assert!(matches!(engine.start(), Err(EngineError::AlreadyStarted)));

        engine.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut engine = StatusEngine::new(test_config(&dir), FakeProbe::new(false));

        engine.start().unwrap();
        engine.stop().await;
        engine.stop().await;
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let mut engine = StatusEngine::new(test_config(&dir), FakeProbe::new(false));
        engine.stop().await;
    }

    #[tokio::test]
    async fn no_publish_after_stop() {
        let dir = TempDir::new().unwrap();
        let mut engine = StatusEngine::new(test_config(&dir), FakeProbe::new(true));
        let rx = engine.subscribe();
        engine.start().unwrap();
        engine.stop().await;

        // A file appearing after stop must never surface.
        write_status(&dir, "vibestatus-late.json", SessionState::Working);
        engine.request_cycle();
        sleep(Duration::from_millis(150)).await;

        assert_eq!(rx.borrow().aggregate, AggregateStatus::NotRunning);
        assert_eq!(engine.snapshot().aggregate, AggregateStatus::NotRunning);
    }

    #[tokio::test]
    async fn scan_errors_accumulate_in_counter() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("vibestatus-bad.json"), b"garbage").unwrap();

        let mut engine = StatusEngine::new(test_config(&dir), FakeProbe::new(true));
        engine.start().unwrap();

        timeout(Duration::from_secs(5), async {
            while engine.error_count() == 0 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("error counter never moved");

        engine.stop().await;
    }

    #[tokio::test]
    async fn worker_appearance_triggers_immediate_cycle() {
        let dir = TempDir::new().unwrap();
        let probe = FakeProbe::new(false);

        let mut config = test_config(&dir);
        // Slow the poll far past the probe interval so the extra cycle is
        // attributable to the family appearing.
        config.poll_interval = Duration::from_secs(30);
        config.process_check_interval = Duration::from_millis(30);

        let probe_dyn: Arc<dyn ProcessProbe> = probe.clone();
        let mut engine = StatusEngine::new(config, probe_dyn);
        let mut rx = engine.subscribe();
        engine.start().unwrap();

        // Let the first poll tick pass, then bring the worker up with a
        // session file already in place.
        sleep(Duration::from_millis(60)).await;
        write_status(&dir, "vibestatus-abc.json", SessionState::Working);
        probe.worker_running.store(true, Ordering::Relaxed);

        let snapshot = wait_for_aggregate(&mut rx, AggregateStatus::Working).await;
        assert_eq!(snapshot.active_session_count, 1);

        engine.stop().await;
    }
}
