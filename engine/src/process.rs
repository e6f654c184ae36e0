//! Process liveness probing.
//!
//! The engine needs two answers from the operating system: "is the process
//! with this identifier alive" (to reclaim sessions whose writer crashed
//! without a final update) and "is any worker process of this family
//! running" (for the `not_running` fallback). Both are expressed through
//! the [`ProcessProbe`] trait so tests can substitute deterministic fakes.

use std::sync::Mutex;

use sysinfo::{Pid, ProcessRefreshKind, System};
use tracing::trace;

/// Capability interface for process liveness checks.
pub trait ProcessProbe: Send + Sync {
    /// Returns whether a process with the given identifier is alive.
    fn pid_alive(&self, pid: u32) -> bool;

    /// Returns whether any process whose name matches `pattern`
    /// (case-insensitive substring) is currently running.
    fn worker_running(&self, pattern: &str) -> bool;
}

/// [`ProcessProbe`] backed by the system process table.
pub struct SystemProbe {
    /// Refreshing the process table requires exclusive access.
    system: Mutex<System>,
}

impl SystemProbe {
    /// Creates a probe over the live system process table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for SystemProbe {
    fn pid_alive(&self, pid: u32) -> bool {
        let Ok(mut sys) = self.system.lock() else {
            // A poisoned lock means a panic elsewhere; report alive so the
            // scanner never deletes a session file on bad information.
            return true;
        };

        let sys_pid = Pid::from_u32(pid);
        sys.refresh_process_specifics(sys_pid, ProcessRefreshKind::new());
        let alive = sys.process(sys_pid).is_some();

        trace!(pid, alive, "Probed process liveness");
        alive
    }

    fn worker_running(&self, pattern: &str) -> bool {
        let Ok(mut sys) = self.system.lock() else {
            return true;
        };

        sys.refresh_processes_specifics(ProcessRefreshKind::new());

        let needle = pattern.to_lowercase();
        let running = sys
            .processes()
            .values()
            .any(|process| process.name().to_lowercase().contains(&needle));

        trace!(pattern, running, "Probed worker process family");
        running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_pid_is_alive() {
        let probe = SystemProbe::new();
        assert!(probe.pid_alive(std::process::id()));
    }

    #[test]
    fn probe_is_usable_behind_dyn_trait() {
        let probe: Box<dyn ProcessProbe> = Box::new(SystemProbe::new());
        assert!(probe.pid_alive(std::process::id()));
    }
}
