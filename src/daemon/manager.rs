// Supervisor lifecycle seen from the outside: one instance per PID file

use super::pid::PidFile;
use crate::error::{PmError, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// How a running supervisor went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited after SIGTERM
    Graceful,
    /// Needed SIGKILL after the timeout
    Killed,
}

pub struct DaemonManager {
    pid_file: PidFile,
}

impl DaemonManager {
    pub fn with_pid_file(pid_file: PidFile) -> Self {
        Self { pid_file }
    }

    pub fn is_running(&self) -> bool {
        self.get_pid().is_some()
    }

    pub fn get_pid(&self) -> Option<u32> {
        self.pid_file.running_pid()
    }

    /// Claim the PID file for the current process.
    ///
    /// Fails if another live supervisor holds it; a stale file is replaced.
    pub fn register(&self) -> Result<()> {
        if let Some(pid) = self.get_pid() {
            if pid != std::process::id() {
                return Err(PmError::SupervisorAlreadyRunning(pid));
            }
        }

        if self.pid_file.exists() {
            tracing::debug!("Removing stale PID file {}", self.pid_file.path().display());
            self.pid_file.remove()?;
        }

        self.pid_file.write()
    }

    /// Release the PID file, but only if it still names this process
    pub fn unregister(&self) -> Result<()> {
        match self.pid_file.read() {
            Ok(pid) if pid != std::process::id() => Ok(()),
            _ => self.pid_file.remove(),
        }
    }

    /// Ask the running supervisor to shut down.
    ///
    /// Sends SIGTERM, waits up to `timeout` for it to exit, then SIGKILLs it.
    pub fn stop(&self, timeout: Duration) -> Result<StopOutcome> {
        let pid = self.get_pid().ok_or(PmError::SupervisorNotRunning)?;
        let target = Pid::from_raw(pid as i32);

        tracing::info!("Sending SIGTERM to supervisor (PID: {})", pid);
        kill(target, Signal::SIGTERM)
            .map_err(|e| PmError::SignalError(format!("Failed to send SIGTERM: {}", e)))?;

        if self.wait_for_exit(timeout) {
            self.pid_file.remove()?;
            return Ok(StopOutcome::Graceful);
        }

        tracing::warn!(
            "Supervisor (PID: {}) did not stop within {:?}, sending SIGKILL",
            pid,
            timeout
        );
        kill(target, Signal::SIGKILL)
            .map_err(|e| PmError::SignalError(format!("Failed to send SIGKILL: {}", e)))?;

        if self.wait_for_exit(Duration::from_secs(2)) {
            self.pid_file.remove()?;
            return Ok(StopOutcome::Killed);
        }

        Err(PmError::Other(format!(
            "Supervisor (PID: {}) is still running after SIGKILL",
            pid
        )))
    }

    fn wait_for_exit(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if !self.is_running() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        !self.is_running()
    }

    pub fn get_status(&self) -> DaemonStatus {
        let pid = self.get_pid();
        DaemonStatus {
            running: pid.is_some(),
            pid,
            pid_file: self.pid_file.path().to_path_buf(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub pid_file: PathBuf,
}
