use crate::config::SupervisorSettings;
use crate::error::{PmError, Result};
use crate::process::{ProcessId, ProcessManager};
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Time between health checks
    pub check_interval: Duration,
    /// Restart crashed processes and enforce memory ceilings
    pub enabled: bool,
}

impl SupervisorConfig {
    pub fn from_settings(settings: &SupervisorSettings) -> Self {
        Self {
            check_interval: settings.check_interval(),
            enabled: true,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from_settings(&SupervisorSettings::default())
    }
}

/// What a single health check did
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HealthReport {
    /// Processes found exited since the previous check
    pub crashed: Vec<ProcessId>,
    /// Waiting processes relaunched this round
    pub restarted: Vec<ProcessId>,
    /// Crashed processes left errored (autorestart off or restart limit hit)
    pub given_up: Vec<ProcessId>,
    /// Processes restarted for exceeding their memory ceiling
    pub memory_restarts: Vec<ProcessId>,
}

impl HealthReport {
    pub fn is_quiet(&self) -> bool {
        self.crashed.is_empty() && self.restarted.is_empty() && self.memory_restarts.is_empty()
    }
}

/// Watches the processes owned by a `ProcessManager` and reacts to crashes
/// and memory overruns
pub struct ProcessSupervisor {
    config: SupervisorConfig,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(SupervisorConfig::default())
    }

    pub fn check_interval(&self) -> Duration {
        self.config.check_interval
    }

    /// Perform a single health check cycle.
    ///
    /// Crashed processes are queued for relaunch and every process whose
    /// backoff has passed is relaunched; no check waits out a backoff. Stats
    /// are refreshed afterwards and memory ceilings enforced against them.
    pub async fn check_health(&mut self, manager: &mut ProcessManager) -> Result<HealthReport> {
        let mut report = HealthReport::default();

        if !self.config.enabled {
            return Ok(report);
        }

        debug!("Performing health check");

        report.crashed = manager.detect_crashes();

        if !report.crashed.is_empty() {
            info!("Detected {} exited process(es)", report.crashed.len());
        }

        for process_id in report.crashed.clone() {
            match self.handle_crash(manager, process_id) {
                Ok(true) => {}
                Ok(false) => report.given_up.push(process_id),
                Err(e) => {
                    error!("Failed to handle crash for process {}: {}", process_id, e);
                    report.given_up.push(process_id);
                }
            }
        }

        report.restarted = manager.relaunch_due().await;

        manager.update_stats();

        report.memory_restarts = manager
            .check_memory_limits()
            .await
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        Ok(report)
    }

    /// Queue a crashed process for relaunch if its policy allows it.
    ///
    /// Returns `Ok(false)` when the process is left errored.
    fn handle_crash(&self, manager: &mut ProcessManager, process_id: ProcessId) -> Result<bool> {
        let process = manager
            .get_status(process_id)
            .ok_or_else(|| PmError::ProcessNotFound(process_id.to_string()))?;

        let process_name = process.name.clone();
        let exit_code = process.stats.last_exit_code;

        if !process.spec.autorestart {
            info!(
                "Process '{}' (id: {}) exited with {:?}; autorestart is off",
                process_name, process_id, exit_code
            );
            return Ok(false);
        }

        if manager.schedule_restart(process_id)? {
            info!(
                "Process '{}' (id: {}) exited with {:?}; restart scheduled",
                process_name, process_id, exit_code
            );
            return Ok(true);
        }

        let restart_count = manager
            .get_restart_info(process_id)
            .map(|(count, _)| count)
            .unwrap_or(0);
        warn!(
            "Process '{}' (id: {}) restarted {} times within the window, giving up",
            process_name, process_id, restart_count
        );

        Ok(false)
    }
}
