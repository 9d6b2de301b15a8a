use crate::config::ProcessSpec;
use crate::error::{PmError, Result};
use crate::logs::LogManager;
use crate::process::monitor::ProcessMonitor;
use crate::process::spawner::{spawn_process, SpawnedProcess};
use crate::process::types::{ManagedProcess, ProcessId, ProcessState};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use tokio::time::Instant;

/// Owns every launched process and drives its lifecycle
pub struct ProcessManager {
    processes: BTreeMap<ProcessId, ManagedProcess>,
    next_id: u64,
    monitor: ProcessMonitor,
    logs: Option<LogManager>,
}

impl ProcessManager {
    /// Manager that discards process output
    pub fn new() -> Self {
        Self {
            processes: BTreeMap::new(),
            next_id: 1,
            monitor: ProcessMonitor::new(),
            logs: None,
        }
    }

    /// Manager that routes process output through `logs` on every launch
    pub fn with_log_manager(logs: LogManager) -> Self {
        Self {
            logs: Some(logs),
            ..Self::new()
        }
    }

    pub fn log_manager(&self) -> Option<&LogManager> {
        self.logs.as_ref()
    }

    async fn launch(&self, spec: &ProcessSpec) -> Result<SpawnedProcess> {
        let mut spawned = spawn_process(spec, self.logs.is_some()).await?;

        if let Some(ref logs) = self.logs {
            if let Err(e) = logs.capture(&spec.name, &mut spawned.child) {
                tracing::warn!("Failed to capture output of {}: {}", spec.name, e);
            }
        }

        Ok(spawned)
    }

    /// Launch a single process from a record
    pub async fn spawn(&mut self, spec: ProcessSpec) -> Result<ProcessId> {
        let group = spec.name.clone();
        self.spawn_in_group(spec, group).await
    }

    async fn spawn_in_group(&mut self, spec: ProcessSpec, group: String) -> Result<ProcessId> {
        if self.processes.values().any(|p| p.name == spec.name) {
            return Err(PmError::ProcessAlreadyExists(spec.name.clone()));
        }

        spec.validate()?;

        let spawned = self.launch(&spec).await?;
        let id = ProcessId::new(self.next_id);
        self.next_id += 1;

        tracing::info!(
            "Started {} (id: {}, PID: {})",
            spawned.name,
            id,
            spawned.pid
        );

        let mut managed = ManagedProcess::new(id, group, spec, spawned);
        managed.mark_running();
        self.processes.insert(id, managed);

        Ok(id)
    }

    /// Launch every instance of a record.
    ///
    /// Instances that fail to launch are logged and skipped; the call fails
    /// only when none of them started.
    pub async fn spawn_instances(&mut self, spec: ProcessSpec) -> Result<Vec<ProcessId>> {
        let group = spec.name.clone();
        let mut ids = Vec::new();
        let mut first_error = None;

        for instance_name in spec.instance_names() {
            let mut instance = spec.clone();
            instance.name = instance_name.clone();
            instance.instances = 1;

            match self.spawn_in_group(instance, group.clone()).await {
                Ok(id) => ids.push(id),
                Err(e) => {
                    tracing::error!("Failed to start {}: {}", instance_name, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if ids.is_empty() => Err(e),
            _ => Ok(ids),
        }
    }

    /// Stop one process with its stop signal (SIGKILL when `force`),
    /// escalating to SIGKILL if it outlives its stop timeout
    pub async fn stop(&mut self, id: ProcessId, force: bool) -> Result<()> {
        let process = self
            .processes
            .get_mut(&id)
            .ok_or_else(|| PmError::ProcessNotFound(id.to_string()))?;

        if let Some(deadline) = Self::begin_stop(process, force)? {
            Self::finish_stop(process, deadline).await?;
        }

        Ok(())
    }

    /// Signal the process group and return the deadline for it to exit.
    ///
    /// Returns `None` when the process had already exited.
    fn begin_stop(process: &mut ManagedProcess, force: bool) -> Result<Option<Instant>> {
        // Already exited: nothing to signal, and the PID may have been reused
        if let Ok(Some(status)) = process.child.try_wait() {
            process.stats.last_exit_code = status.code();
            process.mark_stopped();
            tracing::debug!("Process {} had already exited", process.name);
            return Ok(None);
        }

        let stop_signal = if force {
            Signal::SIGKILL
        } else {
            Self::parse_signal(&process.spec.stop_signal)?
        };

        process.mark_stopping();

        tracing::info!(
            "Stopping process {} (PID: {}) with {}",
            process.name,
            process.stats.pid,
            stop_signal.as_str()
        );

        signal_group(process.stats.pid, stop_signal).map_err(|e| {
            PmError::StopError(
                process.name.clone(),
                format!("Failed to send {}: {}", stop_signal.as_str(), e),
            )
        })?;

        Ok(Some(Instant::now() + process.spec.stop_timeout()))
    }

    /// Wait for a signalled process, sending SIGKILL once `deadline` passes
    async fn finish_stop(process: &mut ManagedProcess, deadline: Instant) -> Result<()> {
        let status = match tokio::time::timeout_at(deadline, process.child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(PmError::StopError(
                    process.name.clone(),
                    format!("Wait failed: {}", e),
                ));
            }
            Err(_) => {
                tracing::warn!(
                    "Process {} did not exit within {:?}, sending SIGKILL",
                    process.name,
                    process.spec.stop_timeout()
                );
                signal_group(process.stats.pid, Signal::SIGKILL).map_err(|e| {
                    PmError::StopError(
                        process.name.clone(),
                        format!("Failed to send SIGKILL after timeout: {}", e),
                    )
                })?;
                process.child.wait().await.map_err(|e| {
                    PmError::StopError(process.name.clone(), format!("Wait failed: {}", e))
                })?
            }
        };

        // Descendants that outlived the group leader
        if let Err(e) = signal_group(process.stats.pid, Signal::SIGKILL) {
            tracing::debug!("Failed to clear process group of {}: {}", process.name, e);
        }

        process.stats.last_exit_code = status.code();
        process.mark_stopped();

        tracing::info!("Process {} stopped ({})", process.name, status);

        Ok(())
    }

    fn parse_signal(signal_name: &str) -> Result<Signal> {
        match signal_name {
            "SIGTERM" => Ok(Signal::SIGTERM),
            "SIGINT" => Ok(Signal::SIGINT),
            "SIGQUIT" => Ok(Signal::SIGQUIT),
            "SIGKILL" => Ok(Signal::SIGKILL),
            "SIGHUP" => Ok(Signal::SIGHUP),
            "SIGUSR1" => Ok(Signal::SIGUSR1),
            "SIGUSR2" => Ok(Signal::SIGUSR2),
            _ => Err(PmError::SignalError(format!(
                "Invalid signal name: {}",
                signal_name
            ))),
        }
    }

    pub fn get_status(&self, id: ProcessId) -> Option<&ManagedProcess> {
        self.processes.get(&id)
    }

    /// Processes in launch order
    pub fn list(&self) -> Vec<&ManagedProcess> {
        self.processes.values().collect()
    }

    pub fn get_mut(&mut self, id: ProcessId) -> Option<&mut ManagedProcess> {
        self.processes.get_mut(&id)
    }

    pub fn remove(&mut self, id: ProcessId) -> Result<ManagedProcess> {
        self.processes
            .remove(&id)
            .ok_or_else(|| PmError::ProcessNotFound(id.to_string()))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ManagedProcess> {
        self.processes.values().find(|p| p.name == name)
    }

    pub fn update_stats(&mut self) {
        self.monitor.update_all_stats(self.processes.values_mut());
    }

    /// Reap exited children and mark them errored
    pub fn detect_crashes(&mut self) -> Vec<ProcessId> {
        let mut crashed = Vec::new();

        for (id, process) in self.processes.iter_mut() {
            if process.state != ProcessState::Running {
                continue;
            }

            match process.child.try_wait() {
                Ok(Some(status)) => {
                    process.stats.last_exit_code = status.code();
                    process.stats.cpu_usage = 0.0;
                    process.stats.memory_usage = 0;
                    process.mark_errored();
                    tracing::warn!(
                        "Process {} (id: {}, PID: {}) exited: {}",
                        process.name,
                        id,
                        process.stats.pid,
                        status
                    );
                    crashed.push(*id);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Failed to poll process {}: {}", process.name, e);
                }
            }
        }

        crashed
    }

    /// Stop and relaunch a process, regardless of its restart policy.
    ///
    /// When the relaunch fails the process is handed to the restart policy
    /// like any other exit.
    pub async fn restart(&mut self, id: ProcessId) -> Result<()> {
        let spec = self
            .processes
            .get(&id)
            .map(|p| p.spec.clone())
            .ok_or_else(|| PmError::ProcessNotFound(id.to_string()))?;

        self.stop(id, false).await?;

        let spawned = match self.launch(&spec).await {
            Ok(spawned) => spawned,
            Err(e) => {
                tracing::error!("Failed to relaunch {}: {}", spec.name, e);
                self.schedule_restart(id)?;
                return Err(e);
            }
        };

        let process = self
            .processes
            .get_mut(&id)
            .ok_or_else(|| PmError::ProcessNotFound(id.to_string()))?;

        tracing::info!(
            "Restarted {} (id: {}, new PID: {})",
            process.name,
            id,
            spawned.pid
        );
        process.replace_child(spawned);

        Ok(())
    }

    /// Queue an exited process for relaunch if its restart policy allows it.
    ///
    /// Nothing is launched here: `relaunch_due` picks the process up once the
    /// backoff delay has passed. Returns `false`, leaving the process
    /// errored, when the policy refuses.
    pub fn schedule_restart(&mut self, id: ProcessId) -> Result<bool> {
        let process = self
            .processes
            .get_mut(&id)
            .ok_or_else(|| PmError::ProcessNotFound(id.to_string()))?;

        if !process
            .restart_policy
            .should_restart(&process.restart_tracker)
        {
            process.mark_errored();
            return Ok(false);
        }

        let delay = process
            .restart_policy
            .calculate_delay(&process.restart_tracker);

        tracing::debug!("Relaunching {} in {:?}", process.name, delay);
        process.schedule_restart(Instant::now() + delay);

        Ok(true)
    }

    /// Relaunch every waiting process whose backoff has passed.
    ///
    /// Each attempt counts against the restart limit; a failed launch goes
    /// back through `schedule_restart`.
    pub async fn relaunch_due(&mut self) -> Vec<ProcessId> {
        let now = Instant::now();
        let due: Vec<(ProcessId, ProcessSpec)> = self
            .processes
            .values()
            .filter(|p| p.restart_due(now))
            .map(|p| (p.id, p.spec.clone()))
            .collect();

        let mut relaunched = Vec::new();

        for (id, spec) in due {
            let result = self.launch(&spec).await;

            let Some(process) = self.processes.get_mut(&id) else {
                continue;
            };
            process.restart_tracker.record_restart();

            match result {
                Ok(spawned) => {
                    tracing::info!(
                        "Restarted {} (id: {}, new PID: {})",
                        process.name,
                        id,
                        spawned.pid
                    );
                    process.replace_child(spawned);
                    relaunched.push(id);
                }
                Err(e) => {
                    tracing::error!("Failed to relaunch {}: {}", spec.name, e);
                    if let Ok(false) = self.schedule_restart(id) {
                        tracing::warn!("Giving up on {}", spec.name);
                    }
                }
            }
        }

        relaunched
    }

    /// Restart count within the window and whether another restart is allowed
    pub fn get_restart_info(&self, id: ProcessId) -> Option<(usize, bool)> {
        self.processes.get(&id).map(|p| {
            let count = p.restart_tracker.restart_count();
            let should_restart = p.restart_policy.should_restart(&p.restart_tracker);
            (count, should_restart)
        })
    }

    /// Restart every running process whose resident memory exceeds its ceiling.
    ///
    /// Relies on figures from the last `update_stats` call.
    pub async fn check_memory_limits(&mut self) -> Vec<(ProcessId, String)> {
        let mut over_limit = Vec::new();

        for (id, process) in self.processes.iter_mut() {
            if process.state != ProcessState::Running {
                continue;
            }

            if let Some(limit) = process.spec.max_memory_restart {
                if process.stats.memory_usage > limit.bytes() {
                    process.stats.record_memory_violation();
                    let msg = format!(
                        "Process {} exceeded memory limit: {} bytes (limit: {})",
                        process.name, process.stats.memory_usage, limit
                    );
                    tracing::warn!("{}", msg);
                    over_limit.push((*id, msg));
                }
            }
        }

        let mut violations = Vec::new();

        for (id, msg) in over_limit {
            tracing::info!("Restarting process {} due to memory limit", id);
            match self.restart(id).await {
                Ok(()) => violations.push((id, format!("{} (restarted)", msg))),
                Err(e) => {
                    tracing::error!("Failed to restart process {}: {}", id, e);
                    violations.push((id, format!("{} (restart failed: {})", msg, e)));
                }
            }
        }

        violations
    }

    /// Stop every process.
    ///
    /// All stop signals go out first, then each process is waited on against
    /// its own deadline, so the whole call takes about the longest
    /// `stop_timeout` rather than their sum.
    pub async fn stop_all(&mut self) -> Result<()> {
        let mut pending = Vec::new();

        for process in self
            .processes
            .values_mut()
            .filter(|p| p.state != ProcessState::Stopped)
        {
            match Self::begin_stop(process, false) {
                Ok(Some(deadline)) => pending.push((process.id, deadline)),
                Ok(None) => {}
                Err(e) => tracing::error!("Failed to stop process {}: {}", process.name, e),
            }
        }

        tracing::info!("Waiting for {} process(es) to exit", pending.len());

        for (id, deadline) in pending {
            if let Some(process) = self.processes.get_mut(&id) {
                if let Err(e) = Self::finish_stop(process, deadline).await {
                    tracing::error!("Failed to stop process {}: {}", id, e);
                }
            }
        }

        Ok(())
    }
}

/// Send `sig` to the process group led by `pid`
fn signal_group(pid: u32, sig: Signal) -> nix::Result<()> {
    match signal::killpg(Pid::from_raw(pid as i32), sig) {
        Err(Errno::ESRCH) => Ok(()),
        other => other,
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}
