use crate::config::ProcessSpec;
use crate::process::restart::{RestartPolicy, RestartTracker};
use crate::process::spawner::SpawnedProcess;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tokio::process::Child;

/// Identifier the supervisor assigns to each launched process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessId(pub u64);

impl ProcessId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Starting,
    Running,
    /// Exited and due to be relaunched once its backoff has passed
    Waiting,
    Stopping,
    Stopped,
    Errored,
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::Starting => write!(f, "starting"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Waiting => write!(f, "waiting"),
            ProcessState::Stopping => write!(f, "stopping"),
            ProcessState::Stopped => write!(f, "stopped"),
            ProcessState::Errored => write!(f, "errored"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStats {
    pub pid: u32,
    pub started_at: SystemTime,
    pub restarts: usize,
    pub cpu_usage: f32,
    /// Resident memory in bytes
    pub memory_usage: u64,
    pub last_restart: Option<SystemTime>,
    /// Exit code of the last run; None while running or when killed by a signal
    pub last_exit_code: Option<i32>,
    pub memory_violations: usize,
}

impl ProcessStats {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            started_at: SystemTime::now(),
            restarts: 0,
            cpu_usage: 0.0,
            memory_usage: 0,
            last_restart: None,
            last_exit_code: None,
            memory_violations: 0,
        }
    }

    pub fn uptime(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.started_at)
            .unwrap_or(Duration::from_secs(0))
    }

    pub fn record_restart(&mut self, new_pid: u32) {
        self.restarts += 1;
        self.last_restart = Some(SystemTime::now());
        self.started_at = SystemTime::now();
        self.pid = new_pid;
        self.cpu_usage = 0.0;
        self.memory_usage = 0;
    }

    pub fn record_memory_violation(&mut self) {
        self.memory_violations += 1;
    }
}

#[derive(Debug)]
pub struct ManagedProcess {
    pub id: ProcessId,
    /// Instance name (`name` or `name-N`)
    pub name: String,
    /// Manifest record this instance was launched from
    pub group: String,
    pub spec: ProcessSpec,
    pub state: ProcessState,
    pub child: Child,
    pub stats: ProcessStats,
    pub restart_policy: RestartPolicy,
    pub restart_tracker: RestartTracker,
    /// When a `Waiting` process is due to be relaunched
    pub next_restart_at: Option<Instant>,
}

impl ManagedProcess {
    pub fn new(id: ProcessId, group: String, spec: ProcessSpec, spawned: SpawnedProcess) -> Self {
        let restart_policy = RestartPolicy::from_spec(&spec);

        Self {
            id,
            name: spawned.name,
            group,
            spec,
            state: ProcessState::Starting,
            child: spawned.child,
            stats: ProcessStats::new(spawned.pid),
            restart_policy,
            restart_tracker: RestartTracker::new(),
            next_restart_at: None,
        }
    }

    /// Swap in a freshly launched child after a restart
    pub fn replace_child(&mut self, spawned: SpawnedProcess) {
        self.child = spawned.child;
        self.stats.record_restart(spawned.pid);
        self.state = ProcessState::Running;
        self.next_restart_at = None;
    }

    /// Park the process until `at`, when the supervisor relaunches it
    pub fn schedule_restart(&mut self, at: Instant) {
        self.state = ProcessState::Waiting;
        self.next_restart_at = Some(at);
    }

    pub fn restart_due(&self, now: Instant) -> bool {
        self.state == ProcessState::Waiting
            && self.next_restart_at.map(|at| at <= now).unwrap_or(false)
    }

    pub fn mark_running(&mut self) {
        self.state = ProcessState::Running;
    }

    pub fn mark_stopping(&mut self) {
        self.state = ProcessState::Stopping;
    }

    pub fn mark_stopped(&mut self) {
        self.state = ProcessState::Stopped;
        self.next_restart_at = None;
    }

    pub(crate) fn mark_errored(&mut self) {
        self.state = ProcessState::Errored;
        self.next_restart_at = None;
    }
}
