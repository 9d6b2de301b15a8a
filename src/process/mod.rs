// Process lifecycle: spawning, monitoring, restarting and stopping

mod manager;
pub mod monitor;
pub mod restart;
pub mod spawner;
pub mod supervisor;
mod types;

pub use manager::ProcessManager;
pub use monitor::ProcessMonitor;
pub use restart::{BackoffStrategy, RestartPolicy, RestartTracker};
pub use spawner::{resolve_script, spawn_process, SpawnedProcess};
pub use supervisor::{HealthReport, ProcessSupervisor, SupervisorConfig};
pub use types::{ManagedProcess, ProcessId, ProcessState, ProcessStats};
