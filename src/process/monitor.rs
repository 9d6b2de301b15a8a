use crate::process::{ManagedProcess, ProcessState};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Samples resident memory and CPU usage of supervised processes
pub struct ProcessMonitor {
    system: System,
}

impl ProcessMonitor {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    fn refresh_kind() -> ProcessRefreshKind {
        ProcessRefreshKind::new().with_memory().with_cpu()
    }

    /// Refresh memory and CPU figures for every running process.
    ///
    /// Exit detection is not done here: a child that exited but has not
    /// been reaped still shows up as a zombie, so crashes are detected by
    /// the manager through `try_wait`.
    pub fn update_all_stats<'a, I>(&mut self, processes: I)
    where
        I: Iterator<Item = &'a mut ManagedProcess>,
    {
        let running: Vec<&'a mut ManagedProcess> = processes
            .filter(|p| p.state == ProcessState::Running)
            .collect();

        if running.is_empty() {
            return;
        }

        let pids: Vec<Pid> = running
            .iter()
            .map(|p| Pid::from_u32(p.stats.pid))
            .collect();

        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&pids),
            true,
            Self::refresh_kind(),
        );

        for process in running {
            if let Some(sys_process) = self.system.process(Pid::from_u32(process.stats.pid)) {
                process.stats.cpu_usage = sys_process.cpu_usage();
                process.stats.memory_usage = sys_process.memory();
            }
        }
    }
}

impl Default for ProcessMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessSpec;
    use crate::process::spawner::spawn_process;
    use crate::process::ProcessId;

    async fn managed_sleeper(id: u64, name: &str) -> ManagedProcess {
        let mut spec = ProcessSpec::new(name, "/bin/sleep");
        spec.args = "5".to_string();
        let spawned = spawn_process(&spec, false).await.unwrap();
        ManagedProcess::new(ProcessId::new(id), name.to_string(), spec, spawned)
    }

    #[tokio::test]
    async fn test_update_all_stats_reads_running_processes() {
        let mut monitor = ProcessMonitor::new();

        let mut running = managed_sleeper(1, "plancake-api").await;
        running.mark_running();
        let mut stopped = managed_sleeper(2, "celery-beat").await;
        stopped.mark_stopped();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        monitor.update_all_stats([&mut running, &mut stopped].into_iter());

        assert!(running.stats.memory_usage > 0);
        // Only running processes are sampled
        assert_eq!(stopped.stats.memory_usage, 0);

        for process in [&mut running, &mut stopped] {
            let _ = process.child.kill().await;
        }
    }

    #[test]
    fn test_update_all_stats_with_nothing_running() {
        let mut monitor = ProcessMonitor::default();
        monitor.update_all_stats(std::iter::empty());
    }
}
