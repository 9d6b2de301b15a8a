// The supervisor loop: launch, watch, publish status, shut down on signal

use super::manager::DaemonManager;
use super::pid::PidFile;
use crate::config::{ProcessSpec, SupervisorSettings};
use crate::error::{PmError, Result};
use crate::logs::LogManager;
use crate::process::{HealthReport, ProcessManager, ProcessSupervisor, SupervisorConfig};
use crate::state::{StateStore, StatusSnapshot};
use std::future::Future;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// SIGINT/SIGTERM listeners, installed up front so no signal is missed
pub struct ShutdownSignal {
    sigterm: Signal,
    sigint: Signal,
}

impl ShutdownSignal {
    pub fn install() -> Result<Self> {
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| PmError::SignalError(format!("Failed to install SIGTERM handler: {}", e)))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| PmError::SignalError(format!("Failed to install SIGINT handler: {}", e)))?;

        Ok(Self { sigterm, sigint })
    }

    pub async fn recv(mut self) {
        tokio::select! {
            _ = self.sigterm.recv() => info!("Received SIGTERM"),
            _ = self.sigint.recv() => info!("Received SIGINT"),
        }
    }
}

pub struct Runtime {
    manager: ProcessManager,
    supervisor: ProcessSupervisor,
    store: StateStore,
    snapshot: StatusSnapshot,
    records: Vec<ProcessSpec>,
}

impl Runtime {
    /// Prepare a runtime for `records`; nothing is launched yet
    pub async fn new(
        settings: &SupervisorSettings,
        records: Vec<ProcessSpec>,
        manifest_source: impl Into<String>,
    ) -> Result<Self> {
        let logs = LogManager::new(&settings.log_dir, settings.max_log_size.bytes()).await?;

        Ok(Self {
            manager: ProcessManager::with_log_manager(logs),
            supervisor: ProcessSupervisor::new(SupervisorConfig::from_settings(settings)),
            store: StateStore::new(&settings.state_file),
            snapshot: StatusSnapshot::new(manifest_source),
            records,
        })
    }

    pub fn manager(&self) -> &ProcessManager {
        &self.manager
    }

    pub fn snapshot(&self) -> &StatusSnapshot {
        &self.snapshot
    }

    /// Launch every record in manifest order.
    ///
    /// A record that fails to launch is logged and skipped. Fails only when
    /// nothing could be launched at all.
    pub async fn start_all(&mut self) -> Result<usize> {
        let mut launched = 0;
        let mut failed = Vec::new();

        for spec in self.records.clone() {
            let name = spec.name.clone();
            match self.manager.spawn_instances(spec).await {
                Ok(ids) => launched += ids.len(),
                Err(e) => {
                    error!("Failed to start {}: {}", name, e);
                    failed.push(name);
                }
            }
        }

        self.write_snapshot();

        if launched == 0 && !self.records.is_empty() {
            return Err(PmError::SpawnError(format!(
                "No process could be started (failed: {})",
                failed.join(", ")
            )));
        }

        if failed.is_empty() {
            info!("Started {} process(es)", launched);
        } else {
            warn!(
                "Started {} process(es); failed to start: {}",
                launched,
                failed.join(", ")
            );
        }

        Ok(launched)
    }

    /// One supervision round followed by a snapshot write
    pub async fn tick(&mut self) -> Result<HealthReport> {
        let report = self.supervisor.check_health(&mut self.manager).await?;
        if !report.is_quiet() {
            debug!("Health check: {:?}", report);
        }
        self.write_snapshot();
        Ok(report)
    }

    /// Supervise until `shutdown` resolves, then stop everything
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<StatusSnapshot>
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.supervisor.check_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("Health check failed: {}", e);
                    }
                }
            }
        }

        self.shutdown().await
    }

    /// Stop every process gracefully and publish the final snapshot
    pub async fn shutdown(&mut self) -> Result<StatusSnapshot> {
        info!("Shutting down supervisor");

        self.manager.stop_all().await?;

        self.snapshot.capture(self.manager.list());
        self.snapshot.mark_stopped();
        if let Err(e) = self.store.save(&self.snapshot) {
            error!("Failed to write final snapshot: {}", e);
        }

        info!("All processes stopped");
        Ok(self.snapshot.clone())
    }

    fn write_snapshot(&mut self) {
        self.snapshot.capture(self.manager.list());
        if let Err(e) = self.store.save(&self.snapshot) {
            warn!("Failed to write status snapshot: {}", e);
        }
    }
}

/// Run a foreground supervisor for `records` until SIGINT or SIGTERM.
///
/// Holds the PID file for the whole run and removes it on the way out.
pub async fn run(
    settings: &SupervisorSettings,
    records: Vec<ProcessSpec>,
    manifest_source: impl Into<String>,
) -> Result<()> {
    let lock = DaemonManager::with_pid_file(PidFile::with_path(&settings.pid_file));
    lock.register()?;

    let shutdown = match ShutdownSignal::install() {
        Ok(shutdown) => shutdown,
        Err(e) => {
            let _ = lock.unregister();
            return Err(e);
        }
    };

    let result = async {
        let mut runtime = Runtime::new(settings, records, manifest_source).await?;
        info!(
            "Supervisor started (PID: {}, check interval: {:?})",
            std::process::id(),
            settings.check_interval()
        );

        if let Err(e) = runtime.start_all().await {
            runtime.shutdown().await?;
            return Err(e);
        }

        runtime.run_until(shutdown.recv()).await.map(|_| ())
    }
    .await;

    if let Err(e) = lock.unregister() {
        warn!("Failed to remove PID file: {}", e);
    }

    result
}
