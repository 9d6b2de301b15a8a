// CLI module - User-facing command-line interface

mod output;

use crate::config::{plancake, preflight, Manifest, ProcessSpec, SupervisorSettings};
use crate::daemon::{self, DaemonManager, PidFile, StopOutcome};
use crate::error::{PmError, Result};
use crate::logs::{read_logs, LogReadOptions};
use crate::state::StateStore;
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Process supervisor for the plancake deployment
#[derive(Parser, Debug)]
#[command(name = "plancake-pm")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Manifest file (.toml or .json); the built-in plancake manifest when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Deployment root the built-in manifest resolves `frontend`/`backend` against
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Directory for captured process output
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Status snapshot written by the running supervisor
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,

    /// PID file of the running supervisor
    #[arg(long, global = true)]
    pid_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate the manifest
    Validate,

    /// Show the records in the manifest
    List,

    /// Check that every required environment variable is set
    Preflight {
        /// Only check these records
        #[arg(long = "only", value_name = "NAME")]
        only: Vec<String>,
    },

    /// Launch and supervise the manifest's processes
    Start {
        /// Only start these records
        #[arg(long = "only", value_name = "NAME")]
        only: Vec<String>,

        /// Detach and keep running in the background
        #[arg(short, long)]
        daemonize: bool,

        /// Refuse to start if the environment preflight fails
        #[arg(long)]
        preflight: bool,
    },

    /// Stop the running supervisor and everything it launched
    Stop {
        /// Seconds to wait before killing the supervisor
        #[arg(short, long, default_value = "30")]
        timeout: u64,
    },

    /// Show the state of the supervised processes
    Status,

    /// Show captured output of a process
    Logs {
        /// Process (or record) name
        name: String,

        /// Number of lines to display
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,

        /// Only stderr
        #[arg(long, conflicts_with = "out")]
        err: bool,

        /// Only stdout
        #[arg(long)]
        out: bool,
    },
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| PmError::SystemError(format!("Failed to start async runtime: {}", e)))?;
    Ok(runtime.block_on(future))
}

impl Cli {
    /// Manifest plus a description of where it came from, with the
    /// command-line path overrides applied
    fn load_manifest(&self) -> Result<(Manifest, String)> {
        let (mut manifest, source) = match self.config {
            Some(ref path) => {
                let path = absolute(path)?;
                (Manifest::from_file(&path)?, path.display().to_string())
            }
            None => {
                let root = match self.root {
                    Some(ref root) => absolute(root)?,
                    None => std::env::current_dir()?,
                };
                (
                    plancake::manifest(&root)?,
                    format!("built-in plancake manifest ({})", root.display()),
                )
            }
        };

        self.apply_overrides(&mut manifest.supervisor)?;
        Ok((manifest, source))
    }

    fn apply_overrides(&self, settings: &mut SupervisorSettings) -> Result<()> {
        if let Some(ref dir) = self.log_dir {
            settings.log_dir = absolute(dir)?;
        }
        if let Some(ref file) = self.state_file {
            settings.state_file = absolute(file)?;
        }
        if let Some(ref file) = self.pid_file {
            settings.pid_file = absolute(file)?;
        }
        Ok(())
    }

    /// Supervisor settings for commands that only talk to a running
    /// supervisor; falls back to the defaults when the manifest cannot load
    fn settings(&self) -> Result<SupervisorSettings> {
        match self.load_manifest() {
            Ok((manifest, _)) => Ok(manifest.supervisor),
            Err(e) => {
                tracing::debug!("Using default supervisor settings: {}", e);
                let mut settings = SupervisorSettings::default();
                self.apply_overrides(&mut settings)?;
                Ok(settings)
            }
        }
    }

    /// Where a daemonized supervisor should write its own log, if this
    /// invocation is going to daemonize
    pub fn daemon_log_path(&self) -> Option<PathBuf> {
        match self.command {
            Commands::Start {
                daemonize: true, ..
            } => self
                .settings()
                .ok()
                .map(|s| s.log_dir.join("supervisor.log")),
            _ => None,
        }
    }

    pub fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Validate => self.validate(),
            Commands::List => self.list(),
            Commands::Preflight { only } => self.preflight(only),
            Commands::Start {
                only,
                daemonize,
                preflight,
            } => self.start(only, *daemonize, *preflight),
            Commands::Stop { timeout } => self.stop(Duration::from_secs(*timeout)),
            Commands::Status => self.status(),
            Commands::Logs {
                name,
                lines,
                err,
                out,
            } => self.logs(name, *lines, *err, *out),
        }
    }

    fn validate(&self) -> Result<()> {
        let (manifest, source) = self.load_manifest()?;
        output::print_success_msg(&format!(
            "Manifest is valid: {} record(s) from {}",
            manifest.processes.len(),
            source
        ));
        output::print_info(&manifest.names().join(", "));
        Ok(())
    }

    fn list(&self) -> Result<()> {
        let (manifest, _) = self.load_manifest()?;
        output::print_records(&manifest.processes);
        Ok(())
    }

    fn run_preflight(specs: &[ProcessSpec]) -> Result<()> {
        let reports = preflight::check_all(specs);
        output::print_preflight(&reports);

        let failed: Vec<&str> = reports
            .iter()
            .filter(|r| !r.passed())
            .map(|r| r.process.as_str())
            .collect();

        if failed.is_empty() {
            output::print_success_msg("All required environment variables are set");
            Ok(())
        } else {
            Err(PmError::PreflightFailed(failed.join(", ")))
        }
    }

    fn preflight(&self, only: &[String]) -> Result<()> {
        let (manifest, _) = self.load_manifest()?;
        Self::run_preflight(&manifest.select(only)?)
    }

    fn start(&self, only: &[String], detach: bool, preflight: bool) -> Result<()> {
        let (manifest, source) = self.load_manifest()?;
        let records = manifest.select(only)?;
        let settings = manifest.supervisor;

        if preflight {
            Self::run_preflight(&records)?;
        }

        let lock = DaemonManager::with_pid_file(PidFile::with_path(&settings.pid_file));
        if let Some(pid) = lock.get_pid() {
            return Err(PmError::SupervisorAlreadyRunning(pid));
        }

        if detach {
            output::print_info(&format!(
                "Starting {} record(s) in the background; supervisor log: {}",
                records.len(),
                settings.log_dir.join("supervisor.log").display()
            ));
            daemon::daemonize()?;
        }

        block_on(daemon::run(&settings, records, source))?
    }

    fn stop(&self, timeout: Duration) -> Result<()> {
        let settings = self.settings()?;
        let lock = DaemonManager::with_pid_file(PidFile::with_path(&settings.pid_file));

        let pid = lock.get_pid().ok_or(PmError::SupervisorNotRunning)?;
        let pb = output::create_progress_bar(&format!("Stopping supervisor (PID: {})...", pid));

        match lock.stop(timeout) {
            Ok(StopOutcome::Graceful) => {
                output::finish_progress_success(pb, "Supervisor stopped");
                Ok(())
            }
            Ok(StopOutcome::Killed) => {
                output::finish_progress_success(pb, "Supervisor killed after timeout");
                Ok(())
            }
            Err(e) => {
                output::finish_progress_error(pb, "Failed to stop supervisor");
                Err(e)
            }
        }
    }

    fn status(&self) -> Result<()> {
        let settings = self.settings()?;
        let lock = DaemonManager::with_pid_file(PidFile::with_path(&settings.pid_file));
        let snapshot = StateStore::new(&settings.state_file).load()?;

        output::print_status(&lock.get_status(), snapshot.as_ref());
        Ok(())
    }

    fn logs(&self, name: &str, lines: usize, only_err: bool, only_out: bool) -> Result<()> {
        let (log_dir, instance_names) = match self.load_manifest() {
            Ok((manifest, _)) => {
                let names = manifest
                    .get(name)
                    .map(|spec| spec.instance_names())
                    .unwrap_or_else(|| vec![name.to_string()]);
                (manifest.supervisor.log_dir, names)
            }
            Err(_) => (self.settings()?.log_dir, vec![name.to_string()]),
        };

        let options = LogReadOptions {
            lines,
            include_stdout: !only_err,
            include_stderr: !only_out,
            filter: None,
        };

        for instance in instance_names {
            let entries = block_on(read_logs(&log_dir, &instance, &options))??;
            output::print_logs(&instance, &entries);
        }

        Ok(())
    }
}
