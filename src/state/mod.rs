// State module - status snapshot published by the running supervisor

use crate::config::MemorySize;
use crate::error::{PmError, Result};
use crate::process::{ManagedProcess, ProcessId, ProcessState};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Version of the snapshot file format
const STATE_VERSION: &str = "1.0.0";

/// One supervised process as seen at snapshot time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub id: ProcessId,
    pub name: String,
    /// Manifest record the process was launched from
    pub group: String,
    pub pid: u32,
    pub state: ProcessState,
    pub restarts: usize,
    pub uptime_secs: u64,
    pub cpu_usage: f32,
    pub memory_bytes: u64,
    pub memory_limit: Option<MemorySize>,
    pub memory_violations: usize,
    pub last_exit_code: Option<i32>,
    pub command: String,
    pub cwd: Option<PathBuf>,
}

impl ProcessSnapshot {
    pub fn from_managed(process: &ManagedProcess) -> Self {
        let running = process.state == ProcessState::Running;

        Self {
            id: process.id,
            name: process.name.clone(),
            group: process.group.clone(),
            pid: process.stats.pid,
            state: process.state,
            restarts: process.stats.restarts,
            uptime_secs: if running {
                process.stats.uptime().as_secs()
            } else {
                0
            },
            cpu_usage: process.stats.cpu_usage,
            memory_bytes: process.stats.memory_usage,
            memory_limit: process.spec.max_memory_restart,
            memory_violations: process.stats.memory_violations,
            last_exit_code: process.stats.last_exit_code,
            command: process.spec.command_line(),
            cwd: process.spec.cwd.clone(),
        }
    }

    pub fn uptime(&self) -> Duration {
        Duration::from_secs(self.uptime_secs)
    }
}

/// Everything `status` needs to report without talking to the supervisor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub version: String,
    pub supervisor_pid: u32,
    /// Where the manifest came from (file path or the built-in manifest)
    pub manifest: String,
    pub started_at: SystemTime,
    pub updated_at: SystemTime,
    /// Set on the final snapshot written during shutdown
    pub stopped_at: Option<SystemTime>,
    pub processes: Vec<ProcessSnapshot>,
}

impl StatusSnapshot {
    pub fn new(manifest: impl Into<String>) -> Self {
        let now = SystemTime::now();
        Self {
            version: STATE_VERSION.to_string(),
            supervisor_pid: std::process::id(),
            manifest: manifest.into(),
            started_at: now,
            updated_at: now,
            stopped_at: None,
            processes: Vec::new(),
        }
    }

    /// Replace the process entries with the current view of `processes`
    pub fn capture<'a, I>(&mut self, processes: I)
    where
        I: IntoIterator<Item = &'a ManagedProcess>,
    {
        self.processes = processes
            .into_iter()
            .map(ProcessSnapshot::from_managed)
            .collect();
        self.updated_at = SystemTime::now();
    }

    pub fn mark_stopped(&mut self) {
        let now = SystemTime::now();
        self.updated_at = now;
        self.stopped_at = Some(now);
    }

    pub fn is_final(&self) -> bool {
        self.stopped_at.is_some()
    }

    pub fn get(&self, name: &str) -> Option<&ProcessSnapshot> {
        self.processes.iter().find(|p| p.name == name)
    }

    /// Time since the snapshot was last written
    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.updated_at)
            .unwrap_or(Duration::from_secs(0))
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != STATE_VERSION {
            return Err(PmError::StateCorruption(format!(
                "Incompatible state version: expected {}, found {}",
                STATE_VERSION, self.version
            )));
        }

        let mut seen_ids = HashSet::new();
        let mut seen_names = HashSet::new();
        for process in &self.processes {
            if !seen_ids.insert(process.id) {
                return Err(PmError::StateCorruption(format!(
                    "Duplicate process ID found: {}",
                    process.id
                )));
            }
            if !seen_names.insert(process.name.as_str()) {
                return Err(PmError::StateCorruption(format!(
                    "Duplicate process name found: {}",
                    process.name
                )));
            }
        }

        Ok(())
    }
}

/// Reads and writes the snapshot file
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load the last snapshot; `None` when no supervisor has written one
    pub fn load(&self) -> Result<Option<StatusSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let file = File::open(&self.path)
            .map_err(|e| PmError::StateLoadError(format!("Failed to open state file: {}", e)))?;

        let snapshot: StatusSnapshot = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| PmError::StateLoadError(format!("Failed to parse state file: {}", e)))?;

        snapshot.validate()?;

        Ok(Some(snapshot))
    }

    /// Write the snapshot through a temporary file and rename it into place
    pub fn save(&self, snapshot: &StatusSnapshot) -> Result<()> {
        snapshot.validate()?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                PmError::StateSaveError(format!("Failed to create state directory: {}", e))
            })?;
        }

        let temp_path = self.path.with_extension("tmp");

        {
            let file = File::create(&temp_path).map_err(|e| {
                PmError::StateSaveError(format!("Failed to create temp state file: {}", e))
            })?;

            let mut writer = BufWriter::new(file);

            serde_json::to_writer_pretty(&mut writer, snapshot).map_err(|e| {
                PmError::StateSaveError(format!("Failed to serialize state: {}", e))
            })?;

            writer.flush().map_err(|e| {
                PmError::StateSaveError(format!("Failed to flush state file: {}", e))
            })?;
        }

        fs::rename(&temp_path, &self.path).map_err(|e| {
            PmError::StateSaveError(format!("Failed to rename temp state file: {}", e))
        })?;

        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| PmError::StateError(format!("Failed to clear state file: {}", e)))?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(id: u64, name: &str) -> ProcessSnapshot {
        ProcessSnapshot {
            id: ProcessId::new(id),
            name: name.to_string(),
            group: name.to_string(),
            pid: 4242,
            state: ProcessState::Running,
            restarts: 1,
            uptime_secs: 90,
            cpu_usage: 2.5,
            memory_bytes: 64 * 1024 * 1024,
            memory_limit: Some(MemorySize::from_megabytes(150)),
            memory_violations: 0,
            last_exit_code: None,
            command: "venv/bin/gunicorn api.wsgi:application".to_string(),
            cwd: Some(PathBuf::from("/srv/plancake/backend")),
        }
    }

    #[test]
    fn test_new_snapshot() {
        let snapshot = StatusSnapshot::new("built-in");
        assert_eq!(snapshot.version, STATE_VERSION);
        assert_eq!(snapshot.supervisor_pid, std::process::id());
        assert!(snapshot.processes.is_empty());
        assert!(!snapshot.is_final());
    }

    #[test]
    fn test_validate_duplicates() {
        let mut snapshot = StatusSnapshot::new("built-in");
        snapshot.processes.push(entry(1, "plancake-api"));
        snapshot.processes.push(entry(2, "celery-beat"));
        assert!(snapshot.validate().is_ok());

        snapshot.processes.push(entry(2, "celery-worker"));
        assert!(matches!(
            snapshot.validate(),
            Err(PmError::StateCorruption(_))
        ));

        snapshot.processes.pop();
        snapshot.processes.push(entry(3, "plancake-api"));
        assert!(matches!(
            snapshot.validate(),
            Err(PmError::StateCorruption(_))
        ));
    }

    #[test]
    fn test_validate_version() {
        let mut snapshot = StatusSnapshot::new("built-in");
        snapshot.version = "0.1.0".to_string();
        assert!(matches!(
            snapshot.validate(),
            Err(PmError::StateCorruption(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::new(temp_dir.path().join("run").join("state.json"));

        let mut snapshot = StatusSnapshot::new("/srv/plancake/pm.toml");
        snapshot.processes.push(entry(1, "plancake-api"));
        store.save(&snapshot).unwrap();

        assert!(store.path().exists());
        assert!(!store.path().with_extension("tmp").exists());

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.manifest, "/srv/plancake/pm.toml");
        assert_eq!(loaded.processes, snapshot.processes);
        assert_eq!(loaded.get("plancake-api").unwrap().uptime(), Duration::from_secs(90));
        assert_eq!(
            loaded.get("plancake-api").unwrap().memory_limit,
            Some(MemorySize::from_megabytes(150))
        );
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::new(temp_dir.path().join("state.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_load_corrupted_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();

        let store = StateStore::new(&path);
        assert!(matches!(store.load(), Err(PmError::StateLoadError(_))));
    }

    #[test]
    fn test_final_snapshot_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::new(temp_dir.path().join("state.json"));

        let mut snapshot = StatusSnapshot::new("built-in");
        snapshot.mark_stopped();
        store.save(&snapshot).unwrap();
        assert!(store.load().unwrap().unwrap().is_final());

        store.clear().unwrap();
        assert!(!store.path().exists());
        store.clear().unwrap();
    }
}
