// PID file of the running supervisor

use crate::error::{PmError, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Write the current process PID, creating the parent directory if needed
    pub fn write(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                PmError::StateError(format!("Failed to create PID file directory: {}", e))
            })?;
        }

        fs::write(&self.path, std::process::id().to_string())
            .map_err(|e| PmError::StateError(format!("Failed to write PID file: {}", e)))
    }

    pub fn read(&self) -> Result<u32> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| PmError::StateError(format!("Failed to read PID file: {}", e)))?;

        content
            .trim()
            .parse::<u32>()
            .map_err(|e| PmError::StateError(format!("Invalid PID in file: {}", e)))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn remove(&self) -> Result<()> {
        if self.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| PmError::StateError(format!("Failed to remove PID file: {}", e)))?;
        }
        Ok(())
    }

    /// PID recorded in the file, if that process is still alive
    pub fn running_pid(&self) -> Option<u32> {
        if !self.exists() {
            return None;
        }

        self.read().ok().filter(|pid| is_process_alive(*pid))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Probe a PID with signal 0
pub fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }

    match kill(Pid::from_raw(raw), None) {
        Ok(_) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}
