use crate::error::{PmError, Result};
use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tokio::fs::File as TokioFile;
use tokio::io::AsyncWriteExt;

/// Which output stream of a process a log file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Out,
    Err,
}

impl LogStream {
    pub fn suffix(&self) -> &'static str {
        match self {
            LogStream::Out => "out",
            LogStream::Err => "err",
        }
    }
}

/// Path of the live log file for one stream of a process
pub fn log_path(log_dir: &Path, process_name: &str, stream: LogStream) -> PathBuf {
    log_dir.join(format!("{}-{}.log", process_name, stream.suffix()))
}

/// Appends timestamped lines to one stream's log file, rotating it once it
/// grows past `max_size`
pub struct LogWriter {
    path: PathBuf,
    file: TokioFile,
    max_size: u64,
    size: u64,
}

impl LogWriter {
    /// Open (or create) the log file for `stream` of `process_name`
    pub async fn open(
        log_dir: &Path,
        process_name: &str,
        stream: LogStream,
        max_size: u64,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(log_dir)
            .await
            .map_err(|e| PmError::LogError(format!("Failed to create log directory: {}", e)))?;

        let path = log_path(log_dir, process_name, stream);
        let file = Self::open_append(&path)?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            path,
            file: TokioFile::from_std(file),
            max_size,
            size,
        })
    }

    fn open_append(path: &Path) -> Result<std::fs::File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                PmError::LogFileError(format!(
                    "Failed to open log file {}: {}",
                    path.display(),
                    e
                ))
            })
    }

    /// Write one line of process output, prefixed with the current time
    pub async fn write_line(&mut self, data: &[u8]) -> Result<()> {
        if self.max_size > 0 && self.size >= self.max_size {
            self.rotate().await?;
        }

        let entry = format_log_entry(&Local::now(), data);

        self.file
            .write_all(&entry)
            .await
            .map_err(|e| PmError::LogError(format!("Failed to write to log: {}", e)))?;
        self.file
            .flush()
            .await
            .map_err(|e| PmError::LogError(format!("Failed to flush log: {}", e)))?;

        self.size += entry.len() as u64;

        Ok(())
    }

    /// Move the live file aside as `<stem>-<timestamp>.log` and start a new one
    async fn rotate(&mut self) -> Result<()> {
        self.file
            .flush()
            .await
            .map_err(|e| PmError::LogRotationError(format!("Failed to flush log: {}", e)))?;

        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| PmError::LogRotationError("Invalid log file name".to_string()))?;
        let timestamp = Local::now().format("%Y%m%d-%H%M%S-%3f");
        let rotated = self.path.with_file_name(format!("{}-{}.log", stem, timestamp));

        tokio::fs::rename(&self.path, &rotated)
            .await
            .map_err(|e| PmError::LogRotationError(format!("Failed to rotate log: {}", e)))?;

        tracing::debug!("Rotated {} to {}", self.path.display(), rotated.display());

        self.file = TokioFile::from_std(Self::open_append(&self.path)?);
        self.size = 0;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.file
            .flush()
            .await
            .map_err(|e| PmError::LogError(format!("Failed to flush log: {}", e)))
    }
}

/// `[YYYY-MM-DD HH:MM:SS.mmm] <data>`, newline terminated
fn format_log_entry(timestamp: &DateTime<Local>, data: &[u8]) -> Vec<u8> {
    let timestamp_str = timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string();
    let mut entry = Vec::with_capacity(timestamp_str.len() + 4 + data.len());

    entry.push(b'[');
    entry.extend_from_slice(timestamp_str.as_bytes());
    entry.extend_from_slice(b"] ");
    entry.extend_from_slice(data);

    if !data.ends_with(b"\n") {
        entry.push(b'\n');
    }

    entry
}
