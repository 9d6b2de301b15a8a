use crate::error::{PmError, Result};
use crate::logs::writer::{log_path, LogStream, LogWriter};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;

/// Routes the output of supervised processes into per-stream log files
#[derive(Debug, Clone)]
pub struct LogManager {
    log_dir: PathBuf,
    max_size: u64,
}

impl LogManager {
    /// Create the log directory if needed
    pub async fn new<P: AsRef<Path>>(log_dir: P, max_size: u64) -> Result<Self> {
        let log_dir = log_dir.as_ref().to_path_buf();

        tokio::fs::create_dir_all(&log_dir)
            .await
            .map_err(|e| PmError::LogError(format!("Failed to create log directory: {}", e)))?;

        Ok(Self { log_dir, max_size })
    }

    /// Take the child's stdout and stderr pipes and copy them into
    /// `<name>-out.log` / `<name>-err.log` from background tasks.
    ///
    /// The tasks end when the child closes its pipes.
    pub fn capture(&self, process_name: &str, child: &mut Child) -> Result<()> {
        let stdout = child.stdout.take().ok_or_else(|| {
            PmError::LogError(format!("No stdout pipe available for {}", process_name))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            PmError::LogError(format!("No stderr pipe available for {}", process_name))
        })?;

        tokio::spawn(pump(
            stdout,
            self.log_dir.clone(),
            process_name.to_string(),
            LogStream::Out,
            self.max_size,
        ));
        tokio::spawn(pump(
            stderr,
            self.log_dir.clone(),
            process_name.to_string(),
            LogStream::Err,
            self.max_size,
        ));

        Ok(())
    }

    pub fn path(&self, process_name: &str, stream: LogStream) -> PathBuf {
        log_path(&self.log_dir, process_name, stream)
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }
}

async fn pump<R>(
    reader: R,
    log_dir: PathBuf,
    process_name: String,
    stream: LogStream,
    max_size: u64,
) where
    R: AsyncRead + Unpin,
{
    let mut writer = match LogWriter::open(&log_dir, &process_name, stream, max_size).await {
        Ok(w) => w,
        Err(e) => {
            tracing::error!("Cannot log {} of {}: {}", stream.suffix(), process_name, e);
            return;
        }
    };

    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if let Err(e) = writer.write_line(&line).await {
                    tracing::warn!("Failed to write log line for {}: {}", process_name, e);
                }
            }
            Err(e) => {
                tracing::debug!("Output pipe of {} closed: {}", process_name, e);
                break;
            }
        }
    }

    let _ = writer.flush().await;
}
