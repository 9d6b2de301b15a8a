use crate::error::{PmError, Result};
use crate::logs::writer::{log_path, LogStream};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Clone)]
pub struct LogReadOptions {
    /// Number of entries to return, counted from the end
    pub lines: usize,
    pub include_stdout: bool,
    pub include_stderr: bool,
    /// Keep only lines containing this substring
    pub filter: Option<String>,
}

impl Default for LogReadOptions {
    fn default() -> Self {
        Self {
            lines: 50,
            include_stdout: true,
            include_stderr: true,
            filter: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub stream: LogStream,
    /// Timestamp written by the capture task, when the line carries one
    pub timestamp: Option<String>,
    pub message: String,
}

impl LogEntry {
    pub fn format(&self) -> String {
        let tag = match self.stream {
            LogStream::Out => "[OUT]",
            LogStream::Err => "[ERR]",
        };

        match self.timestamp {
            Some(ref timestamp) => format!("{} {} {}", timestamp, tag, self.message),
            None => format!("{} {}", tag, self.message),
        }
    }

    fn parse(line: &str, stream: LogStream) -> Self {
        if let Some(rest) = line.strip_prefix('[') {
            if let Some(end) = rest.find(']') {
                return Self {
                    stream,
                    timestamp: Some(rest[..end].to_string()),
                    message: rest[end + 1..].trim_start().to_string(),
                };
            }
        }

        Self {
            stream,
            timestamp: None,
            message: line.to_string(),
        }
    }
}

/// Read the last `lines` entries of a single log file.
///
/// A missing file reads as empty.
pub async fn read_last_lines(
    file_path: &Path,
    lines: usize,
    stream: LogStream,
    filter: Option<&str>,
) -> Result<Vec<LogEntry>> {
    if !file_path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(file_path)
        .await
        .map_err(|e| PmError::LogFileError(format!("Failed to open log file: {}", e)))?;

    let mut reader = BufReader::new(file);
    let mut kept: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| PmError::LogError(format!("Failed to read log line: {}", e)))?;
        if read == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);

        if let Some(pattern) = filter {
            if !line.contains(pattern) {
                continue;
            }
        }

        kept.push(line.to_string());
    }

    let start = kept.len().saturating_sub(lines);

    Ok(kept[start..]
        .iter()
        .map(|line| LogEntry::parse(line, stream))
        .collect())
}

/// Last entries of a process's stdout and stderr logs, merged by timestamp
pub async fn read_logs(
    log_dir: &Path,
    process_name: &str,
    options: &LogReadOptions,
) -> Result<Vec<LogEntry>> {
    let mut entries = Vec::new();

    for (included, stream) in [
        (options.include_stdout, LogStream::Out),
        (options.include_stderr, LogStream::Err),
    ] {
        if !included {
            continue;
        }
        let path = log_path(log_dir, process_name, stream);
        entries.extend(
            read_last_lines(&path, options.lines, stream, options.filter.as_deref()).await?,
        );
    }

    // Stable sort keeps file order for equal timestamps; the format sorts lexically
    entries.sort_by(|a, b| match (&a.timestamp, &b.timestamp) {
        (Some(ts_a), Some(ts_b)) => ts_a.cmp(ts_b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let start = entries.len().saturating_sub(options.lines);
    Ok(entries.split_off(start))
}
