// Output capture, rotation and reading

mod manager;
mod reader;
mod writer;

pub use manager::LogManager;
pub use reader::{read_last_lines, read_logs, LogEntry, LogReadOptions};
pub use writer::{log_path, LogStream, LogWriter};
