// Daemon module - supervisor lifecycle, PID file and run loop

pub mod daemonize;
pub mod manager;
pub mod pid;
pub mod runtime;

pub use daemonize::daemonize;
pub use manager::{DaemonManager, DaemonStatus, StopOutcome};
pub use pid::PidFile;
pub use runtime::{run, Runtime, ShutdownSignal};
