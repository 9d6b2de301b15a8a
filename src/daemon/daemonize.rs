// Detach the supervisor from the terminal

use crate::error::{PmError, Result};

/// Double-fork into the background, start a new session and point the
/// standard streams at /dev/null.
///
/// Must run before the tokio runtime is built. The working directory becomes
/// `/`, so every path the caller still needs has to be absolute already.
pub fn daemonize() -> Result<()> {
    use nix::unistd::{dup2, fork, setsid, ForkResult};
    use std::fs::OpenOptions;
    use std::os::unix::io::AsRawFd;

    // SAFETY: called while the process is still single-threaded
    match unsafe { fork() } {
        Ok(ForkResult::Parent { .. }) => std::process::exit(0),
        Ok(ForkResult::Child) => {}
        Err(e) => return Err(PmError::SystemError(format!("First fork failed: {}", e))),
    }

    setsid().map_err(|e| PmError::SystemError(format!("setsid failed: {}", e)))?;

    // Second fork so the daemon can never reacquire a controlling terminal
    // SAFETY: as above
    match unsafe { fork() } {
        Ok(ForkResult::Parent { .. }) => std::process::exit(0),
        Ok(ForkResult::Child) => {}
        Err(e) => return Err(PmError::SystemError(format!("Second fork failed: {}", e))),
    }

    std::env::set_current_dir("/")
        .map_err(|e| PmError::SystemError(format!("Failed to change directory to /: {}", e)))?;

    let devnull = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .map_err(|e| PmError::SystemError(format!("Failed to open /dev/null: {}", e)))?;
    let fd = devnull.as_raw_fd();

    for target in [0, 1, 2] {
        dup2(fd, target).map_err(|e| {
            PmError::SystemError(format!("Failed to redirect fd {}: {}", target, e))
        })?;
    }

    Ok(())
}
