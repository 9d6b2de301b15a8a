use crate::config::ProcessSpec;
use crate::error::{PmError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Metadata returned when spawning a process
#[derive(Debug)]
pub struct SpawnedProcess {
    /// The child process handle
    pub child: Child,

    /// Process ID assigned by the OS
    pub pid: u32,

    /// Process name from the record
    pub name: String,
}

/// Locate the executable a record points at.
///
/// Absolute paths must exist, paths with a separator are taken relative to
/// the record's working directory, and bare names are searched on `PATH`.
pub fn resolve_script(spec: &ProcessSpec) -> Result<PathBuf> {
    let script = &spec.script;

    if script.is_absolute() {
        return if script.exists() {
            Ok(script.clone())
        } else {
            Err(PmError::SpawnError(format!(
                "Script does not exist: {}",
                script.display()
            )))
        };
    }

    if script.components().count() > 1 {
        let base = spec
            .cwd
            .clone()
            .map(Ok)
            .unwrap_or_else(std::env::current_dir)?;
        let candidate = base.join(script);
        return if candidate.exists() {
            Ok(candidate)
        } else {
            Err(PmError::SpawnError(format!(
                "Script does not exist: {}",
                candidate.display()
            )))
        };
    }

    find_on_path(script).ok_or_else(|| {
        PmError::SpawnError(format!(
            "Script does not exist: {} was not found on PATH",
            script.display()
        ))
    })
}

fn find_on_path(name: &Path) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Spawn a process from a manifest record
///
/// Applies the argument string, working directory and environment
/// overrides. When `capture_output` is set, stdout and stderr are piped so
/// the log manager can pick them up; otherwise they go to /dev/null.
pub async fn spawn_process(spec: &ProcessSpec, capture_output: bool) -> Result<SpawnedProcess> {
    let script = resolve_script(spec)?;

    if let Some(ref cwd) = spec.cwd {
        if !cwd.is_dir() {
            return Err(PmError::SpawnError(format!(
                "Working directory does not exist: {}",
                cwd.display()
            )));
        }
    }

    let mut command = Command::new(&script);

    let argv = spec.argv();
    if !argv.is_empty() {
        command.args(&argv);
    }

    if let Some(ref cwd) = spec.cwd {
        command.current_dir(cwd);
    }

    for (key, value) in &spec.env {
        command.env(key, value);
    }

    if capture_output {
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
    } else {
        command.stdout(Stdio::null());
        command.stderr(Stdio::null());
    }
    command.stdin(Stdio::null());

    // Own process group, so a stop reaches the whole tree (npm -> node)
    command.process_group(0);

    let child = command.spawn().map_err(|e| {
        PmError::SpawnError(format!("Failed to spawn process '{}': {}", spec.name, e))
    })?;

    let pid = child.id().ok_or_else(|| {
        PmError::SpawnError(format!("Failed to get PID for process '{}'", spec.name))
    })?;

    tracing::debug!(
        "Spawned {} (PID: {}): {}",
        spec.name,
        pid,
        spec.command_line()
    );

    Ok(SpawnedProcess {
        child,
        pid,
        name: spec.name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_spawn_simple_process() {
        let spec = ProcessSpec::new("test-echo", "/bin/echo");

        let spawned = spawn_process(&spec, true).await.unwrap();
        assert_eq!(spawned.name, "test-echo");
        assert!(spawned.pid > 0);
    }

    #[tokio::test]
    async fn test_spawn_passes_argument_string() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("out.txt");

        let mut spec = ProcessSpec::new("test-args", "/bin/sh");
        spec.args = format!("-c 'echo \"$0 $1\" > {}' hello world", out.display());

        let mut spawned = spawn_process(&spec, false).await.unwrap();
        spawned.child.wait().await.unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written.trim(), "hello world");
    }

    #[tokio::test]
    async fn test_spawn_with_working_directory() {
        let temp_dir = TempDir::new().unwrap();
        let mut spec = ProcessSpec::new("test-pwd", "/bin/sh");
        spec.args = "-c 'pwd > where.txt'".to_string();
        spec.cwd = Some(temp_dir.path().to_path_buf());

        let mut spawned = spawn_process(&spec, false).await.unwrap();
        spawned.child.wait().await.unwrap();

        assert!(temp_dir.path().join("where.txt").exists());
    }

    #[tokio::test]
    async fn test_spawn_merges_env_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let mut spec = ProcessSpec::new("test-env", "/bin/sh");
        spec.args = "-c 'echo $NODE_ENV:$PORT > env.txt'".to_string();
        spec.cwd = Some(temp_dir.path().to_path_buf());
        spec.env
            .insert("NODE_ENV".to_string(), "production".to_string());
        spec.env.insert("PORT".to_string(), "3000".to_string());

        let mut spawned = spawn_process(&spec, false).await.unwrap();
        spawned.child.wait().await.unwrap();

        let written = std::fs::read_to_string(temp_dir.path().join("env.txt")).unwrap();
        assert_eq!(written.trim(), "production:3000");
    }

    #[tokio::test]
    async fn test_spawn_relative_script_uses_cwd() {
        let temp_dir = TempDir::new().unwrap();
        let bin_dir = temp_dir.path().join("venv").join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        std::os::unix::fs::symlink("/bin/echo", bin_dir.join("celery")).unwrap();

        let mut spec = ProcessSpec::new("celery-beat", "venv/bin/celery");
        spec.cwd = Some(temp_dir.path().to_path_buf());

        assert_eq!(resolve_script(&spec).unwrap(), bin_dir.join("celery"));
        assert!(spawn_process(&spec, false).await.is_ok());
    }

    #[tokio::test]
    async fn test_spawn_bare_name_searches_path() {
        let spec = ProcessSpec::new("test-sh", "sh");
        let resolved = resolve_script(&spec).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("sh"));
    }

    #[tokio::test]
    async fn test_spawn_nonexistent_script() {
        let spec = ProcessSpec::new("test-nonexistent", "/nonexistent/script");

        match spawn_process(&spec, true).await {
            Err(PmError::SpawnError(msg)) => assert!(msg.contains("does not exist")),
            other => panic!("Expected SpawnError, got {:?}", other.map(|s| s.pid)),
        }
    }

    #[tokio::test]
    async fn test_spawn_captures_stdout_stderr() {
        let spec = ProcessSpec::new("test-output", "/bin/echo");

        let spawned = spawn_process(&spec, true).await.unwrap();
        assert!(spawned.child.stdout.is_some());
        assert!(spawned.child.stderr.is_some());

        let silent = spawn_process(&spec, false).await.unwrap();
        assert!(silent.child.stdout.is_none());
    }

    #[tokio::test]
    async fn test_spawn_leads_its_own_process_group() {
        let mut spec = ProcessSpec::new("test-group", "/bin/sleep");
        spec.args = "5".to_string();

        let mut spawned = spawn_process(&spec, false).await.unwrap();
        let pid = nix::unistd::Pid::from_raw(spawned.pid as i32);
        let pgid = nix::unistd::getpgid(Some(pid)).unwrap();
        assert_eq!(pgid.as_raw(), spawned.pid as i32);

        let _ = spawned.child.kill().await;
    }

    #[tokio::test]
    async fn test_spawn_invalid_working_directory() {
        let mut spec = ProcessSpec::new("test-invalid-cwd", "/bin/echo");
        spec.cwd = Some(PathBuf::from("/nonexistent/directory"));

        assert!(matches!(
            spawn_process(&spec, true).await,
            Err(PmError::SpawnError(_))
        ));
    }
}
