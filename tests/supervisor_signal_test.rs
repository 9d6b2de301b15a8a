// Runs the full supervisor and stops it with a real SIGTERM while a restart
// backoff is pending, so it lives in its own test binary.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use plancake_pm::config::{MemorySize, ProcessSpec, SupervisorSettings};
use plancake_pm::daemon;
use plancake_pm::process::ProcessState;
use plancake_pm::state::StateStore;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_sigterm_stops_supervisor_and_children() {
    let temp_dir = TempDir::new().unwrap();
    let settings = SupervisorSettings {
        check_interval_ms: 100,
        log_dir: temp_dir.path().join("logs"),
        state_file: temp_dir.path().join("state.json"),
        pid_file: temp_dir.path().join("supervisor.pid"),
        max_log_size: MemorySize::from_megabytes(1),
    };

    let mut records: Vec<ProcessSpec> = ["plancake-api", "celery-worker"]
        .iter()
        .map(|name| {
            let mut spec = ProcessSpec::new(*name, "/bin/sleep");
            spec.args = "30".to_string();
            spec.stop_timeout_secs = 2;
            spec
        })
        .collect();

    // Exits at once and then sits out a long backoff
    let mut beat = ProcessSpec::new("celery-beat", "/bin/sh");
    beat.args = "-c 'exit 1'".to_string();
    beat.restart_delay_secs = 30;
    records.push(beat);

    let run_settings = settings.clone();
    let handle =
        tokio::spawn(async move { daemon::run(&run_settings, records, "signal test").await });

    // Wait until the crashed record is parked in its backoff
    let store = StateStore::new(&settings.state_file);
    let beat_waiting = |store: &StateStore| {
        store
            .load()
            .ok()
            .flatten()
            .and_then(|s| s.get("celery-beat").map(|p| p.state == ProcessState::Waiting))
            .unwrap_or(false)
    };
    let mut waited = Duration::ZERO;
    while !beat_waiting(&store) {
        assert!(waited < Duration::from_secs(5), "celery-beat never went to waiting");
        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += Duration::from_millis(50);
    }
    assert!(settings.pid_file.exists());

    let running = store.load().unwrap().unwrap();
    assert_eq!(running.processes.len(), 3);
    let child_pids: Vec<u32> = running.processes.iter().map(|p| p.pid).collect();

    let signalled = std::time::Instant::now();
    kill(Pid::this(), Signal::SIGTERM).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
    assert!(signalled.elapsed() < Duration::from_secs(5));

    assert!(!settings.pid_file.exists());

    let last = store.load().unwrap().unwrap();
    assert!(last.is_final());
    assert!(last
        .processes
        .iter()
        .all(|p| p.state == ProcessState::Stopped));

    for pid in child_pids {
        assert!(!plancake_pm::daemon::pid::is_process_alive(pid));
    }
}
