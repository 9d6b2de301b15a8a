use plancake_pm::config::ProcessSpec;
use plancake_pm::process::{ProcessManager, ProcessState};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn sleeper(name: &str) -> ProcessSpec {
    let mut spec = ProcessSpec::new(name, "/bin/sleep");
    spec.args = "30".to_string();
    spec.stop_timeout_secs = 5;
    spec
}

#[tokio::test]
async fn test_graceful_shutdown_with_sigterm() {
    let mut manager = ProcessManager::new();
    let id = manager.spawn(sleeper("plancake-api")).await.unwrap();

    let started = Instant::now();
    manager.stop(id, false).await.unwrap();

    // sleep dies on SIGTERM straight away, well inside the timeout
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(
        manager.get_status(id).unwrap().state,
        ProcessState::Stopped
    );
}

#[tokio::test]
async fn test_process_handles_its_stop_signal() {
    let temp_dir = TempDir::new().unwrap();
    let marker = temp_dir.path().join("stopped");

    let mut spec = ProcessSpec::new("celery-worker", "/bin/sh");
    spec.args = format!(
        "-c 'trap \"touch {}; exit 0\" INT; while true; do sleep 0.1; done'",
        marker.display()
    );
    spec.stop_signal = "SIGINT".to_string();
    spec.stop_timeout_secs = 5;

    let mut manager = ProcessManager::new();
    let id = manager.spawn(spec).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    manager.stop(id, false).await.unwrap();

    assert!(marker.exists());
    let process = manager.get_status(id).unwrap();
    assert_eq!(process.state, ProcessState::Stopped);
    assert_eq!(process.stats.last_exit_code, Some(0));
}

#[tokio::test]
async fn test_unresponsive_process_is_killed_after_timeout() {
    let mut spec = ProcessSpec::new("celery-beat", "/bin/sh");
    spec.args = "-c 'trap \"\" TERM; while true; do sleep 0.1; done'".to_string();
    spec.stop_timeout_secs = 1;

    let mut manager = ProcessManager::new();
    let id = manager.spawn(spec).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    manager.stop(id, false).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(4));

    let process = manager.get_status(id).unwrap();
    assert_eq!(process.state, ProcessState::Stopped);
    // Killed by a signal, so there is no exit code
    assert_eq!(process.stats.last_exit_code, None);
}

#[tokio::test]
async fn test_stop_all_stops_every_record() {
    let mut manager = ProcessManager::new();
    for name in ["plancake-site", "plancake-api", "celery-worker", "celery-beat"] {
        manager.spawn(sleeper(name)).await.unwrap();
    }

    manager.stop_all().await.unwrap();

    let processes = manager.list();
    assert_eq!(processes.len(), 4);
    assert!(processes.iter().all(|p| p.state == ProcessState::Stopped));
}
