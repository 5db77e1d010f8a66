#![cfg(unix)]

mod common;

use common::{scenario, wait_for};
use std::time::{Duration, Instant};
use unvdash::tunnel::{LaunchConfig, StatusStore, Supervisor};

const JOIN: Duration = Duration::from_secs(10);

async fn run_to_completion(config: LaunchConfig) -> StatusStore {
    let store = StatusStore::new();
    let supervisor = Supervisor::start(config, store.clone()).unwrap();
    assert!(supervisor.join(JOIN).await, "worker did not finish");
    store
}

#[tokio::test]
async fn reports_public_url_and_first_error() {
    let store = run_to_completion(scenario("ready")).await;
    let snapshot = store.snapshot();

    assert!(snapshot.status.online);
    assert_eq!(
        snapshot.status.public_url.as_deref(),
        Some("udp://1.2.3.4:9999")
    );
    assert_eq!(snapshot.status.error, "Error: auth failed");
    assert!(snapshot.status.process_exited);
    assert!(snapshot.status.pid.is_some());
    assert_eq!(
        snapshot.log_tail,
        vec![
            "connecting...",
            "tunnel ready udp://1.2.3.4:9999",
            "Error: auth failed",
            "Error: second",
            "heartbeat",
        ]
    );
}

#[tokio::test]
async fn forwards_token_and_optional_flags() {
    let config = LaunchConfig {
        region: Some("eu".to_string()),
        port: Some(String::new()),
        ..scenario("env")
    };
    let tail = run_to_completion(config).await.snapshot().log_tail;

    assert_eq!(
        tail,
        vec![
            "token:secret:secret",
            "args:tunnel --raw-mode udp --to env --region eu",
        ]
    );
}

#[tokio::test]
async fn non_zero_exit_becomes_error() {
    let status = run_to_completion(scenario("exit-code")).await.status();

    assert!(status.process_exited);
    assert!(!status.online);
    assert_eq!(status.error, "localxpose exited with code 7");
}

#[tokio::test]
async fn invalid_utf8_output_does_not_stop_parsing() {
    let snapshot = run_to_completion(scenario("binary")).await.snapshot();

    assert_eq!(snapshot.log_tail, vec!["bad \u{fffd} bytes", "udp://bin:1"]);
    assert_eq!(snapshot.status.public_url.as_deref(), Some("udp://bin:1"));
    assert!(snapshot.status.error.is_empty());
}

#[tokio::test]
async fn missing_binary_is_reported_as_exited() {
    let config = LaunchConfig {
        binary: "/nonexistent/loclx".to_string(),
        ..scenario("ready")
    };
    let status = run_to_completion(config).await.status();

    assert!(status.error.starts_with("Failed to start localxpose"));
    assert!(status.process_exited);
    assert!(status.pid.is_none());
}

#[tokio::test]
async fn missing_token_starts_nothing() {
    let store = StatusStore::new();
    let supervisor = Supervisor::start(common::without_token(), store.clone()).unwrap();
    wait_for(&store, |s| !s.error.is_empty()).await;

    // Nothing to stop; returns without waiting.
    let started = Instant::now();
    supervisor.terminate(Duration::from_secs(5)).await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(supervisor.join(JOIN).await);

    let status = store.status();
    assert_eq!(status.error, "LOCALXPOSE_ACCESS_TOKEN is not set");
    assert!(!status.online);
    assert!(!status.process_exited);
    assert!(status.pid.is_none());
}

#[tokio::test]
async fn cooperative_process_stops_on_sigterm() {
    let store = StatusStore::new();
    let supervisor = Supervisor::start(scenario("serve"), store.clone()).unwrap();
    wait_for(&store, |s| s.online).await;

    let started = Instant::now();
    supervisor.terminate(Duration::from_secs(5)).await;
    assert!(started.elapsed() < Duration::from_secs(4));

    assert!(supervisor.join(JOIN).await);
    let status = store.status();
    assert!(status.process_exited);
    // Killed by a signal, so there is no exit code to report.
    assert!(status.error.is_empty());
}

#[tokio::test]
async fn stubborn_process_is_killed_after_grace_period() {
    let store = StatusStore::new();
    let supervisor = Supervisor::start(scenario("stubborn"), store.clone()).unwrap();
    wait_for(&store, |s| s.online).await;

    let grace = Duration::from_millis(500);
    let started = Instant::now();
    supervisor.terminate(grace).await;
    let elapsed = started.elapsed();
    assert!(elapsed >= grace, "returned before the grace period: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "kill took {elapsed:?}");

    assert!(supervisor.join(JOIN).await);
    assert!(store.status().process_exited);
}

fn is_alive(pid: u32) -> bool {
    let pid = libc::pid_t::try_from(pid).unwrap();
    unsafe { libc::kill(pid, 0) == 0 }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_right_after_start_leaves_no_process() {
    for _ in 0..10 {
        let store = StatusStore::new();
        let supervisor = Supervisor::start(scenario("serve"), store.clone()).unwrap();

        supervisor.terminate(Duration::from_secs(5)).await;
        assert!(supervisor.join(JOIN).await, "worker did not finish");

        let status = store.status();
        assert!(status.process_exited);
        if let Some(pid) = status.pid {
            assert!(!is_alive(pid), "tunnel process {pid} outlived shutdown");
        }
    }
}
