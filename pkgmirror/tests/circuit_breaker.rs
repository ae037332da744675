//! Circuit breaker behaviour observed through the fetch engine.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{archive_url, connection_reset, descriptor, FakeRegistry, REGISTRY};
use pkgmirror::failures::{failure_manifest_path, FailureManifestEntry};
use pkgmirror::fetch::{FetchEngine, FetchError, RetryPolicy};
use pkgmirror::mirror::{MirrorConfig, MirrorSession};
use pkgmirror::network::{
    CircuitBreakerConfig, CircuitState, MonitorConfig, NetworkHealthMonitor,
};
use pkgmirror::registry::Registry;
use tempfile::TempDir;

fn monitor(min_samples: u64, cooldown: Duration) -> Arc<NetworkHealthMonitor> {
    Arc::new(NetworkHealthMonitor::new(MonitorConfig {
        breaker: CircuitBreakerConfig {
            error_threshold: 0.5,
            min_samples,
            cooldown,
        },
        ..MonitorConfig::default()
    }))
}

#[tokio::test]
async fn test_open_circuit_stops_network_requests() {
    let temp = TempDir::new().unwrap();
    let fake = FakeRegistry::new();
    let tasks: Vec<_> = (0..12)
        .map(|i| {
            let name = format!("down{}", i);
            let url = archive_url(&name, "1.0.0");
            fake.fail(&url, connection_reset(&url));
            descriptor(&name, "1.0.0")
        })
        .collect();

    let monitor = monitor(4, Duration::from_secs(600));
    let registry = Arc::new(Registry::new(fake.clone(), REGISTRY, Arc::clone(&monitor)));
    let engine = FetchEngine::new(registry, temp.path()).with_retry_policy(RetryPolicy::immediate(1));

    let report = engine.download_all(tasks, 1, false).await.unwrap();

    assert_eq!(report.failed.len(), 12);
    assert_eq!(monitor.circuit_state(), CircuitState::Open);
    // The breaker trips once more than four samples are observed; everything
    // after that fails fast without reaching the transport.
    assert_eq!(fake.total_calls(), 5);
    assert!(report
        .failed
        .iter()
        .any(|f| matches!(f.error, FetchError::CircuitOpen)));
}

#[tokio::test]
async fn test_successful_probe_closes_circuit() {
    let temp = TempDir::new().unwrap();
    let fake = FakeRegistry::new();
    let monitor = monitor(2, Duration::from_millis(20));
    for _ in 0..3 {
        monitor.record_sample(10, true);
    }
    assert_eq!(monitor.circuit_state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(40)).await;
    fake.publish("a", "1.0.0");
    let registry = Arc::new(Registry::new(fake.clone(), REGISTRY, Arc::clone(&monitor)));
    let engine = FetchEngine::new(registry, temp.path()).with_retry_policy(RetryPolicy::immediate(1));

    let report = engine
        .download_all(vec![descriptor("a", "1.0.0")], 1, false)
        .await
        .unwrap();

    assert_eq!(report.downloaded, 1);
    assert_eq!(monitor.circuit_state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_circuit_wait_outlasts_cooldown() {
    let temp = TempDir::new().unwrap();
    let fake = FakeRegistry::new();
    let monitor = monitor(2, Duration::from_millis(30));
    for _ in 0..3 {
        monitor.record_sample(10, true);
    }
    assert_eq!(monitor.circuit_state(), CircuitState::Open);

    let tasks: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|name| {
            fake.publish(name, "1.0.0");
            descriptor(name, "1.0.0")
        })
        .collect();
    let registry = Arc::new(Registry::new(fake.clone(), REGISTRY, Arc::clone(&monitor)));
    let engine = FetchEngine::new(registry, temp.path())
        .with_retry_policy(RetryPolicy::immediate(3))
        .with_circuit_wait(true);

    let report = engine.download_all(tasks, 2, false).await.unwrap();

    assert_eq!(report.downloaded, 3);
    assert!(report.failed.is_empty());
    assert_eq!(monitor.circuit_state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_retry_rounds_wait_for_open_circuit() {
    let temp = TempDir::new().unwrap();
    let fake = FakeRegistry::new();

    let mut lock = Vec::new();
    for i in 0..21 {
        let name = format!("down{}", i);
        let url = archive_url(&name, "1.0.0");
        fake.fail(&url, connection_reset(&url));
        lock.push(descriptor(&name, "1.0.0"));
    }
    for i in 0..5 {
        let name = format!("up{}", i);
        fake.publish(&name, "1.0.0");
        lock.push(descriptor(&name, "1.0.0"));
    }

    let config = MirrorConfig::new(temp.path())
        .with_registry_url(REGISTRY)
        .with_concurrency(1)
        .with_retry_concurrency(1)
        .with_all_majors(false)
        .with_retry_policy(RetryPolicy::immediate(1))
        .with_cooldown(Duration::from_millis(20));
    let session = MirrorSession::with_client(fake.clone(), config);

    let summary = session.mirror_lock(lock).await.unwrap();

    // The 21st failure opens the circuit, so the main pass refuses every
    // healthy package; the retry rounds must still reach them.
    assert_eq!(summary.rounds, 2);
    assert_eq!(summary.failed, 21);
    for i in 0..5 {
        let name = format!("up{}", i);
        assert_eq!(fake.calls(&archive_url(&name, "1.0.0")), 1, "{}", name);
        let dest = temp.path().join("node_modules").join(&name);
        assert!(dest.join(format!("{}-1.0.0.tgz", name)).exists());
    }

    let entries: Vec<FailureManifestEntry> = serde_json::from_str(
        &std::fs::read_to_string(failure_manifest_path(temp.path())).unwrap(),
    )
    .unwrap();
    assert_eq!(entries.len(), 21);
    assert!(entries.iter().all(|e| e.name.starts_with("down")));
}
