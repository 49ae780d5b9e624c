//! Manual restart is the only path out of Failed, and the health monitor
//! replaces a running-but-unhealthy service through the same bounded
//! restart decision as a crash.

mod common;

use common::{config_from_yaml, HealthEndpoint};
use std::time::Duration;
use warden::{ServiceStatus, Supervisor};

#[tokio::test]
async fn manual_restart_clears_failed_and_resets_budget() {
    let endpoint = HealthEndpoint::spawn(true).await;
    let dir = tempfile::tempdir().unwrap();
    let ready_marker = dir.path().join("deps-ready");

    // Fails until the marker file exists, then stays up.
    let config = config_from_yaml(&format!(
        r#"
services:
  - name: flaky
    command: "test -f {marker} || exit 1; sleep 30"
    port: {port}
    healthcheck: "{url}"
    max_restarts: 0
    restart_backoff: "100ms"
    readiness_attempts: 3
    readiness_interval: "100ms"
    grace_period: "500ms"
"#,
        marker = ready_marker.display(),
        port = endpoint.port(),
        url = endpoint.url(),
    ));

    let supervisor = Supervisor::new(config, dir.path().to_path_buf()).unwrap();
    supervisor.start_all().await.unwrap();
    assert_eq!(supervisor.status().await[0].status, ServiceStatus::Failed);

    // Automatic restarts are over; even a fixed service stays Failed
    std::fs::write(&ready_marker, b"").unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(supervisor.status().await[0].status, ServiceStatus::Failed);

    // Manual intervention recovers it
    supervisor.restart_service("flaky").await.unwrap();
    let report = &supervisor.status().await[0];
    assert_eq!(report.status, ServiceStatus::Running);
    assert_eq!(report.restart_count, 0);
    assert!(report.uptime_secs.is_some());

    supervisor.shutdown().await;
}

#[tokio::test]
async fn restart_of_unknown_service_is_an_error() {
    let endpoint = HealthEndpoint::spawn(true).await;
    let config = config_from_yaml(&format!(
        r#"
services:
  - name: backend
    command: "sleep 30"
    port: {port}
    healthcheck: "{url}"
"#,
        port = endpoint.port(),
        url = endpoint.url(),
    ));

    let supervisor = Supervisor::new(config, std::path::PathBuf::from(".")).unwrap();
    let err = supervisor.restart_service("ghost").await.unwrap_err();
    assert!(matches!(err, warden::Error::ServiceNotFound(_)));
    supervisor.shutdown().await;
}

#[tokio::test]
async fn unhealthy_running_service_is_routed_through_restart_policy() {
    let endpoint = HealthEndpoint::spawn(true).await;

    let config = config_from_yaml(&format!(
        r#"
health_interval: "300ms"
liveness_interval: "10s"
services:
  - name: hung
    command: "sleep 30"
    port: {port}
    healthcheck: "{url}"
    max_restarts: 1
    restart_backoff: "100ms"
    readiness_attempts: 2
    readiness_interval: "100ms"
    grace_period: "300ms"
"#,
        port = endpoint.port(),
        url = endpoint.url(),
    ));

    let supervisor = Supervisor::new(config, std::path::PathBuf::from(".")).unwrap();
    let mut alerts = supervisor.subscribe_alerts();

    supervisor.start_all().await.unwrap();
    supervisor.start_monitoring().await;
    assert_eq!(supervisor.status().await[0].status, ServiceStatus::Running);

    // The process stays alive but goes unhealthy. The health monitor must
    // notice, consume the single restart attempt (which cannot succeed
    // against the 503 endpoint), and land on Failed with one alert.
    endpoint.set_healthy(false);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if supervisor.status().await[0].status == ServiceStatus::Failed {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "service never reached Failed; status: {:?}",
            supervisor.status().await[0].status
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let report = &supervisor.status().await[0];
    assert_eq!(report.restart_count, 1);

    let alert = alerts.recv().await.expect("terminal failure must alert");
    assert_eq!(alert.service, "hung");
    assert_eq!(alert.restart_count, 1);

    supervisor.shutdown().await;
}
