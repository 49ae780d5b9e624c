//! After exactly `max_restarts` consecutive failed start attempts the
//! service must be Failed with no further automatic attempts, and an
//! alert must be emitted carrying the failure context.

mod common;

use common::{config_from_yaml, HealthEndpoint};
use std::path::PathBuf;
use std::time::Duration;
use warden::{ServiceStatus, Supervisor};

#[tokio::test]
async fn crashing_service_is_failed_after_its_budget() {
    let endpoint = HealthEndpoint::spawn(false).await;

    // The process dies immediately; readiness can never pass. Budget of 2
    // means: initial attempt, then exactly 2 retries, then Failed.
    let config = config_from_yaml(&format!(
        r#"
startup_delay: "100ms"
services:
  - name: crasher
    command: "exit 7"
    port: {port}
    healthcheck: "{url}"
    max_restarts: 2
    restart_backoff: "100ms"
    readiness_attempts: 3
    readiness_interval: "100ms"
    grace_period: "500ms"
"#,
        port = endpoint.port(),
        url = endpoint.url(),
    ));

    let supervisor = Supervisor::new(config, PathBuf::from(".")).unwrap();
    let mut alerts = supervisor.subscribe_alerts();

    // start_all reports success: a terminally failed service is isolated,
    // not propagated.
    supervisor.start_all().await.unwrap();

    let reports = supervisor.status().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, ServiceStatus::Failed);
    assert_eq!(reports[0].restart_count, 2);
    assert!(reports[0].uptime_secs.is_none());

    let alert = alerts.try_recv().expect("terminal failure must alert");
    assert_eq!(alert.service, "crasher");
    assert_eq!(alert.port, endpoint.port());
    assert_eq!(alert.restart_count, 2);

    // No third automatic attempt: give any would-be restart time to fire,
    // then confirm nothing moved.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let reports = supervisor.status().await;
    assert_eq!(reports[0].status, ServiceStatus::Failed);
    assert_eq!(reports[0].restart_count, 2);
    assert!(alerts.try_recv().is_err(), "exactly one alert expected");

    supervisor.shutdown().await;
}

#[tokio::test]
async fn failed_service_does_not_block_later_services() {
    let dead_endpoint = HealthEndpoint::spawn(false).await;
    let live_endpoint = HealthEndpoint::spawn(true).await;

    let config = config_from_yaml(&format!(
        r#"
startup_delay: "100ms"
services:
  - name: crasher
    command: "exit 1"
    port: {dead_port}
    healthcheck: "{dead_url}"
    max_restarts: 1
    restart_backoff: "100ms"
    readiness_attempts: 2
    readiness_interval: "100ms"
  - name: survivor
    command: "sleep 30"
    port: {live_port}
    healthcheck: "{live_url}"
    readiness_interval: "100ms"
    grace_period: "500ms"
"#,
        dead_port = dead_endpoint.port(),
        dead_url = dead_endpoint.url(),
        live_port = live_endpoint.port(),
        live_url = live_endpoint.url(),
    ));

    let supervisor = Supervisor::new(config, PathBuf::from(".")).unwrap();
    supervisor.start_all().await.unwrap();

    let reports = supervisor.status().await;
    assert_eq!(reports[0].name, "crasher");
    assert_eq!(reports[0].status, ServiceStatus::Failed);
    assert_eq!(reports[1].name, "survivor");
    assert_eq!(reports[1].status, ServiceStatus::Running);
    assert_eq!(reports[1].restart_count, 0);

    supervisor.shutdown().await;
}
