//! Background monitoring loops.
//!
//! Two independent periodic loops watch every Running service:
//!
//! - the liveness loop checks that the owned process is still alive;
//! - the health loop calls the service's healthcheck URL with a bounded
//!   per-request timeout.
//!
//! Neither loop restarts anything itself; both convert what they observe
//! into [`Failure`] events for the supervisor's failure dispatcher, which
//! applies the restart policy exactly once per failure. Each cycle is
//! panic-isolated so a bug in one check cannot kill monitoring.

use super::descriptor::{Registry, ServiceStatus, SharedDescriptor};
use super::policy::Failure;
use crate::error::Error;
use crate::healthcheck::{HealthChecker, HttpChecker};
use futures::FutureExt;
use nix::sys::signal;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Periodically verify that Running services still have a live process.
pub(crate) async fn run_liveness_loop(
    registry: Arc<Registry>,
    failures: mpsc::UnboundedSender<Failure>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("liveness monitor shutting down");
                break;
            }
            _ = interval.tick() => {
                let cycle = AssertUnwindSafe(liveness_cycle(&registry, &failures))
                    .catch_unwind()
                    .await;
                if let Err(panic) = cycle {
                    tracing::error!(
                        "liveness cycle panicked: {}. Continuing monitoring...",
                        panic_message(panic)
                    );
                }
            }
        }
    }
}

async fn liveness_cycle(registry: &Registry, failures: &mpsc::UnboundedSender<Failure>) {
    for (name, entry) in registry.entries_in_order() {
        let mut desc = entry.lock().await;
        if desc.status() != ServiceStatus::Running {
            continue;
        }

        let gone = match desc.pid() {
            // Watcher already observed the exit and cleared the handle,
            // but the status update raced us somehow; treat as dead.
            None => true,
            // Signal 0 probes existence without touching the process.
            Some(pid) => match crate::error::validate_pid(pid, &name) {
                Ok(pid) => signal::kill(pid, None).is_err(),
                Err(_) => true,
            },
        };

        if gone {
            tracing::warn!(service = %name, "process died without a stop request");
            desc.take_handle();
            let detail = desc
                .last_error()
                .unwrap_or("process died without a stop request")
                .to_string();
            if desc.transition(ServiceStatus::Stopped).is_err() {
                continue;
            }
            let _ = failures.send(Failure {
                name: name.clone(),
                error: Error::Crashed {
                    service: name,
                    detail,
                },
            });
        }
    }
}

/// Periodically call every Running service's healthcheck URL.
///
/// A non-2xx answer, a timeout, or a connection error is a failure signal
/// handled identically to a crash: the service is routed through the
/// restart decision so a hung-but-alive process still gets replaced. The
/// monitor never kills the process itself.
pub(crate) async fn run_health_loop(
    registry: Arc<Registry>,
    checkers: Arc<HashMap<String, Arc<HttpChecker>>>,
    failures: mpsc::UnboundedSender<Failure>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("health monitor shutting down");
                break;
            }
            _ = interval.tick() => {
                let cycle = AssertUnwindSafe(health_cycle(&registry, &checkers, &failures))
                    .catch_unwind()
                    .await;
                if let Err(panic) = cycle {
                    tracing::error!(
                        "health check cycle panicked: {}. Continuing monitoring...",
                        panic_message(panic)
                    );
                }
            }
        }
    }
}

async fn health_cycle(
    registry: &Registry,
    checkers: &HashMap<String, Arc<HttpChecker>>,
    failures: &mpsc::UnboundedSender<Failure>,
) {
    // Snapshot the Running services first, holding each lock only briefly,
    // then run all HTTP checks concurrently without any locks held.
    let mut targets: Vec<(String, SharedDescriptor, Arc<HttpChecker>)> = Vec::new();
    for (name, entry) in registry.entries_in_order() {
        let status = entry.lock().await.status();
        if status != ServiceStatus::Running {
            continue;
        }
        if let Some(checker) = checkers.get(&name) {
            targets.push((name, entry, Arc::clone(checker)));
        }
    }

    let checks = targets.into_iter().map(|(name, entry, checker)| async move {
        let healthy = checker.check().await.unwrap_or(false);
        (name, entry, healthy)
    });

    for (name, entry, healthy) in futures::future::join_all(checks).await {
        if healthy {
            continue;
        }

        // Re-check under the lock: the service may have been stopped or
        // already claimed for a restart while the HTTP call was in flight.
        let still_running = entry.lock().await.status() == ServiceStatus::Running;
        if !still_running {
            continue;
        }

        tracing::warn!(service = %name, "health check failed");
        let _ = failures.send(Failure {
            name: name.clone(),
            error: Error::HealthCheckFailed {
                service: name,
                reason: "no 2xx response within timeout".to_string(),
            },
        });
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
