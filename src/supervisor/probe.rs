//! Readiness probing for freshly started services.

use super::descriptor::SharedDescriptor;
use crate::error::{Error, Result};
use crate::healthcheck::HealthChecker;
use std::time::Duration;
use tokio::time::sleep;

/// Poll the service's health endpoint until it answers 2xx or the attempt
/// budget runs out.
///
/// One poll per `interval`, up to `attempts` polls; every failed poll is
/// followed by the interval delay, so the worst case is roughly
/// `attempts * interval`. If the process dies while we are polling, the
/// probe fails fast with the recorded exit instead of burning the rest of
/// the budget.
///
/// The probe itself does not change the descriptor's status; the caller
/// owns the Starting claim and decides what a success or failure means.
pub async fn wait_until_ready(
    entry: &SharedDescriptor,
    checker: &dyn HealthChecker,
    attempts: u32,
    interval: Duration,
) -> Result<()> {
    let name = {
        let desc = entry.lock().await;
        desc.name().to_string()
    };

    for attempt in 1..=attempts {
        // Fast path: the exit watcher cleared the handle, the process is gone.
        {
            let desc = entry.lock().await;
            if !desc.process_alive() {
                let detail = desc
                    .last_error()
                    .unwrap_or("process disappeared before becoming ready")
                    .to_string();
                return Err(Error::Crashed {
                    service: name,
                    detail,
                });
            }
        }

        if checker.check().await.unwrap_or(false) {
            tracing::debug!(service = %name, attempt, "service is ready");
            return Ok(());
        }

        tracing::trace!(service = %name, attempt, max = attempts, "not ready yet");
        sleep(interval).await;
    }

    Err(Error::ReadinessTimeout {
        service: name,
        attempts,
    })
}
