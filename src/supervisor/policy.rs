//! Restart decisions, failure events, and terminal-failure alerts.

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A failure signal for one service, routed to the supervisor's failure
/// dispatcher. Produced by exit watchers and by the liveness and health
/// monitors; all of them feed the same restart decision.
#[derive(Debug)]
pub(crate) struct Failure {
    pub name: String,
    pub error: Error,
}

/// Outcome of consulting the restart policy after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Budget remains: make attempt number `attempt` (1-based) after the
    /// service's configured backoff delay.
    Retry { attempt: u32 },
    /// Budget exhausted: mark the service permanently failed and alert.
    GiveUp,
}

/// Decide whether a failed service gets another automatic restart.
///
/// `restart_count` is the number of attempts already consumed since the
/// last successful run. The contract is bounded attempts then permanent
/// failure; the backoff delay is fixed per service, not exponential.
pub fn next_attempt(restart_count: u32, max_restarts: u32) -> RestartDecision {
    if restart_count < max_restarts {
        RestartDecision::Retry {
            attempt: restart_count + 1,
        }
    } else {
        RestartDecision::GiveUp
    }
}

/// Emitted when a service exhausts its restart budget. This is a terminal,
/// human-actionable condition: the service stays Failed until someone
/// issues a manual restart.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub service: String,
    pub error: String,
    pub port: u16,
    pub restart_count: u32,
    pub at: DateTime<Utc>,
}

impl Alert {
    pub(crate) fn new(service: &str, error: &str, port: u16, restart_count: u32) -> Self {
        Self {
            service: service.to_string(),
            error: error.to_string(),
            port,
            restart_count,
            at: Utc::now(),
        }
    }

    /// Log the alert. Delivery on the broadcast channel is best-effort;
    /// the log line is the guaranteed record.
    pub(crate) fn log(&self) {
        tracing::error!(
            service = %self.service,
            port = self.port,
            restart_count = self.restart_count,
            error = %self.error,
            "service is down and requires manual intervention"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_while_budget_remains() {
        assert_eq!(next_attempt(0, 5), RestartDecision::Retry { attempt: 1 });
        assert_eq!(next_attempt(4, 5), RestartDecision::Retry { attempt: 5 });
    }

    #[test]
    fn gives_up_when_budget_spent() {
        assert_eq!(next_attempt(5, 5), RestartDecision::GiveUp);
        assert_eq!(next_attempt(7, 5), RestartDecision::GiveUp);
    }

    #[test]
    fn zero_budget_never_retries() {
        assert_eq!(next_attempt(0, 0), RestartDecision::GiveUp);
    }

    #[test]
    fn exact_budget_boundary() {
        // max_restarts=2: attempts 1 and 2 are allowed, a third is not
        assert_eq!(next_attempt(0, 2), RestartDecision::Retry { attempt: 1 });
        assert_eq!(next_attempt(1, 2), RestartDecision::Retry { attempt: 2 });
        assert_eq!(next_attempt(2, 2), RestartDecision::GiveUp);
    }

    #[test]
    fn alert_carries_failure_context() {
        let alert = Alert::new("backend", "exited with code 1", 3000, 5);
        assert_eq!(alert.service, "backend");
        assert_eq!(alert.port, 3000);
        assert_eq!(alert.restart_count, 5);
        let json = serde_json::to_string(&alert).unwrap();
        assert!(json.contains("\"service\":\"backend\""));
    }
}
