//! Per-service configuration.

use super::parse_duration_string;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default restart budget before a service is marked permanently failed.
const DEFAULT_MAX_RESTARTS: u32 = 5;

/// Default delay between a failure and the next restart attempt.
const DEFAULT_RESTART_BACKOFF: Duration = Duration::from_secs(5);

/// Default grace period between SIGTERM and SIGKILL.
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Default readiness polling budget.
const DEFAULT_READINESS_ATTEMPTS: u32 = 30;

/// Default delay between readiness polls.
const DEFAULT_READINESS_INTERVAL: Duration = Duration::from_secs(1);

/// Default per-request timeout for health checks.
const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for one managed service.
///
/// ```yaml
/// services:
///   - name: backend
///     command: "node backend-server.js"
///     port: 3000
///     healthcheck: "http://localhost:3000/api/health"
///     max_restarts: 5
///     grace_period: "5s"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Unique identifier; also the registry key.
    pub name: String,

    /// Shell command that launches the service.
    pub command: String,

    /// Port the service is expected to bind.
    pub port: u16,

    /// HTTP URL polled for readiness and ongoing health. 2xx means healthy.
    pub healthcheck: String,

    /// Restart budget before the service is marked permanently failed.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Delay between a failure and the next restart attempt (e.g. "5s").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_backoff: Option<String>,

    /// Time the process gets to exit after SIGTERM before SIGKILL (e.g. "5s").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period: Option<String>,

    /// How many times the readiness probe polls before giving up.
    #[serde(default = "default_readiness_attempts")]
    pub readiness_attempts: u32,

    /// Delay between readiness polls (e.g. "1s").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_interval: Option<String>,

    /// Per-request timeout for health check HTTP calls (e.g. "5s").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_timeout: Option<String>,

    /// Working directory for the process, absolute or relative to the
    /// supervisor's work dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    /// Extra environment variables for the process.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub environment: HashMap<String, String>,
}

fn default_max_restarts() -> u32 {
    DEFAULT_MAX_RESTARTS
}

fn default_readiness_attempts() -> u32 {
    DEFAULT_READINESS_ATTEMPTS
}

impl ServiceSpec {
    pub fn get_restart_backoff(&self) -> Duration {
        self.restart_backoff
            .as_deref()
            .and_then(parse_duration_string)
            .unwrap_or(DEFAULT_RESTART_BACKOFF)
    }

    pub fn get_grace_period(&self) -> Duration {
        self.grace_period
            .as_deref()
            .and_then(parse_duration_string)
            .unwrap_or(DEFAULT_GRACE_PERIOD)
    }

    pub fn get_readiness_interval(&self) -> Duration {
        self.readiness_interval
            .as_deref()
            .and_then(parse_duration_string)
            .unwrap_or(DEFAULT_READINESS_INTERVAL)
    }

    pub fn get_health_timeout(&self) -> Duration {
        self.health_timeout
            .as_deref()
            .and_then(parse_duration_string)
            .unwrap_or(DEFAULT_HEALTH_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
name: backend
command: "node server.js"
port: 3000
healthcheck: "http://localhost:3000/api/health"
"#
    }

    #[test]
    fn defaults_applied_on_minimal_spec() {
        let spec: ServiceSpec = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(spec.max_restarts, 5);
        assert_eq!(spec.readiness_attempts, 30);
        assert_eq!(spec.get_restart_backoff(), Duration::from_secs(5));
        assert_eq!(spec.get_grace_period(), Duration::from_secs(5));
        assert_eq!(spec.get_readiness_interval(), Duration::from_secs(1));
        assert_eq!(spec.get_health_timeout(), Duration::from_secs(5));
        assert!(spec.environment.is_empty());
    }

    #[test]
    fn durations_parse_from_strings() {
        let yaml = r#"
name: bridge
command: "node bridge.js"
port: 3001
healthcheck: "http://localhost:3001/status"
restart_backoff: "500ms"
grace_period: "2s"
readiness_interval: "200ms"
health_timeout: "10s"
"#;
        let spec: ServiceSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.get_restart_backoff(), Duration::from_millis(500));
        assert_eq!(spec.get_grace_period(), Duration::from_secs(2));
        assert_eq!(spec.get_readiness_interval(), Duration::from_millis(200));
        assert_eq!(spec.get_health_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn unparseable_duration_falls_back_to_default() {
        let yaml = r#"
name: backend
command: "node server.js"
port: 3000
healthcheck: "http://localhost:3000/api/health"
grace_period: "whenever"
"#;
        let spec: ServiceSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.get_grace_period(), Duration::from_secs(5));
    }
}
