//! Top-level configuration structure.

use super::{parse_duration_string, ServiceSpec};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Default delay between starting consecutive services.
const DEFAULT_STARTUP_DELAY: Duration = Duration::from_secs(2);

/// Default period of the process liveness monitor.
const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(10);

/// Default period of the HTTP health monitor.
const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// The root of warden.yaml.
///
/// Services are an ordered list: declared order is start order, and each
/// service must be ready before the next one is spawned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Delay between starting consecutive services (e.g. "2s").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_delay: Option<String>,

    /// Period of the process liveness monitor (e.g. "10s").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_interval: Option<String>,

    /// Period of the HTTP health monitor (e.g. "30s").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_interval: Option<String>,

    #[serde(default)]
    pub services: Vec<ServiceSpec>,
}

impl Config {
    pub fn get_startup_delay(&self) -> Duration {
        self.startup_delay
            .as_deref()
            .and_then(parse_duration_string)
            .unwrap_or(DEFAULT_STARTUP_DELAY)
    }

    pub fn get_liveness_interval(&self) -> Duration {
        self.liveness_interval
            .as_deref()
            .and_then(parse_duration_string)
            .unwrap_or(DEFAULT_LIVENESS_INTERVAL)
    }

    pub fn get_health_interval(&self) -> Duration {
        self.health_interval
            .as_deref()
            .and_then(parse_duration_string)
            .unwrap_or(DEFAULT_HEALTH_INTERVAL)
    }

    /// Look up a service spec by name.
    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Validate the configuration.
    ///
    /// Checks that at least one service is declared, names are unique and
    /// non-empty, commands are non-empty, ports are non-zero and unique,
    /// healthcheck URLs are well-formed http/https, and readiness budgets
    /// are at least one attempt.
    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(Error::Validation(
                "no services declared; add at least one entry under 'services'".to_string(),
            ));
        }

        let mut names = HashSet::new();
        let mut ports = HashSet::new();

        for spec in &self.services {
            if spec.name.trim().is_empty() {
                return Err(Error::Validation(
                    "a service has an empty name".to_string(),
                ));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(Error::Validation(format!(
                    "duplicate service name '{}'",
                    spec.name
                )));
            }
            if spec.command.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "service '{}' has an empty command",
                    spec.name
                )));
            }
            if spec.port == 0 {
                return Err(Error::Validation(format!(
                    "service '{}' has port 0; declare the real port the service binds",
                    spec.name
                )));
            }
            if !ports.insert(spec.port) {
                return Err(Error::Validation(format!(
                    "service '{}' reuses port {} already claimed by another service",
                    spec.name, spec.port
                )));
            }
            if spec.readiness_attempts == 0 {
                return Err(Error::Validation(format!(
                    "service '{}' has readiness_attempts 0; at least one attempt is required",
                    spec.name
                )));
            }
            validate_healthcheck_url(&spec.name, &spec.healthcheck)?;
        }

        Ok(())
    }
}

/// Check that a healthcheck URL parses and uses an http or https scheme.
fn validate_healthcheck_url(service: &str, raw: &str) -> Result<()> {
    match url::Url::parse(raw) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            if scheme != "http" && scheme != "https" {
                return Err(Error::Validation(format!(
                    "service '{}': healthcheck URL '{}' must use http or https, got '{}'",
                    service, raw, scheme
                )));
            }
            Ok(())
        }
        Err(e) => Err(Error::Validation(format!(
            "service '{}': invalid healthcheck URL '{}': {}",
            service, raw, e
        ))),
    }
}
