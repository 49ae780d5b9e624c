use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(
        code(warden::config::validation),
        help("Run `warden validate` for detailed validation errors")
    )]
    Validation(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service not found: {0}")]
    #[diagnostic(
        code(warden::service::not_found),
        help("Check the service names declared in your warden.yaml")
    )]
    ServiceNotFound(String),

    #[error("Service '{service}' could not be spawned: {reason}")]
    #[diagnostic(
        code(warden::service::spawn_failed),
        help("Check that the command exists and is executable")
    )]
    SpawnFailed { service: String, reason: String },

    #[error("Service '{service}' exited unexpectedly: {detail}")]
    #[diagnostic(code(warden::service::crashed))]
    Crashed { service: String, detail: String },

    #[error("Service '{service}' did not become ready after {attempts} attempts")]
    #[diagnostic(
        code(warden::service::readiness_timeout),
        help("The service may be slow to start. Increase readiness_attempts or verify the healthcheck URL")
    )]
    ReadinessTimeout { service: String, attempts: u32 },

    #[error("Service '{service}' failed its health check: {reason}")]
    #[diagnostic(
        code(warden::service::health_check_failed),
        help("Verify the healthcheck URL is correct and the service answers 2xx when healthy")
    )]
    HealthCheckFailed { service: String, reason: String },

    #[error("Service '{service}' exhausted its restart budget after {attempts} attempts")]
    #[diagnostic(
        code(warden::service::restart_budget_exhausted),
        help("The service is marked failed and will not be restarted automatically. Recover it with a manual restart once the underlying problem is fixed")
    )]
    RestartBudgetExhausted { service: String, attempts: u32 },

    #[error("A start attempt for service '{0}' is already in progress")]
    #[diagnostic(code(warden::service::start_in_progress))]
    StartInProgress(String),

    #[error("Invalid state transition for service '{service}': {from} -> {to}")]
    InvalidTransition {
        service: String,
        from: String,
        to: String,
    },

    #[error("Invalid PID {pid}: {reason}")]
    InvalidPid { pid: u32, reason: String },

    #[error("Operation cancelled for service '{0}'")]
    Cancelled(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::ServiceNotFound(name) => Some(format!(
                "Service '{}' is not declared in warden.yaml. Check the services list.",
                name
            )),
            Error::SpawnFailed { service, .. } => Some(format!(
                "Verify the command configured for '{}' exists and is executable.",
                service
            )),
            Error::ReadinessTimeout { service, .. } => Some(format!(
                "Check that '{}' binds its configured port and serves 2xx on its healthcheck URL, or raise readiness_attempts.",
                service
            )),
            Error::RestartBudgetExhausted { service, .. } => Some(format!(
                "Fix the underlying failure, then recover with a manual restart of '{}'.",
                service
            )),
            Error::Config(_) | Error::Validation(_) => {
                Some("Validate your config with: warden validate".to_string())
            }
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}

/// Validates and converts a u32 PID to nix::unistd::Pid safely.
/// Returns Err for PID 0 (process group), PID 1 (init), or values > i32::MAX.
pub fn validate_pid(pid: u32, service_name: &str) -> Result<nix::unistd::Pid> {
    if pid == 0 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "PID 0 is invalid for service '{}' (refers to process group, not a process)",
                service_name
            ),
        });
    }
    if pid == 1 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "refusing to operate on PID 1 (init) for service '{}'",
                service_name
            ),
        });
    }
    if pid > i32::MAX as u32 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "PID {} exceeds i32::MAX for service '{}', cannot convert safely",
                pid, service_name
            ),
        });
    }
    Ok(nix::unistd::Pid::from_raw(pid as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_pid_rejects_zero_and_init() {
        assert!(validate_pid(0, "svc").is_err());
        assert!(validate_pid(1, "svc").is_err());
        assert!(validate_pid(4242, "svc").is_ok());
    }

    #[test]
    fn validate_pid_rejects_out_of_range() {
        assert!(validate_pid(u32::MAX, "svc").is_err());
        assert!(validate_pid(i32::MAX as u32, "svc").is_ok());
    }

    #[test]
    fn suggestion_present_for_actionable_errors() {
        let err = Error::ReadinessTimeout {
            service: "backend".to_string(),
            attempts: 30,
        };
        assert!(err.suggestion().is_some());
        assert!(err.with_suggestion().contains("Hint:"));
    }

    #[test]
    fn suggestion_absent_for_io_errors() {
        let err = Error::Io(io::Error::other("boom"));
        assert!(err.suggestion().is_none());
    }
}
