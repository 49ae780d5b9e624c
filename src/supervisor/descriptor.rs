//! Service descriptors: per-service state machine and runtime bookkeeping.

use crate::config::{Config, ServiceSpec};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Current lifecycle status of a managed service.
///
/// # State Transitions
///
/// ```text
/// Stopped ──► Starting ──► Running ──► Stopping ──► Stopped
///    ▲            │            │
///    │            ▼            ▼
///    └───────── Error ◄─── (unexpected exit → Stopped)
///                 │
///                 ▼
///               Failed  (terminal until manual restart)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Service is not running
    Stopped,
    /// A start attempt is in flight (spawn, readiness probe, or backoff)
    Starting,
    /// Service passed its readiness probe and is being monitored
    Running,
    /// A stop was requested and the process has not exited yet
    Stopping,
    /// Service failed (crash, spawn failure, or unhealthy) and is eligible
    /// for an automatic restart
    Error,
    /// Restart budget exhausted; requires a manual restart
    Failed,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Stopped => write!(f, "stopped"),
            ServiceStatus::Starting => write!(f, "starting"),
            ServiceStatus::Running => write!(f, "running"),
            ServiceStatus::Stopping => write!(f, "stopping"),
            ServiceStatus::Error => write!(f, "error"),
            ServiceStatus::Failed => write!(f, "failed"),
        }
    }
}

impl ServiceStatus {
    /// Check if a status transition is valid according to the state machine.
    ///
    /// `Failed -> Stopped` is the manual-reset edge: it is only taken by an
    /// explicit restart request or supervisor shutdown, never automatically.
    pub fn is_valid_transition(&self, to: ServiceStatus) -> bool {
        use ServiceStatus::*;
        match (self, to) {
            (Stopped, Starting) => true,

            // Spawn succeeded and probe passed, spawn/probe failed, or a
            // stop arrived mid-start
            (Starting, Running) => true,
            (Starting, Error) => true,
            (Starting, Stopping) => true,

            // Requested stop, unexpected exit, or health failure
            (Running, Stopping) => true,
            (Running, Stopped) => true,
            (Running, Error) => true,

            (Stopping, Stopped) => true,

            // Restart attempt claims the descriptor, gives up, or the
            // service is stopped while waiting for a restart
            (Error, Starting) => true,
            (Error, Failed) => true,
            (Error, Stopped) => true,

            // Unexpected exit feeds the restart policy through Stopped
            (Stopped, Error) => true,

            // Manual reset only
            (Failed, Stopped) => true,

            // Same state is always valid (no-op transition)
            (s1, s2) if *s1 == s2 => true,

            _ => false,
        }
    }
}

/// Handle to a live child process.
///
/// Present if and only if the descriptor currently owns a spawned process;
/// cleared (via [`ServiceDescriptor::take_handle`]) the moment the process
/// is observed to have exited or is forcibly reclaimed.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub pid: u32,
    pub spawned_at: DateTime<Utc>,
}

/// One managed service: static spec plus runtime state.
///
/// Mutated only under its registry mutex; the status field doubles as the
/// single-flight guard for start attempts (see [`try_claim_start`]).
///
/// [`try_claim_start`]: ServiceDescriptor::try_claim_start
#[derive(Debug)]
pub struct ServiceDescriptor {
    spec: ServiceSpec,
    work_dir: PathBuf,
    status: ServiceStatus,
    handle: Option<ProcessHandle>,
    /// Spawn generation. Bumped on every spawn and every handle reclaim so
    /// that exit watchers from superseded processes become inert.
    generation: u64,
    restart_count: u32,
    start_time: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl ServiceDescriptor {
    pub fn new(spec: ServiceSpec, work_dir: PathBuf) -> Self {
        Self {
            spec,
            work_dir,
            status: ServiceStatus::Stopped,
            handle: None,
            generation: 0,
            restart_count: 0,
            start_time: None,
            last_error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    pub fn work_dir(&self) -> &PathBuf {
        &self.work_dir
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Transition to a new status, rejecting edges the state machine does
    /// not allow.
    pub fn transition(&mut self, to: ServiceStatus) -> Result<()> {
        if !self.status.is_valid_transition(to) {
            return Err(Error::InvalidTransition {
                service: self.spec.name.clone(),
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        tracing::debug!(
            service = %self.spec.name,
            from = %self.status,
            to = %to,
            "status transition"
        );
        self.status = to;
        if to == ServiceStatus::Stopped {
            self.start_time = None;
        }
        Ok(())
    }

    /// Claim a start attempt if the service is eligible for one.
    ///
    /// Only Stopped and Error are eligible; claiming transitions to
    /// Starting in the same critical section, so a concurrent failure
    /// signal for the same service observes Starting and backs off. This
    /// is what makes restarts single-flight.
    pub fn try_claim_start(&mut self) -> bool {
        match self.status {
            ServiceStatus::Stopped | ServiceStatus::Error => {
                self.status = ServiceStatus::Starting;
                true
            }
            _ => false,
        }
    }

    /// Record a confirmed successful readiness transition: the service is
    /// Running, its restart budget is replenished, and uptime starts now.
    pub fn mark_running(&mut self) -> Result<()> {
        self.transition(ServiceStatus::Running)?;
        self.restart_count = 0;
        self.start_time = Some(Utc::now());
        self.last_error = None;
        Ok(())
    }

    pub fn record_error(&mut self, error: impl fmt::Display) {
        self.last_error = Some(error.to_string());
    }

    pub fn set_restart_count(&mut self, count: u32) {
        self.restart_count = count;
    }

    /// True while the descriptor owns a live process.
    pub fn process_alive(&self) -> bool {
        self.handle.is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().map(|h| h.pid)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Install a freshly spawned process handle, returning the generation
    /// its exit watcher must present to act on this descriptor.
    ///
    /// The one-live-process invariant is enforced here: installing over an
    /// existing handle is a bug.
    pub fn install_handle(&mut self, pid: u32) -> u64 {
        debug_assert!(
            self.handle.is_none(),
            "descriptor '{}' already owns a process",
            self.spec.name
        );
        self.generation += 1;
        self.handle = Some(ProcessHandle {
            pid,
            spawned_at: Utc::now(),
        });
        self.generation
    }

    /// Remove and return the process handle, invalidating any watcher
    /// still holding the old generation.
    pub fn take_handle(&mut self) -> Option<ProcessHandle> {
        if self.handle.is_some() {
            self.generation += 1;
        }
        self.handle.take()
    }

    /// Whether an exit watcher spawned at `generation` still speaks for
    /// the current process.
    pub fn watcher_current(&self, generation: u64) -> bool {
        self.handle.is_some() && self.generation == generation
    }

    /// Read-only status snapshot for external callers.
    pub fn report(&self) -> ServiceReport {
        ServiceReport {
            name: self.spec.name.clone(),
            status: self.status,
            port: self.spec.port,
            restart_count: self.restart_count,
            uptime_secs: self.start_time.map(|t| {
                let secs = Utc::now().signed_duration_since(t).num_seconds();
                secs.max(0) as u64
            }),
        }
    }
}

/// Per-service entry in the status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceReport {
    pub name: String,
    pub status: ServiceStatus,
    pub port: u16,
    pub restart_count: u32,
    /// Seconds since the last successful start; absent unless running.
    pub uptime_secs: Option<u64>,
}

/// Shared, lockable descriptor as stored in the registry.
pub type SharedDescriptor = Arc<tokio::sync::Mutex<ServiceDescriptor>>;

/// Immutable registry of descriptors, built once from configuration.
///
/// The map never changes after construction; all mutation happens inside
/// the per-descriptor mutexes.
pub struct Registry {
    services: HashMap<String, SharedDescriptor>,
    order: Vec<String>,
}

impl Registry {
    pub fn from_config(config: &Config, work_dir: PathBuf) -> Self {
        let mut services = HashMap::new();
        let mut order = Vec::new();

        for spec in &config.services {
            order.push(spec.name.clone());
            services.insert(
                spec.name.clone(),
                Arc::new(tokio::sync::Mutex::new(ServiceDescriptor::new(
                    spec.clone(),
                    work_dir.clone(),
                ))),
            );
        }

        Self { services, order }
    }

    pub fn get(&self, name: &str) -> Option<SharedDescriptor> {
        self.services.get(name).map(Arc::clone)
    }

    /// Declared start order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Descriptors in declared order.
    pub fn entries_in_order(&self) -> Vec<(String, SharedDescriptor)> {
        self.order
            .iter()
            .map(|name| (name.clone(), Arc::clone(&self.services[name])))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
