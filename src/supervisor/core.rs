//! The supervisor: startup ordering, failure routing, and shutdown.

use super::descriptor::{Registry, ServiceReport, ServiceStatus, SharedDescriptor};
use super::policy::{self, Alert, Failure, RestartDecision};
use super::{launcher, monitor, probe};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::healthcheck::HttpChecker;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Capacity of the alert broadcast channel. Alerts are rare (one per
/// terminally failed service); slow subscribers just lose the oldest.
const ALERT_CHANNEL_CAPACITY: usize = 16;

/// Everything a restart sequence needs, cloneable into spawned tasks.
#[derive(Clone)]
pub(crate) struct RestartContext {
    pub registry: Arc<Registry>,
    pub checkers: Arc<HashMap<String, Arc<HttpChecker>>>,
    pub failures: mpsc::UnboundedSender<Failure>,
    pub alerts: broadcast::Sender<Alert>,
    pub cancel: CancellationToken,
}

/// The central coordinator for a fixed set of managed services.
///
/// The supervisor owns the descriptor registry and wires the launcher,
/// readiness probe, monitors, and restart policy together:
///
/// 1. **Start**: [`start_all`] launches services in declared order, each
///    probed to readiness before the next spawn.
/// 2. **Monitor**: [`start_monitoring`] runs the liveness and health loops;
///    failures route through a single dispatcher that applies the bounded
///    restart policy exactly once per failure.
/// 3. **Stop**: [`shutdown`] cancels monitoring and stops every service
///    with a grace-then-force-kill sequence. Idempotent.
///
/// Failure handling is isolated per service: one service exhausting its
/// restart budget never affects the others.
///
/// [`start_all`]: Supervisor::start_all
/// [`start_monitoring`]: Supervisor::start_monitoring
/// [`shutdown`]: Supervisor::shutdown
pub struct Supervisor {
    config: Config,
    registry: Arc<Registry>,
    checkers: Arc<HashMap<String, Arc<HttpChecker>>>,
    failures_tx: mpsc::UnboundedSender<Failure>,
    /// Taken by `start_monitoring`; present until then.
    failures_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<Failure>>>,
    alerts_tx: broadcast::Sender<Alert>,
    cancel: CancellationToken,
    tasks: tokio::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
    shutdown_started: AtomicBool,
}

impl Supervisor {
    /// Create a supervisor from validated configuration.
    ///
    /// Builds the descriptor registry and one HTTP checker per service.
    /// Nothing is spawned until [`start_all`](Self::start_all) is called.
    pub fn new(config: Config, work_dir: PathBuf) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(Registry::from_config(&config, work_dir));

        let mut checkers = HashMap::new();
        for spec in &config.services {
            checkers.insert(
                spec.name.clone(),
                Arc::new(HttpChecker::new(
                    spec.healthcheck.clone(),
                    spec.get_health_timeout(),
                )?),
            );
        }

        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        let (alerts_tx, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            registry,
            checkers: Arc::new(checkers),
            failures_tx,
            failures_rx: tokio::sync::Mutex::new(Some(failures_rx)),
            alerts_tx,
            cancel: CancellationToken::new(),
            tasks: tokio::sync::Mutex::new(Vec::new()),
            shutdown_started: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to terminal-failure alerts.
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<Alert> {
        self.alerts_tx.subscribe()
    }

    fn ctx(&self) -> RestartContext {
        RestartContext {
            registry: Arc::clone(&self.registry),
            checkers: Arc::clone(&self.checkers),
            failures: self.failures_tx.clone(),
            alerts: self.alerts_tx.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Start every service in declared order.
    ///
    /// Each service is spawned, probed to readiness, and only then is the
    /// next spawn issued, with the configured inter-service delay in
    /// between. Startup failures consume the service's restart budget
    /// inline; a service that exhausts it is left Failed and the remaining
    /// services still start.
    #[tracing::instrument(skip(self))]
    pub async fn start_all(&self) -> Result<()> {
        let delay = self.config.get_startup_delay();
        let entries = self.registry.entries_in_order();
        let count = entries.len();

        for (i, (name, entry)) in entries.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled("start_all".to_string()));
            }

            let claimed = entry.lock().await.try_claim_start();
            if !claimed {
                tracing::warn!(service = %name, "not eligible for start, skipping");
            } else {
                match run_start_sequence(&self.ctx(), &entry, false).await {
                    Ok(()) => {}
                    Err(Error::Cancelled(name)) => {
                        return Err(Error::Cancelled(name));
                    }
                    Err(e) => {
                        // Isolation: this service is Failed; the rest of
                        // the platform still comes up.
                        tracing::error!(service = %name, "failed to start: {}", e);
                    }
                }
            }

            if i + 1 < count {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        return Err(Error::Cancelled("start_all".to_string()));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        Ok(())
    }

    /// Manually restart one service.
    ///
    /// Force-stops the current process (grace then kill) if there is one,
    /// resets the restart budget, and runs the normal start sequence. This
    /// is the only path that clears a Failed status.
    #[tracing::instrument(skip(self))]
    pub async fn restart_service(&self, name: &str) -> Result<()> {
        let entry = self
            .registry
            .get(name)
            .ok_or_else(|| Error::ServiceNotFound(name.to_string()))?;

        {
            let desc = entry.lock().await;
            if matches!(
                desc.status(),
                ServiceStatus::Starting | ServiceStatus::Stopping
            ) {
                return Err(Error::StartInProgress(name.to_string()));
            }
        }

        launcher::stop(&entry).await?;

        {
            let mut desc = entry.lock().await;
            desc.set_restart_count(0);
            if !desc.try_claim_start() {
                return Err(Error::StartInProgress(name.to_string()));
            }
        }

        run_start_sequence(&self.ctx(), &entry, false).await
    }

    /// Stop every service: SIGTERM concurrently, per-service grace period,
    /// then SIGKILL for anything still alive. All statuses end Stopped.
    ///
    /// Stop is resilient: per-service errors are logged, never propagated.
    #[tracing::instrument(skip(self))]
    pub async fn stop_all(&self) {
        let stops = self
            .registry
            .entries_in_order()
            .into_iter()
            .map(|(name, entry)| async move {
                if let Err(e) = launcher::stop(&entry).await {
                    tracing::error!(service = %name, "error stopping service: {}", e);
                }
            });

        futures::future::join_all(stops).await;
        tracing::info!("all services stopped");
    }

    /// Launch the liveness monitor, health monitor, and failure dispatcher.
    pub async fn start_monitoring(&self) {
        let Some(failures_rx) = self.failures_rx.lock().await.take() else {
            tracing::warn!("monitoring already started");
            return;
        };

        let ctx = self.ctx();
        let mut tasks = self.tasks.lock().await;

        tasks.push(tokio::spawn(monitor::run_liveness_loop(
            Arc::clone(&self.registry),
            self.failures_tx.clone(),
            self.config.get_liveness_interval(),
            self.cancel.child_token(),
        )));
        tasks.push(tokio::spawn(monitor::run_health_loop(
            Arc::clone(&self.registry),
            Arc::clone(&self.checkers),
            self.failures_tx.clone(),
            self.config.get_health_interval(),
            self.cancel.child_token(),
        )));
        tasks.push(tokio::spawn(run_failure_dispatch(ctx, failures_rx)));
    }

    /// Shut the supervisor down: cancel monitoring, then stop all services.
    ///
    /// Idempotent; a second call is a no-op.
    pub async fn shutdown(&self) {
        if self
            .shutdown_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("shutdown already in progress");
            return;
        }

        tracing::info!("supervisor shutting down");
        self.cancel.cancel();

        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }

        self.stop_all().await;
        tracing::info!("supervisor shutdown complete");
    }

    /// Read-only status snapshot of every service, in declared order.
    pub async fn status(&self) -> Vec<ServiceReport> {
        let mut reports = Vec::with_capacity(self.registry.len());
        for (_, entry) in self.registry.entries_in_order() {
            reports.push(entry.lock().await.report());
        }
        reports
    }
}

/// Consume failure events and apply the restart policy to each.
async fn run_failure_dispatch(ctx: RestartContext, mut rx: mpsc::UnboundedReceiver<Failure>) {
    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                tracing::debug!("failure dispatcher shutting down");
                break;
            }
            event = rx.recv() => {
                match event {
                    Some(failure) => handle_failure(&ctx, failure).await,
                    None => break,
                }
            }
        }
    }
}

/// Apply the restart policy to one failure signal.
///
/// The claim happens in a single critical section on the descriptor: the
/// failure is recorded, the status normalized to Error, and either the
/// start claim taken (Starting) or the service marked Failed. A duplicate
/// or stale signal observes an ineligible status and is dropped, which is
/// what makes restarts single-flight even when the liveness and health
/// monitors fire for the same service at the same time.
pub(crate) async fn handle_failure(ctx: &RestartContext, failure: Failure) {
    let Failure { name, error } = failure;

    let Some(entry) = ctx.registry.get(&name) else {
        tracing::error!(service = %name, "failure signal for unknown service");
        return;
    };

    let claimed = {
        let mut desc = entry.lock().await;
        let status = desc.status();

        // Health failures are reported while the service still shows
        // Running; crash signals arrive after the exit was recorded.
        let eligible = match &error {
            Error::HealthCheckFailed { .. } => status == ServiceStatus::Running,
            _ => matches!(status, ServiceStatus::Stopped | ServiceStatus::Error),
        };
        if !eligible {
            tracing::debug!(
                service = %name,
                status = %status,
                "dropping duplicate or stale failure signal"
            );
            return;
        }

        desc.record_error(&error);
        if status != ServiceStatus::Error {
            if let Err(e) = desc.transition(ServiceStatus::Error) {
                tracing::error!(service = %name, "failure bookkeeping: {}", e);
                return;
            }
        }

        match policy::next_attempt(desc.restart_count(), desc.spec().max_restarts) {
            RestartDecision::Retry { attempt } => {
                desc.set_restart_count(attempt);
                // Keep the claim through the backoff sleep
                if let Err(e) = desc.transition(ServiceStatus::Starting) {
                    tracing::error!(service = %name, "failure bookkeeping: {}", e);
                    return;
                }
                tracing::warn!(
                    service = %name,
                    attempt,
                    max = desc.spec().max_restarts,
                    "service failed ({}), scheduling restart",
                    error
                );
                true
            }
            RestartDecision::GiveUp => {
                if let Err(e) = desc.transition(ServiceStatus::Failed) {
                    tracing::error!(service = %name, "failure bookkeeping: {}", e);
                    return;
                }
                let alert = Alert::new(
                    desc.name(),
                    desc.last_error().unwrap_or("unknown error"),
                    desc.spec().port,
                    desc.restart_count(),
                );
                alert.log();
                let _ = ctx.alerts.send(alert);
                false
            }
        }
    };

    if claimed {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            match run_start_sequence(&ctx, &entry, true).await {
                Ok(()) => {}
                Err(Error::Cancelled(_)) => {}
                Err(e) => tracing::error!(service = %name, "restart sequence ended: {}", e),
            }
        });
    }
}

/// Run start attempts for a claimed descriptor until one succeeds, the
/// restart budget runs out, or the supervisor shuts down.
///
/// The descriptor must be in Starting when this is called (the claim). The
/// claim is held for the whole sequence, including backoff sleeps, so no
/// competing attempt can interleave. `delay_first` is true when the caller
/// already consumed a restart attempt (monitor-triggered restarts back off
/// before respawning, per the restart policy).
pub(crate) async fn run_start_sequence(
    ctx: &RestartContext,
    entry: &SharedDescriptor,
    delay_first: bool,
) -> Result<()> {
    let (name, port, attempts, interval, backoff, max_restarts) = {
        let desc = entry.lock().await;
        let spec = desc.spec();
        (
            spec.name.clone(),
            spec.port,
            spec.readiness_attempts,
            spec.get_readiness_interval(),
            spec.get_restart_backoff(),
            spec.max_restarts,
        )
    };

    let checker = ctx
        .checkers
        .get(&name)
        .cloned()
        .ok_or_else(|| Error::ServiceNotFound(name.clone()))?;

    let mut pending_backoff = delay_first.then_some(backoff);

    loop {
        if let Some(delay) = pending_backoff.take() {
            tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(Error::Cancelled(name)),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        // A hung-but-alive predecessor (health failure) is cleared out
        // before the replacement spawns; usually this is a no-op.
        launcher::reclaim(entry).await?;

        let attempt = async {
            launcher::spawn(entry, &ctx.failures).await?;
            probe::wait_until_ready(entry, checker.as_ref(), attempts, interval).await
        }
        .await;

        match attempt {
            Ok(()) => {
                let mut desc = entry.lock().await;
                if desc.status() != ServiceStatus::Starting {
                    // A stop raced the probe's success; leave it be.
                    return Err(Error::Cancelled(name));
                }
                desc.mark_running()?;
                tracing::info!(service = %name, port, "service started successfully");
                return Ok(());
            }
            Err(Error::Cancelled(name)) => return Err(Error::Cancelled(name)),
            Err(e) => {
                let decision = {
                    let mut desc = entry.lock().await;
                    // Spawn failures already left the descriptor in Error;
                    // anything else here means a stop raced the attempt.
                    let status = desc.status();
                    if status != ServiceStatus::Starting && status != ServiceStatus::Error {
                        return Err(Error::Cancelled(name));
                    }
                    desc.record_error(&e);
                    if status != ServiceStatus::Error {
                        desc.transition(ServiceStatus::Error)?;
                    }

                    match policy::next_attempt(desc.restart_count(), max_restarts) {
                        RestartDecision::Retry { attempt } => {
                            desc.set_restart_count(attempt);
                            desc.transition(ServiceStatus::Starting)?;
                            RestartDecision::Retry { attempt }
                        }
                        RestartDecision::GiveUp => {
                            desc.transition(ServiceStatus::Failed)?;
                            let alert = Alert::new(
                                desc.name(),
                                desc.last_error().unwrap_or("unknown error"),
                                port,
                                desc.restart_count(),
                            );
                            alert.log();
                            let _ = ctx.alerts.send(alert);
                            RestartDecision::GiveUp
                        }
                    }
                };

                match decision {
                    RestartDecision::Retry { attempt } => {
                        tracing::warn!(
                            service = %name,
                            attempt,
                            max = max_restarts,
                            "start attempt failed ({}), retrying after {:?}",
                            e,
                            backoff
                        );
                        pending_backoff = Some(backoff);
                    }
                    RestartDecision::GiveUp => {
                        return Err(Error::RestartBudgetExhausted {
                            service: name,
                            attempts: max_restarts,
                        });
                    }
                }
            }
        }
    }
}
