//! Process launching, exit watching, and termination.
//!
//! Each spawned service runs under `/bin/bash -c` in its own process group
//! so that termination signals reach the whole tree. A detached exit
//! watcher task owns the `Child` and wires the exit status back into the
//! descriptor; handle generations keep watchers from superseded processes
//! from touching current state.

use super::descriptor::{ServiceStatus, SharedDescriptor};
use super::policy::Failure;
use crate::error::{validate_pid, Error, Result};
use nix::sys::signal::{self, killpg, Signal};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// How often the stop path polls for process exit during the grace period.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Spawn a service whose descriptor has been claimed for starting.
///
/// On success the descriptor owns the new process handle and a watcher
/// task is observing its exit; the status stays Starting until the
/// readiness probe decides otherwise. On spawn failure the descriptor
/// transitions to Error.
///
/// Never blocks on readiness.
pub(crate) async fn spawn(
    entry: &SharedDescriptor,
    failures: &mpsc::UnboundedSender<Failure>,
) -> Result<()> {
    let (name, command, work_dir, environment) = {
        let desc = entry.lock().await;
        if desc.status() != ServiceStatus::Starting {
            // The claim was revoked (e.g. a stop arrived during backoff)
            return Err(Error::Cancelled(desc.name().to_string()));
        }
        let spec = desc.spec();
        (
            spec.name.clone(),
            spec.command.clone(),
            resolve_work_dir(desc.work_dir(), spec.cwd.as_deref()),
            spec.environment.clone(),
        )
    };

    tracing::info!(service = %name, command = %command, "spawning service");

    // No `exec` wrapper: commands may be multi-statement scripts, and the
    // process group lets signals reach the whole tree either way.
    let mut cmd = Command::new("/bin/bash");
    cmd.arg("-c")
        .arg(&command)
        .current_dir(&work_dir)
        .envs(&environment)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(false)
        .process_group(0); // Own process group for whole-tree signaling

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::error!(
                service = %name,
                work_dir = %work_dir.display(),
                "failed to spawn service: {}",
                e
            );
            let mut desc = entry.lock().await;
            desc.record_error(&e);
            desc.transition(ServiceStatus::Error)?;
            return Err(Error::SpawnFailed {
                service: name,
                reason: e.to_string(),
            });
        }
    };

    let pid = child.id().unwrap_or_default();
    let generation = {
        let mut desc = entry.lock().await;
        desc.install_handle(pid)
    };

    tracing::debug!(service = %name, pid, "service process spawned");

    tokio::spawn(watch_exit(
        entry.clone(),
        name,
        generation,
        child,
        failures.clone(),
    ));

    Ok(())
}

/// Wait for the child to exit and wire the outcome back to the descriptor.
///
/// Exits while Stopping are expected. Unexpected exits while Running are
/// failure signals routed to the restart policy (clean exit-0 is logged
/// but not retried, matching the managed-service contract). Exits while
/// Starting are recorded for the in-flight readiness probe to find.
async fn watch_exit(
    entry: SharedDescriptor,
    name: String,
    generation: u64,
    mut child: Child,
    failures: mpsc::UnboundedSender<Failure>,
) {
    let exit = child.wait().await;
    let detail = match &exit {
        Ok(status) => describe_exit(status),
        Err(e) => format!("wait failed: {}", e),
    };

    let mut desc = entry.lock().await;
    if !desc.watcher_current(generation) {
        // A stop or restart already reclaimed this process; nothing to do.
        return;
    }
    desc.take_handle();

    match desc.status() {
        ServiceStatus::Stopping => {
            tracing::info!(service = %name, exit = %detail, "service exited after stop request");
            let _ = desc.transition(ServiceStatus::Stopped);
        }
        ServiceStatus::Running => {
            if desc.transition(ServiceStatus::Stopped).is_err() {
                return;
            }
            let clean = matches!(&exit, Ok(status) if status.success());
            if clean {
                tracing::info!(service = %name, "service exited cleanly outside a stop request");
            } else {
                desc.record_error(&detail);
                tracing::warn!(service = %name, exit = %detail, "service died unexpectedly");
                let _ = failures.send(Failure {
                    name: name.clone(),
                    error: Error::Crashed {
                        service: name,
                        detail,
                    },
                });
            }
        }
        ServiceStatus::Starting => {
            // The start sequence owns failure handling; the probe notices
            // the cleared handle on its next poll.
            desc.record_error(&detail);
        }
        _ => {}
    }
}

/// Stop a service's process and settle its status on Stopped.
///
/// Sends SIGTERM to the process group, waits out the configured grace
/// period, then SIGKILLs stragglers. Safe to call for descriptors without
/// a live process (Error/Failed); those just settle to Stopped.
pub(crate) async fn stop(entry: &SharedDescriptor) -> Result<()> {
    let (name, pid, grace) = {
        let mut desc = entry.lock().await;
        if desc.status() == ServiceStatus::Stopped {
            return Ok(());
        }
        if matches!(
            desc.status(),
            ServiceStatus::Starting | ServiceStatus::Running
        ) {
            desc.transition(ServiceStatus::Stopping)?;
        }
        (
            desc.name().to_string(),
            desc.take_handle().map(|h| h.pid),
            desc.spec().get_grace_period(),
        )
    };

    if let Some(pid) = pid {
        terminate_pid(pid, &name, grace).await?;
    }

    let mut desc = entry.lock().await;
    match desc.status() {
        ServiceStatus::Stopped => {}
        // A restart claim slipped in while we were waiting out the grace
        // period; route it through Stopping so the state machine holds.
        ServiceStatus::Starting | ServiceStatus::Running => {
            desc.transition(ServiceStatus::Stopping)?;
            desc.transition(ServiceStatus::Stopped)?;
        }
        _ => {
            desc.transition(ServiceStatus::Stopped)?;
        }
    }
    Ok(())
}

/// Kill any process the descriptor still owns without touching its status.
///
/// Used by the restart sequence before respawning: the descriptor keeps its
/// Starting claim while a hung-but-alive predecessor is cleared out, so the
/// one-live-process invariant holds across the replacement.
pub(crate) async fn reclaim(entry: &SharedDescriptor) -> Result<()> {
    let (name, pid, grace) = {
        let mut desc = entry.lock().await;
        (
            desc.name().to_string(),
            desc.take_handle().map(|h| h.pid),
            desc.spec().get_grace_period(),
        )
    };

    if let Some(pid) = pid {
        tracing::debug!(service = %name, pid, "reclaiming previous process before restart");
        terminate_pid(pid, &name, grace).await?;
    }
    Ok(())
}

/// SIGTERM the process group, poll for exit until the grace period runs
/// out, then SIGKILL whatever is left.
async fn terminate_pid(pid_raw: u32, name: &str, grace: Duration) -> Result<()> {
    let pid = validate_pid(pid_raw, name)?;

    // Signal the whole group; fall back to the single process if the group
    // is already gone.
    let term = killpg(pid, Signal::SIGTERM).or_else(|_| signal::kill(pid, Signal::SIGTERM));
    if term.is_err() {
        tracing::debug!(service = %name, pid = pid_raw, "process already gone before SIGTERM");
        return Ok(());
    }

    let polls = (grace.as_millis() / EXIT_POLL_INTERVAL.as_millis()).max(1) as u64;
    for _ in 0..polls {
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        if signal::kill(pid, None).is_err() {
            tracing::debug!(service = %name, pid = pid_raw, "process exited within grace period");
            return Ok(());
        }
    }

    tracing::warn!(
        service = %name,
        pid = pid_raw,
        grace = ?grace,
        "process did not exit after SIGTERM, sending SIGKILL"
    );
    let _ = killpg(pid, Signal::SIGKILL).or_else(|_| signal::kill(pid, Signal::SIGKILL));
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(())
}

fn resolve_work_dir(base: &Path, cwd: Option<&str>) -> PathBuf {
    match cwd {
        Some(dir) => {
            let path = Path::new(dir);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                base.join(dir)
            }
        }
        None => base.to_path_buf(),
    }
}

fn describe_exit(status: &std::process::ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exited with code {}", code),
        (None, Some(sig)) => format!("terminated by signal {}", sig),
        (None, None) => "exited with unknown status".to_string(),
    }
}
