mod cli;

use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use std::path::PathBuf;
use std::sync::Arc;
use warden::config::parse_duration_string;
use warden::{Error as WardenError, Parser as ConfigParser, Supervisor};

const SAMPLE_CONFIG: &str = r#"# warden.yaml - multi-service process supervisor configuration
#
# Services start in declared order; each must pass its readiness probe
# before the next one is spawned.

startup_delay: "2s"      # delay between starting consecutive services
liveness_interval: "10s" # how often to check processes are still alive
health_interval: "30s"   # how often to call healthcheck URLs

services:
  - name: backend
    command: "node backend-server.js"
    port: 3000
    healthcheck: "http://localhost:3000/api/health"
    max_restarts: 5
    restart_backoff: "5s"
    grace_period: "5s"

  - name: bridge
    command: "node ai-bridge.js"
    port: 3001
    healthcheck: "http://localhost:3001/status"

  - name: reports
    command: "node report-service.js"
    port: 3002
    healthcheck: "http://localhost:3002/health"
"#;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(warden_error) = e.downcast_ref::<WardenError>() {
            eprintln!("Error: {}", warden_error);
            if let Some(suggestion) = warden_error.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing()?;

    // ── Commands that need no config ─────────────────────────────────
    match &cli.command {
        Commands::Init { output, force } => {
            return run_init(output.clone(), *force);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            clap_complete::generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
            return Ok(());
        }
        _ => {} // fall through to config-loading path
    }

    // ── Load config ──────────────────────────────────────────────────
    let parser = ConfigParser::new();
    let config_path = if let Some(path) = cli.config.clone() {
        path
    } else {
        parser.find_config_file()?
    };
    let config = parser.load_config(&config_path)?;

    match cli.command {
        Commands::Validate => {
            println!(
                "{} is valid ({} services)",
                config_path.display(),
                config.services.len()
            );
            Ok(())
        }
        Commands::Run { status_interval } => {
            let work_dir = resolve_work_dir(cli.workdir, &config_path)?;
            run_supervisor(config, work_dir, status_interval).await
        }
        Commands::Init { .. } | Commands::Completions { .. } => {
            unreachable!("handled in earlier dispatch tier");
        }
    }
}

async fn run_supervisor(
    config: warden::Config,
    work_dir: PathBuf,
    status_interval: Option<String>,
) -> anyhow::Result<()> {
    let supervisor = Arc::new(Supervisor::new(config, work_dir)?);

    // Surface terminal-failure alerts on stderr, beyond the log line
    let mut alerts = supervisor.subscribe_alerts();
    tokio::spawn(async move {
        while let Ok(alert) = alerts.recv().await {
            eprintln!(
                "ALERT: service '{}' (port {}) is down after {} restart attempts: {}",
                alert.service, alert.port, alert.restart_count, alert.error
            );
            eprintln!("       Recover it with a manual restart once fixed.");
        }
    });

    // Optional periodic status report
    if let Some(raw) = status_interval {
        let period = parse_duration_string(&raw).ok_or_else(|| {
            WardenError::Config(format!("invalid --status-interval '{}'", raw))
        })?;
        let status_supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // skip the immediate first tick
            loop {
                interval.tick().await;
                let reports = status_supervisor.status().await;
                match serde_json::to_string(&reports) {
                    Ok(json) => tracing::info!(status = %json, "status report"),
                    Err(e) => tracing::warn!("failed to serialize status report: {}", e),
                }
            }
        });
    }

    supervisor.start_all().await?;
    supervisor.start_monitoring().await;
    tracing::info!("all services launched, supervising");

    wait_for_termination().await?;

    supervisor.shutdown().await;
    Ok(())
}

/// Block until SIGINT or SIGTERM arrives.
async fn wait_for_termination() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down gracefully");
        }
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down gracefully");
        }
    }
    Ok(())
}

fn run_init(output: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = output.unwrap_or_else(|| PathBuf::from("warden.yaml"));
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; use --force to overwrite",
            path.display()
        );
    }
    std::fs::write(&path, SAMPLE_CONFIG)?;
    println!("Wrote sample config to {}", path.display());
    Ok(())
}

/// Resolve the work directory from CLI `--workdir` or the config file's
/// parent directory.
fn resolve_work_dir(
    workdir: Option<PathBuf>,
    config_path: &std::path::Path,
) -> anyhow::Result<PathBuf> {
    if let Some(workdir) = workdir {
        return Ok(workdir);
    }
    if let Some(parent) = config_path.parent() {
        if parent.as_os_str().is_empty() {
            Ok(std::env::current_dir()?)
        } else {
            Ok(parent.to_path_buf())
        }
    } else {
        Ok(std::env::current_dir()?)
    }
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
