use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Multi-service process supervisor with health-gated startup")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults to warden.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Working directory for services
    #[arg(short, long)]
    pub workdir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start all services and supervise them until SIGINT/SIGTERM
    Run {
        /// Periodically log a status report (e.g. "30s")
        #[arg(long, value_name = "DURATION")]
        status_interval: Option<String>,
    },
    /// Validate the configuration and exit
    Validate,
    /// Write a sample warden.yaml
    Init {
        /// Output path (defaults to ./warden.yaml)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}
