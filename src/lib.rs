//! # warden
//!
//! A multi-service process supervisor for development and single-host
//! deployments.
//!
//! ## Features
//!
//! - **Ordered startup**: services start in declared order, each probed to
//!   readiness over HTTP before the next one spawns
//! - **Liveness monitoring**: a periodic check catches processes that died
//!   without a stop request
//! - **Health monitoring**: an independent periodic HTTP check catches
//!   hung-but-alive services and replaces them
//! - **Bounded restarts**: failures are retried up to a per-service budget
//!   with a fixed backoff; exhausting the budget marks the service failed
//!   and emits an alert for a human
//! - **Graceful shutdown**: SIGTERM with a per-service grace period, then
//!   SIGKILL for stragglers
//!
//! ## Quick Start
//!
//! ```no_run
//! use warden::{Parser, Supervisor};
//!
//! # async fn example() -> Result<(), warden::Error> {
//! let parser = Parser::new();
//! let config = parser.load_config("warden.yaml")?;
//!
//! let supervisor = Supervisor::new(config, std::path::PathBuf::from("."))?;
//! supervisor.start_all().await?;
//! supervisor.start_monitoring().await;
//!
//! // ... wait for a termination signal ...
//!
//! supervisor.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! The descriptor registry is fixed at construction; all runtime state
//! lives behind per-service mutexes. Monitors and restart sequences run as
//! independent tasks, but every failure funnels through one dispatcher and
//! every start attempt must claim the descriptor's status first, so at
//! most one start sequence per service is ever in flight.

pub mod config;
pub mod error;
pub mod healthcheck;
pub mod supervisor;

// Re-export commonly used types
pub use config::{Config, Parser, ServiceSpec};
pub use error::{Error, Result};
pub use supervisor::{Alert, ServiceReport, ServiceStatus, Supervisor};
