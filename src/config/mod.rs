//! Configuration parsing and types.
//!
//! - `types` - Top-level `Config` (ordered service list, monitor intervals)
//! - `service` - Per-service configuration (`ServiceSpec`)
//! - `duration` - Human-readable duration strings
//! - `parser` - YAML loading and validation

mod duration;
mod parser;
mod service;
mod types;

pub use duration::*;
pub use parser::*;
pub use service::*;
pub use types::*;
