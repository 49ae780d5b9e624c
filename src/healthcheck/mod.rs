//! Health probing for managed services.
//!
//! Readiness (during startup) and ongoing health (while running) both go
//! through the same [`HealthChecker`] seam; the production implementation
//! is an HTTP GET against the service's configured healthcheck URL.

mod http;

pub use http::HttpChecker;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Health checker trait for services
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Check if the service is healthy
    async fn check(&self) -> Result<bool>;

    /// Get the timeout duration
    fn timeout(&self) -> Duration;
}
