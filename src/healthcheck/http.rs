use super::HealthChecker;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;

/// Global shared HTTP client for health checks.
///
/// Using a shared client prevents file descriptor exhaustion when
/// supervising many services. The client maintains a connection pool that
/// is reused across all checkers; individual requests override the long
/// fallback timeout with their own.
static SHARED_HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

fn get_shared_client() -> &'static Client {
    SHARED_HTTP_CLIENT.get_or_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .build()
            .expect("Failed to create shared HTTP client")
    })
}

/// HTTP-based health checker.
///
/// Any 2xx response counts as healthy; a non-2xx status, a timeout, or a
/// connection error counts as unhealthy. Network failures are reported as
/// `Ok(false)` rather than errors so callers treat "unreachable" and
/// "unhealthy" identically.
pub struct HttpChecker {
    url: String,
    client: Client,
    timeout: Duration,
}

impl HttpChecker {
    /// Create a checker for the given URL using the shared client.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed or uses a scheme other
    /// than http/https.
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        Self::validate_url(&url)?;

        Ok(Self {
            url,
            client: get_shared_client().clone(),
            timeout,
        })
    }

    fn validate_url(url: &str) -> Result<()> {
        match url::Url::parse(url) {
            Ok(parsed) => {
                let scheme = parsed.scheme();
                if scheme != "http" && scheme != "https" {
                    return Err(Error::Config(format!(
                        "Invalid healthcheck URL '{}': scheme must be http or https, got '{}'",
                        url, scheme
                    )));
                }
                Ok(())
            }
            Err(e) => Err(Error::Config(format!(
                "Invalid healthcheck URL '{}': {}",
                url, e
            ))),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthChecker for HttpChecker {
    async fn check(&self) -> Result<bool> {
        // Per-request timeout overrides the shared client's fallback.
        match self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
