//! Shared helpers for integration tests: a minimal controllable HTTP
//! health endpoint and config construction.
#![allow(dead_code)] // each test binary uses a different subset

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A toggleable health endpoint.
///
/// Answers 200 while `healthy` is true, 503 otherwise. Runs until the test
/// process exits.
pub struct HealthEndpoint {
    pub addr: SocketAddr,
    healthy: Arc<AtomicBool>,
}

impl HealthEndpoint {
    pub async fn spawn(initially_healthy: bool) -> Self {
        let healthy = Arc::new(AtomicBool::new(initially_healthy));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind health endpoint");
        let addr = listener.local_addr().expect("local addr");

        let flag = Arc::clone(&healthy);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let flag = Arc::clone(&flag);
                tokio::spawn(async move {
                    use tokio::io::{AsyncReadExt, AsyncWriteExt};
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    let response = if flag.load(Ordering::SeqCst) {
                        "HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok"
                    } else {
                        "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    };
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self { addr, healthy }
    }

    pub fn url(&self) -> String {
        format!("http://{}/health", self.addr)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

/// Build a validated single-service config from YAML.
pub fn config_from_yaml(yaml: &str) -> warden::Config {
    let config: warden::Config = serde_yaml::from_str(yaml).expect("parse test config");
    config.validate().expect("test config should validate");
    config
}
