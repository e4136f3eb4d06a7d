//! reqwest/tokio implementation of the sandbox capability
//!
//! Hostnames are resolved before connecting and every resolved address is
//! checked against the private/loopback blocklist. HTTP requests are then
//! pinned to the checked addresses so a second lookup cannot rebind them.

use crate::capability::{CapabilityError, HttpResponse, PingResult, SandboxCapability};
use crate::config::NetworkConfig;
use crate::policy::is_blocked_ip;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use url::Url;

/// Network access for flow nodes
#[derive(Debug, Clone, Default)]
pub struct NetworkSandbox {
    config: NetworkConfig,
}

impl NetworkSandbox {
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Resolve `host`, rejecting it if any address is blocked
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, CapabilityError> {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| CapabilityError::Network(format!("resolve {}: {}", host, e)))?
            .collect();

        if addrs.is_empty() {
            return Err(CapabilityError::Network(format!("no addresses for {}", host)));
        }
        if self.config.resolve_before_connect {
            if let Some(blocked) = addrs.iter().find(|a| is_blocked_ip(&a.ip())) {
                tracing::warn!(host, addr = %blocked.ip(), "Resolved address blocked");
                return Err(CapabilityError::Blocked(format!(
                    "{} resolves to {}",
                    host,
                    blocked.ip()
                )));
            }
        }
        Ok(addrs)
    }

    fn client(&self, host: &str, addrs: &[SocketAddr], timeout: Duration) -> Result<reqwest::Client, CapabilityError> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout);
        if self.config.resolve_before_connect {
            builder = builder.resolve_to_addrs(host, addrs);
        }
        builder
            .build()
            .map_err(|e| CapabilityError::Network(e.to_string()))
    }

    async fn fetch(&self, url: &str, max_bytes: u64, timeout: Duration) -> Result<HttpResponse, CapabilityError> {
        let parsed = Url::parse(url).map_err(|e| CapabilityError::Failed(e.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| CapabilityError::Failed("missing host".into()))?
            .to_string();
        let port = parsed.port_or_known_default().unwrap_or(443);
        let addrs = self.resolve(&host, port).await?;

        let client = self.client(&host, &addrs, timeout)?;
        let mut response = client
            .get(parsed)
            .send()
            .await
            .map_err(|e| CapabilityError::Network(e.to_string()))?;

        let status_code = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let limit = usize::try_from(max_bytes).unwrap_or(usize::MAX);
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| CapabilityError::Network(e.to_string()))?
        {
            let room = limit - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(HttpResponse {
            body: String::from_utf8_lossy(&body).into_owned(),
            status_code,
            content_type,
        })
    }
}

#[async_trait]
impl SandboxCapability for NetworkSandbox {
    async fn http_get(
        &self,
        url: &str,
        max_bytes: u64,
        timeout_ms: u64,
    ) -> Result<HttpResponse, CapabilityError> {
        let timeout = Duration::from_millis(timeout_ms);
        tokio::time::timeout(timeout, self.fetch(url, max_bytes, timeout))
            .await
            .map_err(|_| CapabilityError::Timeout(timeout_ms))?
    }

    async fn tcp_ping(
        &self,
        host: &str,
        port: u16,
        timeout_ms: u64,
    ) -> Result<PingResult, CapabilityError> {
        let timeout = Duration::from_millis(timeout_ms);
        let addrs = tokio::time::timeout(timeout, self.resolve(host, port))
            .await
            .map_err(|_| CapabilityError::Timeout(timeout_ms))??;

        let started = Instant::now();
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addrs[..]))
            .await
            .map_err(|_| CapabilityError::Timeout(timeout_ms))?
            .map_err(|e| CapabilityError::Network(e.to_string()))?;
        let latency_ms = started.elapsed().as_millis() as u64;
        drop(stream);

        tracing::debug!(host, port, latency_ms, "TCP ping succeeded");
        Ok(PingResult { latency_ms })
    }

    async fn capture_image(&self) -> Result<Vec<u8>, CapabilityError> {
        Err(CapabilityError::Unavailable("camera".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolved_loopback_blocked() {
        let sandbox = NetworkSandbox::default();
        let err = sandbox.tcp_ping("localhost", 80, 1_000).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Blocked(_)));

        let err = sandbox
            .http_get("https://localhost/", 1_024, 1_000)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Blocked(_)));
    }

    #[tokio::test]
    async fn test_ping_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let sandbox = NetworkSandbox::new(NetworkConfig {
            resolve_before_connect: false,
            ..NetworkConfig::default()
        });

        let result = sandbox.tcp_ping("127.0.0.1", port, 2_000).await.unwrap();
        assert!(result.latency_ms < 2_000);
    }

    #[tokio::test]
    async fn test_camera_unavailable() {
        let sandbox = NetworkSandbox::default();
        assert!(matches!(
            sandbox.capture_image().await,
            Err(CapabilityError::Unavailable(_))
        ));
    }
}
