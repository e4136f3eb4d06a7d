//! Host capabilities the engine calls on a plugin's behalf
//!
//! The engine never touches UI, network, camera, or storage directly. Each
//! concern is a trait implemented by the embedding application; the
//! transport behind it (same-process call, IPC proxy, ...) is the
//! implementor's business.

use async_trait::async_trait;
use flow_api::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Failure reported by a capability call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("destination blocked: {0}")]
    Blocked(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("capability unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Failed(String),
}

/// How long a transient UI message stays visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurationHint {
    #[default]
    Short,
    Long,
}

impl DurationHint {
    /// Parse the `duration` node param; anything but `long` is short
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("long") {
            DurationHint::Long
        } else {
            DurationHint::Short
        }
    }
}

/// UI surface of the plugin
#[async_trait]
pub trait UiController: Send + Sync {
    async fn show_toast(&self, message: &str, duration: DurationHint);

    async fn show_dialog(&self, title: &str, message: &str, duration: DurationHint);

    async fn navigate_to_screen(&self, screen_id: &str, extras: &BTreeMap<String, Value>);
}

/// Result of an HTTP GET
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub body: String,
    pub status_code: u16,
    pub content_type: String,
}

/// Result of a TCP connect-and-measure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingResult {
    pub latency_ms: u64,
}

/// Network and hardware access mediated by the sandbox
#[async_trait]
pub trait SandboxCapability: Send + Sync {
    async fn http_get(
        &self,
        url: &str,
        max_bytes: u64,
        timeout_ms: u64,
    ) -> Result<HttpResponse, CapabilityError>;

    async fn tcp_ping(
        &self,
        host: &str,
        port: u16,
        timeout_ms: u64,
    ) -> Result<PingResult, CapabilityError>;

    async fn capture_image(&self) -> Result<Vec<u8>, CapabilityError>;
}

/// Durable storage for plugin state
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn persist(&self, state: &BTreeMap<String, Value>);
}

// ============================================================================
// Default Implementations
// ============================================================================

/// UI controller that only logs
#[derive(Debug, Default)]
pub struct LoggingUi;

#[async_trait]
impl UiController for LoggingUi {
    async fn show_toast(&self, message: &str, duration: DurationHint) {
        tracing::info!(message, ?duration, "toast");
    }

    async fn show_dialog(&self, title: &str, message: &str, duration: DurationHint) {
        tracing::info!(title, message, ?duration, "dialog");
    }

    async fn navigate_to_screen(&self, screen_id: &str, extras: &BTreeMap<String, Value>) {
        tracing::info!(screen_id, extras = extras.len(), "navigate");
    }
}

/// Sandbox that refuses every request
#[derive(Debug, Default)]
pub struct DeniedSandbox;

#[async_trait]
impl SandboxCapability for DeniedSandbox {
    async fn http_get(&self, _: &str, _: u64, _: u64) -> Result<HttpResponse, CapabilityError> {
        Err(CapabilityError::Unavailable("network".into()))
    }

    async fn tcp_ping(&self, _: &str, _: u16, _: u64) -> Result<PingResult, CapabilityError> {
        Err(CapabilityError::Unavailable("network".into()))
    }

    async fn capture_image(&self) -> Result<Vec<u8>, CapabilityError> {
        Err(CapabilityError::Unavailable("camera".into()))
    }
}

/// Persistence that drops snapshots
#[derive(Debug, Default)]
pub struct NullPersistence;

#[async_trait]
impl Persistence for NullPersistence {
    async fn persist(&self, _state: &BTreeMap<String, Value>) {}
}
