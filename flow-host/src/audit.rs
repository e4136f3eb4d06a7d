//! Audit trail for flow activity
//!
//! Trait-based so the embedding application decides where events go.
//! A failing sink never fails a run: the engine logs the error and moves on.

use crate::redact::FieldChange;
use flow_api::{Grants, RunResult, TriggerType};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

/// RFC 3339 timestamp
pub type Timestamp = String;

fn now_rfc3339() -> Timestamp {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// One audited occurrence
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: Timestamp,
    pub event_type: AuditEventType,
    pub flow_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    pub details: AuditDetails,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, flow_id: impl Into<String>, details: AuditDetails) -> Self {
        Self {
            timestamp: now_rfc3339(),
            event_type,
            flow_id: flow_id.into(),
            trigger: None,
            details,
        }
    }

    pub fn with_trigger(mut self, trigger: &TriggerType) -> Self {
        self.trigger = Some(trigger.to_string());
        self
    }
}

/// Type of audit event
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A flow passed validation and was activated
    FlowLoaded,
    /// A run finished with `ok = true`
    RunCompleted,
    /// A run aborted
    RunFailed,
    /// A run was refused admission
    RateLimited,
    /// One node was dispatched
    NodeTrace,
    /// A network destination was refused by policy
    PolicyBlocked,
    /// A host capability was invoked
    CapabilityUsed,
}

/// Event payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AuditDetails {
    Load {
        flow_hash: String,
        grants_hash: String,
        warnings: usize,
    },
    Run {
        steps: u32,
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Admission {
        key: String,
    },
    NodeTrace {
        node_id: String,
        node_type: String,
        state_changes: Vec<FieldChange>,
        item_changes: Vec<FieldChange>,
    },
    Policy {
        node_id: String,
        destination: String,
        reason: String,
    },
    Capability {
        node_id: String,
        capability: String,
        outcome: String,
    },
}

/// Error type for audit operations
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Failed to write audit log: {0}")]
    WriteError(#[from] std::io::Error),

    #[error("Failed to serialize audit event: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Audit sink not available: {0}")]
    Unavailable(String),
}

/// Destination for audit events
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError>;

    fn flush(&self) -> Result<(), AuditError>;

    fn is_healthy(&self) -> bool {
        true
    }
}

impl<S: AuditSink + ?Sized> AuditSink for Arc<S> {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        (**self).record(event)
    }

    fn flush(&self) -> Result<(), AuditError> {
        (**self).flush()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }
}

// ============================================================================
// Default Implementations
// ============================================================================

/// Audit sink writing JSON Lines to a file
pub struct FileAuditSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileAuditSink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let json = serde_json::to_string(&event)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{}", json)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), AuditError> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()?;
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.path.parent().map(|p| p.exists()).unwrap_or(true)
    }
}

impl fmt::Debug for FileAuditSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileAuditSink")
            .field("path", &self.path)
            .finish()
    }
}

/// Bounded in-memory sink, oldest events evicted first
pub struct MemoryAuditSink {
    events: RwLock<VecDeque<AuditEvent>>,
    max_events: usize,
}

impl MemoryAuditSink {
    /// Capacity of 1000 events
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(max_events.min(1000))),
            max_events: max_events.max(1),
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn find_by_type(&self, event_type: AuditEventType) -> Vec<AuditEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn find_by_flow(&self, flow_id: &str) -> Vec<AuditEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.flow_id == flow_id)
            .cloned()
            .collect()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }

    fn flush(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

impl fmt::Debug for MemoryAuditSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryAuditSink")
            .field("count", &self.count())
            .field("max_events", &self.max_events)
            .finish()
    }
}

/// Discards all events
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl NullAuditSink {
    pub fn new() -> Self {
        Self
    }
}

impl AuditSink for NullAuditSink {
    fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }

    fn flush(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Fans events out to several sinks
///
/// Every sink sees every event; the first error is returned after all
/// sinks were tried.
pub struct CompositeAuditSink {
    sinks: Vec<Box<dyn AuditSink>>,
}

impl CompositeAuditSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with_sink(mut self, sink: impl AuditSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Default for CompositeAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for CompositeAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(event.clone()) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn flush(&self) -> Result<(), AuditError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.flush() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn is_healthy(&self) -> bool {
        self.sinks.iter().all(|s| s.is_healthy())
    }
}

impl fmt::Debug for CompositeAuditSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeAuditSink")
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Event for a flow that passed load-time validation
pub fn flow_loaded(flow_id: &str, flow_hash: &str, grants: &Grants, warnings: usize) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::FlowLoaded,
        flow_id,
        AuditDetails::Load {
            flow_hash: flow_hash.to_string(),
            grants_hash: grants.compute_hash(),
            warnings,
        },
    )
}

/// Completion event for a run
pub fn run_finished(result: &RunResult) -> AuditEvent {
    let event_type = if result.ok {
        AuditEventType::RunCompleted
    } else {
        AuditEventType::RunFailed
    };
    AuditEvent::new(
        event_type,
        &result.flow_id,
        AuditDetails::Run {
            steps: result.steps,
            duration_ms: result.duration_ms,
            error: result.error.clone(),
        },
    )
    .with_trigger(&result.trigger_type)
}

/// Event for a run refused by the rate limiter
pub fn rate_limited(flow_id: &str, trigger: &TriggerType, key: &str) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::RateLimited,
        flow_id,
        AuditDetails::Admission {
            key: key.to_string(),
        },
    )
    .with_trigger(trigger)
}

/// Event for a destination refused by the URL/host policy
pub fn policy_blocked(flow_id: &str, node_id: &str, destination: &str, reason: &str) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::PolicyBlocked,
        flow_id,
        AuditDetails::Policy {
            node_id: node_id.to_string(),
            destination: destination.to_string(),
            reason: reason.to_string(),
        },
    )
}

/// Event for a capability call and its outcome
pub fn capability_used(flow_id: &str, node_id: &str, capability: &str, outcome: &str) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::CapabilityUsed,
        flow_id,
        AuditDetails::Capability {
            node_id: node_id.to_string(),
            capability: capability.to_string(),
            outcome: outcome.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(ok: bool) -> RunResult {
        RunResult {
            ok,
            flow_id: "f".into(),
            trigger_type: TriggerType::OnClick,
            steps: 3,
            duration_ms: 1,
            error: (!ok).then(|| "node_failed".to_string()),
            items: Vec::new(),
        }
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemoryAuditSink::new();
        sink.record(flow_loaded("flow-a", "abc", &Grants::all(), 0))
            .unwrap();

        assert_eq!(sink.count(), 1);
        let events = sink.find_by_type(AuditEventType::FlowLoaded);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].flow_id, "flow-a");
    }

    #[test]
    fn test_memory_sink_eviction() {
        let sink = MemoryAuditSink::with_capacity(2);
        for i in 0..3 {
            sink.record(rate_limited(&format!("flow-{}", i), &TriggerType::OnTimer, "k"))
                .unwrap();
        }

        assert_eq!(sink.count(), 2);
        let events = sink.events();
        assert_eq!(events[0].flow_id, "flow-1");
        assert_eq!(events[1].flow_id, "flow-2");
    }

    #[test]
    fn test_run_event_type() {
        assert_eq!(run_finished(&result(true)).event_type, AuditEventType::RunCompleted);
        assert_eq!(run_finished(&result(false)).event_type, AuditEventType::RunFailed);
    }

    #[test]
    fn test_composite_sink() {
        let a = Arc::new(MemoryAuditSink::new());
        let b = Arc::new(MemoryAuditSink::new());
        let composite = CompositeAuditSink::new()
            .with_sink(Arc::clone(&a))
            .with_sink(Arc::clone(&b))
            .with_sink(NullAuditSink::new());

        composite.record(run_finished(&result(true))).unwrap();
        composite.flush().unwrap();

        assert_eq!(composite.len(), 3);
        assert_eq!(a.count(), 1);
        assert_eq!(b.count(), 1);
    }

    #[test]
    fn test_event_serialization() {
        let event = run_finished(&result(false));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"run_failed\""));
        assert!(json.contains("\"trigger\":\"OnClick\""));
        assert!(json.contains("node_failed"));
        assert!(chrono::DateTime::parse_from_rfc3339(&event.timestamp).is_ok());
    }

    #[test]
    fn test_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.jsonl");

        let sink = FileAuditSink::new(&path).unwrap();
        sink.record(policy_blocked("f", "n1", "https://10.0.0.1", "private_ipv4_blocked"))
            .unwrap();
        sink.record(capability_used("f", "n2", "tcp_ping", "ok"))
            .unwrap();
        sink.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("policy_blocked"));
        assert!(content.contains("capability_used"));
    }
}
