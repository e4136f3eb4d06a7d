//! Flow loading and activation checks
//!
//! A flow is parsed and validated exactly once, here. Only a
//! [`LoadedFlow`] reaches the engine.

use crate::audit::{self, AuditSink, NullAuditSink};
use crate::registry::NodeRegistry;
use crate::validate::{validate_flow, ValidationIssue};
use flow_api::{FlowDefinition, Grants};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while loading a flow
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Failed to read flow file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse flow: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Flow '{flow_id}' failed validation: {}", summarize(.errors))]
    Invalid {
        flow_id: String,
        errors: Vec<ValidationIssue>,
    },
}

fn summarize(errors: &[ValidationIssue]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A validated flow ready for execution
#[derive(Debug, Clone)]
pub struct LoadedFlow {
    pub definition: FlowDefinition,
    pub grants: Grants,
    /// Non-fatal findings
    pub warnings: Vec<ValidationIssue>,
    /// Content digest of the definition
    pub hash: String,
}

impl LoadedFlow {
    pub fn flow_id(&self) -> &str {
        &self.definition.flow_id
    }
}

/// Parses and validates flow definitions
pub struct FlowLoader {
    registry: Arc<NodeRegistry>,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for FlowLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowLoader")
            .field("node_types", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Default for FlowLoader {
    fn default() -> Self {
        Self::new(NodeRegistry::shared())
    }
}

impl FlowLoader {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            audit: Arc::new(NullAuditSink),
        }
    }

    /// Record `flow_loaded` events to `audit`
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Parse JSON bytes and validate the result
    pub fn load(&self, bytes: &[u8], grants: &Grants) -> Result<LoadedFlow, LoaderError> {
        let definition: FlowDefinition = serde_json::from_slice(bytes)?;
        self.load_definition(definition, grants)
    }

    /// Read and load a flow file
    pub fn load_file(&self, path: impl AsRef<Path>, grants: &Grants) -> Result<LoadedFlow, LoaderError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| LoaderError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.load(&bytes, grants)
    }

    /// Validate an already-parsed definition
    pub fn load_definition(
        &self,
        definition: FlowDefinition,
        grants: &Grants,
    ) -> Result<LoadedFlow, LoaderError> {
        let report = validate_flow(&self.registry, &definition, grants);
        if !report.is_ok() {
            tracing::warn!(
                flow_id = %definition.flow_id,
                errors = report.errors.len(),
                "Flow rejected"
            );
            return Err(LoaderError::Invalid {
                flow_id: definition.flow_id,
                errors: report.errors,
            });
        }

        for warning in &report.warnings {
            tracing::warn!(flow_id = %definition.flow_id, "{}", warning);
        }

        let hash = definition.compute_hash();
        tracing::info!(
            flow_id = %definition.flow_id,
            nodes = definition.nodes.len(),
            triggers = definition.triggers.len(),
            hash = %hash,
            "Flow loaded"
        );

        let event = audit::flow_loaded(&definition.flow_id, &hash, grants, report.warnings.len());
        if let Err(e) = self.audit.record(event) {
            tracing::warn!(error = %e, "Failed to record audit event");
        }

        Ok(LoadedFlow {
            definition,
            grants: grants.clone(),
            warnings: report.warnings,
            hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditEventType, MemoryAuditSink};
    use flow_api::SideEffect;

    const TOAST_FLOW: &str = r#"{
        "flowId": "hello",
        "triggers": [{"type": "OnClick", "targetId": "btn", "startNodeId": "a"}],
        "nodes": [{"id": "a", "type": "ShowToast", "params": {"message": "hi", "colour": "red"}}]
    }"#;

    #[test]
    fn test_load_valid_flow() {
        let sink = Arc::new(MemoryAuditSink::new());
        let loader = FlowLoader::default().with_audit(sink.clone());

        let loaded = loader.load(TOAST_FLOW.as_bytes(), &Grants::all()).unwrap();
        assert_eq!(loaded.flow_id(), "hello");
        assert_eq!(loaded.warnings.len(), 1);
        assert_eq!(loaded.hash, loaded.definition.compute_hash());
        assert_eq!(sink.find_by_type(AuditEventType::FlowLoaded).len(), 1);
    }

    #[test]
    fn test_missing_grant_blocks_activation() {
        let loader = FlowLoader::default();
        let err = loader
            .load(TOAST_FLOW.as_bytes(), &Grants::none().with(SideEffect::Storage))
            .unwrap_err();
        match err {
            LoaderError::Invalid { flow_id, errors } => {
                assert_eq!(flow_id, "hello");
                assert_eq!(errors.len(), 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_error() {
        let loader = FlowLoader::default();
        assert!(matches!(
            loader.load(b"{\"flowId\": ", &Grants::all()),
            Err(LoaderError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let loader = FlowLoader::default();
        assert!(matches!(
            loader.load_file("/nonexistent/x.flow.json", &Grants::all()),
            Err(LoaderError::Read { .. })
        ));
    }
}
