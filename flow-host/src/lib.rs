//! flow-host: sandboxed runtime for declarative plugin flows
//!
//! Loads plugin-authored flow graphs, validates them once against the node
//! registry and the package's grants, and runs them with a hard step
//! budget, per-trigger rate limits, a literal SSRF policy, and a redacted
//! audit trail. All host access goes through the capability traits in
//! [`capability`].

pub mod assets;
pub mod audit;
pub mod capability;
pub mod condition;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod history;
pub mod loader;
#[cfg(feature = "net")]
pub mod net;
pub mod policy;
pub mod rate_limit;
pub mod redact;
pub mod registry;
pub mod resolve;
pub mod runtime;
pub mod state;
pub mod template;
pub mod validate;

pub use assets::AssetTable;
pub use audit::{AuditError, AuditEvent, AuditEventType, AuditSink};
pub use capability::{
    CapabilityError, DurationHint, HttpResponse, Persistence, PingResult, SandboxCapability,
    UiController,
};
pub use config::{ConfigError, EngineConfig};
pub use discovery::{default_flow_dirs, DiscoveryError, DiscoveryResult, FlowScanner};
pub use engine::{FlowEngine, FlowEngineBuilder, CURRENT_SCREEN_KEY};
pub use error::{NodeError, RunError};
pub use history::RunHistory;
pub use loader::{FlowLoader, LoadedFlow, LoaderError};
#[cfg(feature = "net")]
pub use net::NetworkSandbox;
pub use policy::PolicyViolation;
pub use rate_limit::RateLimiter;
pub use redact::{FieldChange, Redactor, REDACTED};
pub use registry::{node_types, NodeRegistry};
pub use runtime::FlowRuntime;
pub use state::PluginState;
pub use validate::{ValidationIssue, ValidationReport};

pub use flow_api::{
    FlowDefinition, Grants, Item, Node, RunRecord, RunResult, SideEffect, Trigger,
    TriggerContext, TriggerType, Value,
};
