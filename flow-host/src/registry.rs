//! Node type registry
//!
//! Static catalog of every node type the engine understands, keyed by type
//! name. Built once; lookups never mutate it.

use flow_api::{NodeSpec, ParamSpec, SideEffect, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, LazyLock};

/// Node type names handled by the engine
pub mod node_types {
    pub const IF_ELSE: &str = "IfElse";
    pub const SET_FIELD: &str = "SetField";
    pub const FILTER: &str = "Filter";
    pub const SET_STATE: &str = "SetState";
    pub const INCREMENT: &str = "Increment";
    pub const SHOW_TOAST: &str = "ShowToast";
    pub const SHOW_DIALOG: &str = "ShowDialog";
    pub const NAVIGATE: &str = "Navigate";
    pub const SHOW_IMAGE: &str = "ShowImage";
    pub const EMIT_MESSAGE: &str = "EmitMessage";
    pub const PERSIST_STATE: &str = "PersistState";
    pub const CURL: &str = "Curl";
    pub const PING: &str = "Ping";
    pub const CAPTURE_IMAGE: &str = "CaptureImage";
}

/// Comparison operators accepted by `IfElse` and `Filter`
pub const CONDITION_OPS: &[&str] = &["==", "!=", ">", ">=", "<", "<=", "contains"];

static BUILTIN: LazyLock<Arc<NodeRegistry>> = LazyLock::new(|| Arc::new(NodeRegistry::builtin()));

/// Lookup table of node specs
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    specs: HashMap<String, NodeSpec>,
}

impl NodeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared instance of the built-in catalog
    pub fn shared() -> Arc<NodeRegistry> {
        Arc::clone(&BUILTIN)
    }

    /// Registry with every built-in node type
    pub fn builtin() -> Self {
        use node_types::*;

        let duration = || ParamSpec::one_of("duration", &["short", "long"]).default("short");
        let condition = |spec: NodeSpec| {
            spec.param(ParamSpec::any("left").required())
                .param(ParamSpec::one_of("op", CONDITION_OPS).default("=="))
                .param(ParamSpec::any("right").required())
        };
        let timeout = |default: i64| {
            ParamSpec::long("timeoutMs")
                .range(250.0, 30_000.0)
                .default(default)
        };

        Self::new()
            .with_spec(condition(NodeSpec::new(IF_ELSE, "If / Else")))
            .with_spec(
                NodeSpec::new(SET_FIELD, "Set Field")
                    .param(ParamSpec::string("field").required().max_length(128))
                    .param(ParamSpec::any("value").default(Value::Null)),
            )
            .with_spec(condition(NodeSpec::new(FILTER, "Filter Items")))
            .with_spec(
                NodeSpec::new(SET_STATE, "Set State")
                    .param(ParamSpec::string("key").required().max_length(128))
                    .param(ParamSpec::any("value").default(Value::Null))
                    .effect(SideEffect::Storage),
            )
            .with_spec(
                NodeSpec::new(INCREMENT, "Increment")
                    .param(ParamSpec::string("key").required().max_length(128))
                    .param(ParamSpec::double("delta").default(1))
                    .effect(SideEffect::Storage),
            )
            .with_spec(
                NodeSpec::new(SHOW_TOAST, "Show Toast")
                    .param(ParamSpec::string("message").required().max_length(1000))
                    .param(duration())
                    .effect(SideEffect::Ui),
            )
            .with_spec(
                NodeSpec::new(SHOW_DIALOG, "Show Dialog")
                    .param(ParamSpec::string("title").default("").max_length(200))
                    .param(ParamSpec::string("message").required().max_length(4000))
                    .param(duration())
                    .effect(SideEffect::Ui),
            )
            .with_spec(
                NodeSpec::new(NAVIGATE, "Navigate")
                    .param(ParamSpec::string("screenId").required().max_length(128))
                    .effect(SideEffect::Ui),
            )
            .with_spec(
                NodeSpec::new(SHOW_IMAGE, "Show Image")
                    .param(ParamSpec::any("source").required())
                    .param(ParamSpec::string("screenId").default("image_viewer").max_length(128))
                    .effect(SideEffect::Ui),
            )
            .with_spec(
                NodeSpec::new(EMIT_MESSAGE, "Emit Message")
                    .param(ParamSpec::string("messageType").required().max_length(128))
                    .param(ParamSpec::any("payload"))
                    .effect(SideEffect::Messaging),
            )
            .with_spec(NodeSpec::new(PERSIST_STATE, "Persist State").effect(SideEffect::Storage))
            .with_spec(
                NodeSpec::new(CURL, "HTTP GET")
                    .param(ParamSpec::string("url").required().max_length(2048))
                    .param(timeout(5_000))
                    .param(
                        ParamSpec::long("maxBytes")
                            .range(1.0, 1_048_576.0)
                            .default(65_536),
                    )
                    .param(ParamSpec::string("bodyKey").default("lastCurlBody"))
                    .param(ParamSpec::string("statusKey").default("lastCurlStatus"))
                    .param(ParamSpec::string("contentTypeKey").default("lastCurlContentType"))
                    .effect(SideEffect::Network),
            )
            .with_spec(
                NodeSpec::new(PING, "TCP Ping")
                    .param(ParamSpec::string("host").required().max_length(253))
                    .param(ParamSpec::long("port").range(1.0, 65_535.0).default(443))
                    .param(timeout(2_000))
                    .param(ParamSpec::string("okKey").default("lastPingOk"))
                    .param(ParamSpec::string("latencyKey").default("lastPingLatencyMs"))
                    .effect(SideEffect::Network),
            )
            .with_spec(
                NodeSpec::new(CAPTURE_IMAGE, "Capture Image")
                    .param(ParamSpec::string("imageKey").default("lastImageBase64"))
                    .param(ParamSpec::string("statusKey").default("lastImageStatus"))
                    .effect(SideEffect::Camera),
            )
    }

    /// Add or replace a spec
    pub fn with_spec(mut self, spec: NodeSpec) -> Self {
        self.specs.insert(spec.node_type.clone(), spec);
        self
    }

    pub fn get(&self, node_type: &str) -> Option<&NodeSpec> {
        self.specs.get(node_type)
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.specs.contains_key(node_type)
    }

    /// Declared default for `key` on `node_type`
    pub fn default_for(&self, node_type: &str, key: &str) -> Option<&Value> {
        self.get(node_type).and_then(|spec| spec.default_for(key))
    }

    /// Side effects of a node type; unknown types have none
    pub fn side_effects(&self, node_type: &str) -> BTreeSet<SideEffect> {
        self.get(node_type)
            .map(|spec| spec.side_effects.clone())
            .unwrap_or_default()
    }

    /// Registered type names, sorted
    pub fn node_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.specs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
