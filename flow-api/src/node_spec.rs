//! Node type catalog entries
//!
//! A [`NodeSpec`] describes a node type's parameters and the side effects
//! executing it may cause. Specs are static data; the host builds its
//! registry from them once at startup.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Class of effect a node may have outside the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    Storage,
    Ui,
    Messaging,
    Camera,
    Network,
}

impl SideEffect {
    pub const ALL: [SideEffect; 5] = [
        SideEffect::Storage,
        SideEffect::Ui,
        SideEffect::Messaging,
        SideEffect::Camera,
        SideEffect::Network,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SideEffect::Storage => "storage",
            SideEffect::Ui => "ui",
            SideEffect::Messaging => "messaging",
            SideEffect::Camera => "camera",
            SideEffect::Network => "network",
        }
    }
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    Any,
    String,
    Boolean,
    Long,
    Double,
    Enum,
}

/// Parameter declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamSpec {
    pub key: String,

    pub param_type: ParamType,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,

    /// Inclusive lower bound for `Long`/`Double`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    /// Inclusive upper bound for `Long`/`Double`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    /// Maximum character count for `String`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    /// Allowed values for `Enum`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
}

impl ParamSpec {
    pub fn new(key: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            key: key.into(),
            param_type,
            required: false,
            default_value: None,
            min: None,
            max: None,
            max_length: None,
            allowed_values: Vec::new(),
        }
    }

    pub fn any(key: impl Into<String>) -> Self {
        Self::new(key, ParamType::Any)
    }

    pub fn string(key: impl Into<String>) -> Self {
        Self::new(key, ParamType::String)
    }

    pub fn long(key: impl Into<String>) -> Self {
        Self::new(key, ParamType::Long)
    }

    pub fn double(key: impl Into<String>) -> Self {
        Self::new(key, ParamType::Double)
    }

    pub fn boolean(key: impl Into<String>) -> Self {
        Self::new(key, ParamType::Boolean)
    }

    pub fn one_of(key: impl Into<String>, allowed: &[&str]) -> Self {
        let mut spec = Self::new(key, ParamType::Enum);
        spec.allowed_values = allowed.iter().map(|s| s.to_string()).collect();
        spec
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }
}

/// Registry entry for one node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    #[serde(rename = "type")]
    pub node_type: String,

    pub display_name: String,

    #[serde(default)]
    pub params: Vec<ParamSpec>,

    #[serde(default)]
    pub side_effects: BTreeSet<SideEffect>,
}

impl NodeSpec {
    pub fn new(node_type: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            display_name: display_name.into(),
            params: Vec::new(),
            side_effects: BTreeSet::new(),
        }
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn effect(mut self, effect: SideEffect) -> Self {
        self.side_effects.insert(effect);
        self
    }

    /// Look up a parameter declaration
    pub fn param_spec(&self, key: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.key == key)
    }

    /// Declared default for a parameter
    pub fn default_for(&self, key: &str) -> Option<&Value> {
        self.param_spec(key).and_then(|p| p.default_value.as_ref())
    }
}
