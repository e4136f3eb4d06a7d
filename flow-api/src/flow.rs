//! Flow graph definitions
//!
//! A flow is an immutable node graph plus the triggers that enter it.
//! Definitions are deserialized from plugin-authored JSON and never
//! mutated after validation.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A plugin-authored workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDefinition {
    /// Flow identifier, unique within a plugin
    pub flow_id: String,

    /// Entry points, in declaration order
    #[serde(default)]
    pub triggers: Vec<Trigger>,

    /// Graph nodes, in declaration order
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl FlowDefinition {
    /// Create an empty flow
    pub fn new(flow_id: impl Into<String>) -> Self {
        Self {
            flow_id: flow_id.into(),
            triggers: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Add a trigger
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Add a node
    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Index nodes by id. Later duplicates shadow earlier ones.
    pub fn node_map(&self) -> HashMap<&str, &Node> {
        self.nodes.iter().map(|n| (n.id.as_str(), n)).collect()
    }

    /// Stable content digest of the definition
    pub fn compute_hash(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }
}

/// Kind of external event that starts a run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerType {
    /// A UI element was activated
    OnClick,
    /// A plugin screen was opened
    OnLoad,
    /// Periodic timer tick
    OnTimer,
    /// Inbound message from another plugin or the host
    OnMessage,
    /// Any other UI-originated trigger name
    Other(String),
}

impl TriggerType {
    pub fn as_str(&self) -> &str {
        match self {
            TriggerType::OnClick => "OnClick",
            TriggerType::OnLoad => "OnLoad",
            TriggerType::OnTimer => "OnTimer",
            TriggerType::OnMessage => "OnMessage",
            TriggerType::Other(name) => name,
        }
    }
}

impl From<String> for TriggerType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "OnClick" => TriggerType::OnClick,
            "OnLoad" => TriggerType::OnLoad,
            "OnTimer" => TriggerType::OnTimer,
            "OnMessage" => TriggerType::OnMessage,
            _ => TriggerType::Other(s),
        }
    }
}

impl From<&str> for TriggerType {
    fn from(s: &str) -> Self {
        TriggerType::from(s.to_string())
    }
}

impl From<TriggerType> for String {
    fn from(t: TriggerType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry point into a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,

    /// UI element selector for UI triggers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,

    /// Message type selector for `OnMessage`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,

    /// First node visited by a run
    pub start_node_id: String,
}

impl Trigger {
    pub fn new(trigger_type: impl Into<TriggerType>, start_node_id: impl Into<String>) -> Self {
        Self {
            trigger_type: trigger_type.into(),
            target_id: None,
            message_type: None,
            start_node_id: start_node_id.into(),
        }
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }
}

/// One step of a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,

    #[serde(rename = "type")]
    pub node_type: String,

    #[serde(default)]
    pub params: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_true: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_false: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            params: BTreeMap::new(),
            next: None,
            next_true: None,
            next_false: None,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn next(mut self, id: impl Into<String>) -> Self {
        self.next = Some(id.into());
        self
    }

    pub fn branches(mut self, on_true: impl Into<String>, on_false: impl Into<String>) -> Self {
        self.next_true = Some(on_true.into());
        self.next_false = Some(on_false.into());
        self
    }

    /// All non-blank successor references
    pub fn successors(&self) -> impl Iterator<Item = &str> {
        [&self.next, &self.next_true, &self.next_false]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .filter(|id| !id.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_from_json() {
        let json = r#"{
            "flowId": "greet",
            "triggers": [{"type": "OnClick", "targetId": "btn", "startNodeId": "a"}],
            "nodes": [
                {"id": "a", "type": "IfElse", "params": {"left": "state.x", "right": 5},
                 "nextTrue": "b", "nextFalse": "c"},
                {"id": "b", "type": "ShowToast", "params": {"message": "hi"}},
                {"id": "c", "type": "Mystery"}
            ]
        }"#;

        let flow: FlowDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(flow.flow_id, "greet");
        assert_eq!(flow.triggers[0].trigger_type, TriggerType::OnClick);
        assert_eq!(flow.triggers[0].target_id.as_deref(), Some("btn"));
        assert_eq!(flow.nodes[0].successors().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(flow.nodes[0].params["right"], Value::Number(5.0));
        assert!(flow.nodes[2].params.is_empty());
    }

    #[test]
    fn test_trigger_type_names() {
        assert_eq!(TriggerType::from("OnTimer"), TriggerType::OnTimer);
        assert_eq!(
            TriggerType::from("OnSwipe"),
            TriggerType::Other("OnSwipe".into())
        );
        assert_eq!(TriggerType::Other("OnSwipe".into()).to_string(), "OnSwipe");
    }

    #[test]
    fn test_hash_is_stable() {
        let flow = FlowDefinition::new("f").node(Node::new("a", "EmitMessage"));
        assert_eq!(flow.compute_hash(), flow.clone().compute_hash());
        let other = FlowDefinition::new("g").node(Node::new("a", "EmitMessage"));
        assert_ne!(flow.compute_hash(), other.compute_hash());
    }
}
