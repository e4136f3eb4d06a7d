//! Per-run context and run outcomes

use crate::flow::TriggerType;
use crate::value::{Item, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Execution state owned by a single run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerContext {
    /// Id of the UI element that fired the trigger
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_target_id: Option<String>,

    /// Payload attached to the trigger
    #[serde(default)]
    pub action_data: BTreeMap<String, Value>,

    /// Working rows transformed by dataflow nodes
    #[serde(default = "default_items")]
    pub items: Vec<Item>,
}

fn default_items() -> Vec<Item> {
    vec![Item::new()]
}

impl Default for TriggerContext {
    fn default() -> Self {
        Self {
            action_target_id: None,
            action_data: BTreeMap::new(),
            items: default_items(),
        }
    }
}

impl TriggerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.action_target_id = Some(target_id.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.action_data.insert(key.into(), value.into());
        self
    }

    pub fn with_items(mut self, items: Vec<Item>) -> Self {
        self.items = items;
        self
    }

    /// First working row, if any
    pub fn first_item(&self) -> Option<&Item> {
        self.items.first()
    }
}

/// Outcome of one flow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub ok: bool,
    pub flow_id: String,
    pub trigger_type: TriggerType,
    pub steps: u32,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Snapshot of the working rows at completion
    #[serde(default)]
    pub items: Vec<Item>,
}

impl RunResult {
    /// Audit summary of this result
    pub fn record(&self) -> RunRecord {
        RunRecord {
            flow_id: self.flow_id.clone(),
            trigger_type: self.trigger_type.clone(),
            ok: self.ok,
            steps: self.steps,
            duration_ms: self.duration_ms,
            error: self.error.clone(),
        }
    }
}

/// Compact run summary kept in the run history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub flow_id: String,
    pub trigger_type: TriggerType,
    pub ok: bool,
    pub steps: u32,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_defaults_to_one_empty_item() {
        let ctx = TriggerContext::new();
        assert_eq!(ctx.items.len(), 1);
        assert!(ctx.items[0].is_empty());

        let parsed: TriggerContext = serde_json::from_str(r#"{"actionTargetId": "btn"}"#).unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.action_target_id.as_deref(), Some("btn"));
    }
}
