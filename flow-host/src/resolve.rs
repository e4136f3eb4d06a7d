//! Parameter value resolution
//!
//! Raw parameter strings may reference run data by prefix:
//!
//! | Prefix | Source |
//! |--------|--------|
//! | `state.<k>` | plugin state |
//! | `item.<k>` | current item, else first item |
//! | `action.targetId` | trigger target id |
//! | `action.data.<k>` | trigger payload |
//! | `asset:<path>` | package asset, base64 encoded |
//!
//! Resolution happens exactly once per call; a resolved value is returned
//! as-is even if it looks like another reference.

use crate::assets::AssetTable;
use base64::Engine as _;
use flow_api::{Item, TriggerContext, Value};
use std::collections::BTreeMap;

/// Read-only view of everything a reference may point at
#[derive(Debug, Clone, Copy)]
pub struct ResolveScope<'a> {
    pub state: &'a BTreeMap<String, Value>,
    pub context: &'a TriggerContext,
    pub assets: &'a AssetTable,
}

impl<'a> ResolveScope<'a> {
    pub fn new(
        state: &'a BTreeMap<String, Value>,
        context: &'a TriggerContext,
        assets: &'a AssetTable,
    ) -> Self {
        Self {
            state,
            context,
            assets,
        }
    }

    /// Resolve `raw` against this scope
    pub fn resolve(&self, raw: &Value, current_item: Option<&Item>) -> Value {
        resolve_value(raw, self, current_item)
    }
}

/// Resolve a raw parameter value
pub fn resolve_value(raw: &Value, scope: &ResolveScope<'_>, current_item: Option<&Item>) -> Value {
    let Value::String(s) = raw else {
        return raw.clone();
    };

    if let Some(key) = s.strip_prefix("state.") {
        return scope.state.get(key).cloned().unwrap_or_default();
    }
    if let Some(key) = s.strip_prefix("item.") {
        return current_item
            .or_else(|| scope.context.first_item())
            .and_then(|item| item.get(key))
            .cloned()
            .unwrap_or_default();
    }
    if let Some(key) = s.strip_prefix("action.data.") {
        return scope
            .context
            .action_data
            .get(key)
            .cloned()
            .unwrap_or_default();
    }
    if s == "action.targetId" {
        return scope
            .context
            .action_target_id
            .clone()
            .map(Value::String)
            .unwrap_or_default();
    }
    if let Some(path) = s.strip_prefix("asset:") {
        return scope
            .assets
            .get(path)
            .map(|bytes| Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)))
            .unwrap_or_default();
    }

    raw.clone()
}

/// True when a raw string is a run-time reference rather than a literal
pub fn is_reference(raw: &str) -> bool {
    raw.starts_with("state.")
        || raw.starts_with("item.")
        || raw.starts_with("action.")
        || raw.starts_with("asset:")
}
