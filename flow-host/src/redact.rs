//! Redaction for log lines and audit events
//!
//! Values under a sensitive key are replaced by [`REDACTED`]. Everything
//! else is rendered as text and cut at a bounded length.

use crate::config::RedactionConfig;
use flow_api::Value;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Replacement for sensitive values
pub const REDACTED: &str = "<redacted>";

/// Appended to truncated values
pub const ELLIPSIS: &str = "…";

/// Key fragments that always mark a value as sensitive
const SENSITIVE_FRAGMENTS: &[&str] = &["image", "body", "base64"];

/// One changed key between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

/// Applies redaction and truncation rules
#[derive(Debug, Clone)]
pub struct Redactor {
    max_value_len: usize,
    sensitive_keys: BTreeSet<String>,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(&RedactionConfig::default())
    }
}

impl Redactor {
    pub fn new(config: &RedactionConfig) -> Self {
        Self {
            max_value_len: config.max_value_len,
            sensitive_keys: BTreeSet::new(),
        }
    }

    /// Always redact `key`, regardless of its name
    pub fn with_sensitive_key(mut self, key: impl Into<String>) -> Self {
        self.sensitive_keys.insert(key.into());
        self
    }

    /// True when values under `key` must never be shown
    pub fn is_sensitive(&self, key: &str) -> bool {
        if self.sensitive_keys.contains(key) {
            return true;
        }
        let lower = key.to_ascii_lowercase();
        SENSITIVE_FRAGMENTS.iter().any(|f| lower.contains(f))
    }

    /// Display form of `value` stored under `key`
    pub fn redact(&self, key: &str, value: &Value) -> String {
        if self.is_sensitive(key) {
            REDACTED.to_string()
        } else {
            self.truncate(&value.to_text())
        }
    }

    /// Same as [`redact`](Self::redact) with per-call sensitive keys
    pub fn redact_with(&self, key: &str, value: &Value, extra: &[String]) -> String {
        if extra.iter().any(|k| k == key) {
            REDACTED.to_string()
        } else {
            self.redact(key, value)
        }
    }

    /// Cut `text` to the configured length on a char boundary
    pub fn truncate(&self, text: &str) -> String {
        match text.char_indices().nth(self.max_value_len) {
            Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
            None => text.to_string(),
        }
    }

    /// Redacted changes from `before` to `after`, sorted by key
    pub fn diff(
        &self,
        before: &BTreeMap<String, Value>,
        after: &BTreeMap<String, Value>,
        extra: &[String],
    ) -> Vec<FieldChange> {
        let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
        keys.into_iter()
            .filter(|k| before.get(*k) != after.get(*k))
            .map(|k| FieldChange {
                key: k.clone(),
                before: before.get(k).map(|v| self.redact_with(k, v, extra)),
                after: after.get(k).map(|v| self.redact_with(k, v, extra)),
            })
            .collect()
    }
}
