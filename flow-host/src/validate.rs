//! Load-time flow validation
//!
//! Runs once when a package is loaded. The engine trusts the result and
//! does not re-check parameters during runs.
//!
//! Hard errors block activation. Unknown parameter keys are only warnings.
//! Parameters holding a run-time reference (`state.x`, `item.y`, ...) skip
//! type and range checks since their value is unknown until the run.

use crate::registry::NodeRegistry;
use crate::resolve::is_reference;
use flow_api::{FlowDefinition, Grants, Node, NodeSpec, ParamSpec, ParamType, SideEffect, Value};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// A single validation finding
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationIssue {
    #[error("flow id must not be blank")]
    EmptyFlowId,

    #[error("duplicate node id '{0}'")]
    DuplicateNodeId(String),

    #[error("node '{node_id}' references missing node '{target}'")]
    DanglingReference { node_id: String, target: String },

    #[error("trigger {trigger} starts at missing node '{target}'")]
    MissingStartNode { trigger: String, target: String },

    #[error("node '{node_id}' has unknown type '{node_type}'")]
    UnknownNodeType { node_id: String, node_type: String },

    #[error("node '{node_id}' is missing required param '{key}'")]
    MissingParam { node_id: String, key: String },

    #[error("node '{node_id}' has unknown param '{key}'")]
    UnknownParam { node_id: String, key: String },

    #[error("node '{node_id}' param '{key}' is not a valid {expected:?}: {value}")]
    InvalidType {
        node_id: String,
        key: String,
        expected: ParamType,
        value: String,
    },

    #[error("node '{node_id}' param '{key}' = {value} is outside [{min}, {max}]")]
    OutOfRange {
        node_id: String,
        key: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("node '{node_id}' param '{key}' exceeds {max} characters")]
    TooLong {
        node_id: String,
        key: String,
        max: usize,
    },

    #[error("node '{node_id}' param '{key}' = '{value}' is not one of {allowed:?}")]
    NotAllowed {
        node_id: String,
        key: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("node '{node_id}' needs side effect '{effect}' which is not granted")]
    SideEffectNotGranted { node_id: String, effect: SideEffect },
}

impl ValidationIssue {
    /// Warnings never block activation
    pub fn is_warning(&self) -> bool {
        matches!(self, ValidationIssue::UnknownParam { .. })
    }
}

/// Collected findings, split by severity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn push(&mut self, issue: ValidationIssue) {
        if issue.is_warning() {
            self.warnings.push(issue);
        } else {
            self.errors.push(issue);
        }
    }

    fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Validate a node against its registered spec
pub fn validate_node(registry: &NodeRegistry, node: &Node) -> ValidationReport {
    match registry.get(&node.node_type) {
        Some(spec) => validate_params(spec, &node.id, &node.params),
        None => {
            let mut report = ValidationReport::default();
            report.push(ValidationIssue::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            });
            report
        }
    }
}

/// Validate a parameter map against a spec
pub fn validate_params(
    spec: &NodeSpec,
    node_id: &str,
    params: &BTreeMap<String, Value>,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    for key in params.keys() {
        if spec.param_spec(key).is_none() {
            report.push(ValidationIssue::UnknownParam {
                node_id: node_id.to_string(),
                key: key.clone(),
            });
        }
    }

    for param in &spec.params {
        match params.get(&param.key).filter(|v| !v.is_null()) {
            Some(value) => {
                if let Some(issue) = check_value(param, node_id, value) {
                    report.push(issue);
                }
            }
            None if param.required && param.default_value.is_none() => {
                report.push(ValidationIssue::MissingParam {
                    node_id: node_id.to_string(),
                    key: param.key.clone(),
                });
            }
            None => {}
        }
    }

    report
}

fn check_value(param: &ParamSpec, node_id: &str, value: &Value) -> Option<ValidationIssue> {
    if value.as_str().is_some_and(is_reference) {
        return None;
    }

    let invalid_type = || ValidationIssue::InvalidType {
        node_id: node_id.to_string(),
        key: param.key.clone(),
        expected: param.param_type,
        value: value.to_text(),
    };

    match param.param_type {
        ParamType::Any => None,
        ParamType::String => {
            let max = param.max_length?;
            (value.to_text().chars().count() > max).then(|| ValidationIssue::TooLong {
                node_id: node_id.to_string(),
                key: param.key.clone(),
                max,
            })
        }
        ParamType::Boolean => value.as_bool().is_none().then(invalid_type),
        ParamType::Long | ParamType::Double => {
            let number = if param.param_type == ParamType::Long {
                value.as_i64().map(|n| n as f64)
            } else {
                value.as_f64()
            };
            let Some(number) = number else {
                return Some(invalid_type());
            };
            let min = param.min.unwrap_or(f64::NEG_INFINITY);
            let max = param.max.unwrap_or(f64::INFINITY);
            (number < min || number > max).then(|| ValidationIssue::OutOfRange {
                node_id: node_id.to_string(),
                key: param.key.clone(),
                value: number,
                min,
                max,
            })
        }
        ParamType::Enum => {
            let text = value.to_text();
            (!param.allowed_values.contains(&text)).then(|| ValidationIssue::NotAllowed {
                node_id: node_id.to_string(),
                key: param.key.clone(),
                value: text,
                allowed: param.allowed_values.clone(),
            })
        }
    }
}

/// Validate a whole flow: structure, every node, and side-effect grants
pub fn validate_flow(
    registry: &NodeRegistry,
    flow: &FlowDefinition,
    grants: &Grants,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    if flow.flow_id.trim().is_empty() {
        report.push(ValidationIssue::EmptyFlowId);
    }

    let mut ids = HashSet::new();
    for node in &flow.nodes {
        if !ids.insert(node.id.as_str()) {
            report.push(ValidationIssue::DuplicateNodeId(node.id.clone()));
        }
    }

    for trigger in &flow.triggers {
        if !ids.contains(trigger.start_node_id.as_str()) {
            report.push(ValidationIssue::MissingStartNode {
                trigger: trigger.trigger_type.to_string(),
                target: trigger.start_node_id.clone(),
            });
        }
    }

    for node in &flow.nodes {
        for target in node.successors() {
            if !ids.contains(target) {
                report.push(ValidationIssue::DanglingReference {
                    node_id: node.id.clone(),
                    target: target.to_string(),
                });
            }
        }

        report.merge(validate_node(registry, node));

        for effect in grants.missing(&registry.side_effects(&node.node_type)) {
            report.push(ValidationIssue::SideEffectNotGranted {
                node_id: node.id.clone(),
                effect,
            });
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::node_types;
    use flow_api::Trigger;

    fn registry() -> NodeRegistry {
        NodeRegistry::builtin()
    }

    #[test]
    fn test_unknown_type_is_error() {
        let report = validate_node(&registry(), &Node::new("a", "Teleport"));
        assert!(!report.is_ok());
        assert!(matches!(
            report.errors[0],
            ValidationIssue::UnknownNodeType { .. }
        ));
    }

    #[test]
    fn test_missing_required_param() {
        let report = validate_node(&registry(), &Node::new("a", node_types::SET_STATE));
        assert_eq!(
            report.errors,
            vec![ValidationIssue::MissingParam {
                node_id: "a".into(),
                key: "key".into()
            }]
        );
    }

    #[test]
    fn test_default_satisfies_required() {
        let spec = NodeSpec::new("T", "T").param(ParamSpec::string("k").required().default("x"));
        assert!(validate_params(&spec, "a", &BTreeMap::new()).is_ok());
    }

    #[test]
    fn test_unknown_param_is_warning() {
        let node = Node::new("a", node_types::SET_STATE)
            .param("key", "x")
            .param("colour", "red");
        let report = validate_node(&registry(), &node);
        assert!(report.is_ok());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_type_and_range_checks() {
        let node = Node::new("a", node_types::PING)
            .param("host", "example.com")
            .param("port", 70000)
            .param("timeoutMs", "soon");
        let report = validate_node(&registry(), &node);
        assert_eq!(report.errors.len(), 2);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, ValidationIssue::OutOfRange { key, .. } if key == "port")));
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, ValidationIssue::InvalidType { key, .. } if key == "timeoutMs")));
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let node = Node::new("a", node_types::PING)
            .param("host", "example.com")
            .param("port", "8443");
        assert!(validate_node(&registry(), &node).is_ok());
    }

    #[test]
    fn test_enum_and_length() {
        let node = Node::new("a", node_types::SHOW_TOAST)
            .param("message", "x".repeat(1001))
            .param("duration", "forever");
        let report = validate_node(&registry(), &node);
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn test_boolean_truthy_strings() {
        let spec = NodeSpec::new("T", "T").param(ParamSpec::boolean("flag"));
        let mut params = BTreeMap::new();
        params.insert("flag".to_string(), Value::from("yes"));
        assert!(validate_params(&spec, "a", &params).is_ok());
        params.insert("flag".to_string(), Value::from("perhaps"));
        assert!(!validate_params(&spec, "a", &params).is_ok());
    }

    #[test]
    fn test_references_skip_type_checks() {
        let node = Node::new("a", node_types::PING)
            .param("host", "state.host")
            .param("port", "state.port");
        assert!(validate_node(&registry(), &node).is_ok());
    }

    #[test]
    fn test_flow_structure() {
        let flow = FlowDefinition::new("f")
            .trigger(Trigger::new("OnClick", "missing"))
            .node(Node::new("a", node_types::PERSIST_STATE).next("ghost"))
            .node(Node::new("a", node_types::PERSIST_STATE));
        let report = validate_flow(&registry(), &flow, &Grants::all());

        assert!(report
            .errors
            .contains(&ValidationIssue::DuplicateNodeId("a".into())));
        assert!(report.errors.contains(&ValidationIssue::DanglingReference {
            node_id: "a".into(),
            target: "ghost".into()
        }));
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, ValidationIssue::MissingStartNode { .. })));
    }

    #[test]
    fn test_grants_enforced() {
        let flow = FlowDefinition::new("f")
            .trigger(Trigger::new("OnTimer", "a"))
            .node(Node::new("a", node_types::CURL).param("url", "https://example.com"));

        let denied = validate_flow(&registry(), &flow, &Grants::none());
        assert_eq!(
            denied.errors,
            vec![ValidationIssue::SideEffectNotGranted {
                node_id: "a".into(),
                effect: SideEffect::Network
            }]
        );

        let allowed = validate_flow(
            &registry(),
            &flow,
            &Grants::none().with(SideEffect::Network),
        );
        assert!(allowed.is_ok());
    }
}
