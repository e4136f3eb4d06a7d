//! Per-node-type handlers
//!
//! Each handler applies its effects and returns the next node id. Network
//! and camera nodes write their failures into state instead of failing.

use super::FlowEngine;
use crate::audit;
use crate::capability::DurationHint;
use crate::condition;
use crate::error::NodeError;
use crate::policy;
use crate::registry::node_types;
use crate::resolve::ResolveScope;
use crate::template::render;
use base64::Engine as _;
use flow_api::{FlowDefinition, Item, Node, TriggerContext, Value};
use std::collections::BTreeMap;

/// State key recording the screen last navigated to
pub const CURRENT_SCREEN_KEY: &str = "_currentScreenId";

type NodeResult = Result<Option<String>, NodeError>;

impl FlowEngine {
    pub(super) async fn dispatch(
        &self,
        flow: &FlowDefinition,
        node: &Node,
        ctx: &mut TriggerContext,
    ) -> NodeResult {
        match node.node_type.as_str() {
            node_types::IF_ELSE => Ok(self.if_else(node, ctx)),
            node_types::SET_FIELD => self.set_field(node, ctx),
            node_types::FILTER => self.filter(node, ctx),
            node_types::SET_STATE => self.set_state(node, ctx),
            node_types::INCREMENT => self.increment(node, ctx),
            node_types::SHOW_TOAST => self.show_toast(node).await,
            node_types::SHOW_DIALOG => self.show_dialog(node).await,
            node_types::NAVIGATE => self.navigate(node).await,
            node_types::SHOW_IMAGE => self.show_image(node, ctx).await,
            node_types::EMIT_MESSAGE => self.emit_message(flow, node),
            node_types::PERSIST_STATE => self.persist_state(flow, node).await,
            node_types::CURL => self.curl(flow, node, ctx).await,
            node_types::PING => self.ping(flow, node, ctx).await,
            node_types::CAPTURE_IMAGE => self.capture_image(flow, node).await,
            other => {
                tracing::warn!(
                    flow_id = %flow.flow_id,
                    node_id = %node.id,
                    node_type = other,
                    "Unknown node type, continuing"
                );
                Ok(node.next.clone())
            }
        }
    }

    /// Explicit param, else the registered default
    fn param(&self, node: &Node, key: &str) -> Option<Value> {
        node.params
            .get(key)
            .filter(|v| !v.is_null())
            .or_else(|| self.registry.default_for(&node.node_type, key))
            .cloned()
    }

    /// Literal text param with a hardcoded fallback
    fn text_param(&self, node: &Node, key: &str, fallback: &str) -> String {
        self.param(node, key)
            .map(|v| v.to_text())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }

    fn required(&self, node: &Node, key: &str) -> Result<Value, NodeError> {
        self.param(node, key).ok_or_else(|| NodeError::MissingParam {
            node_id: node.id.clone(),
            key: key.to_string(),
        })
    }

    /// State keys whose values must never appear in traces for this node
    pub(super) fn sensitive_keys(&self, node: &Node) -> Vec<String> {
        match node.node_type.as_str() {
            node_types::CURL => vec![self.text_param(node, "bodyKey", "lastCurlBody")],
            node_types::CAPTURE_IMAGE => vec![self.text_param(node, "imageKey", "lastImageBase64")],
            _ => Vec::new(),
        }
    }

    /// Resolve a param and render it as text against `state`
    fn resolved_text(
        &self,
        node: &Node,
        key: &str,
        state: &BTreeMap<String, Value>,
        ctx: &TriggerContext,
    ) -> String {
        let raw = self.param(node, key).unwrap_or_default();
        let scope = ResolveScope::new(state, ctx, &self.assets);
        render(&scope.resolve(&raw, None).to_text(), state)
    }

    fn if_else(&self, node: &Node, ctx: &TriggerContext) -> Option<String> {
        let state = self.state.snapshot();
        let scope = ResolveScope::new(&state, ctx, &self.assets);
        let holds = self.condition(node, &scope, ctx.first_item());
        if holds {
            node.next_true.clone()
        } else {
            node.next_false.clone()
        }
    }

    fn condition(&self, node: &Node, scope: &ResolveScope<'_>, item: Option<&Item>) -> bool {
        let left = self.param(node, "left").unwrap_or_default();
        let op = self.text_param(node, "op", "==");
        let right = self.param(node, "right").unwrap_or_default();
        condition::evaluate(&left, &op, &right, scope, item)
    }

    fn set_field(&self, node: &Node, ctx: &mut TriggerContext) -> NodeResult {
        let field = self.required(node, "field")?.to_text();
        let raw = self.param(node, "value").unwrap_or_default();
        if ctx.items.is_empty() {
            ctx.items.push(Item::new());
        }

        let state = self.state.snapshot();
        let values: Vec<Value> = {
            let scope = ResolveScope::new(&state, ctx, &self.assets);
            ctx.items
                .iter()
                .map(|item| match scope.resolve(&raw, Some(item)) {
                    Value::String(s) => Value::String(render(&s, &state)),
                    other => other,
                })
                .collect()
        };

        for (item, value) in ctx.items.iter_mut().zip(values) {
            item.insert(field.clone(), value);
        }
        Ok(node.next.clone())
    }

    fn filter(&self, node: &Node, ctx: &mut TriggerContext) -> NodeResult {
        let state = self.state.snapshot();
        let kept: Vec<Item> = {
            let scope = ResolveScope::new(&state, ctx, &self.assets);
            ctx.items
                .iter()
                .filter(|item| self.condition(node, &scope, Some(*item)))
                .cloned()
                .collect()
        };
        ctx.items = kept;
        Ok(node.next.clone())
    }

    fn set_state(&self, node: &Node, ctx: &TriggerContext) -> NodeResult {
        let key = self.required(node, "key")?.to_text();
        let raw = self.param(node, "value").unwrap_or_default();
        let state = self.state.snapshot();
        let value = ResolveScope::new(&state, ctx, &self.assets).resolve(&raw, ctx.first_item());
        self.state.set(key, value);
        Ok(node.next.clone())
    }

    fn increment(&self, node: &Node, ctx: &TriggerContext) -> NodeResult {
        let key = self.required(node, "key")?.to_text();
        let state = self.state.snapshot();
        let raw_delta = self.param(node, "delta").unwrap_or(Value::Number(1.0));
        let delta = ResolveScope::new(&state, ctx, &self.assets)
            .resolve(&raw_delta, ctx.first_item())
            .as_f64()
            .unwrap_or(1.0);
        self.state.update(key, |current| {
            Value::Number(current.and_then(Value::as_f64).unwrap_or(0.0) + delta)
        });
        Ok(node.next.clone())
    }

    async fn show_toast(&self, node: &Node) -> NodeResult {
        let state = self.state.snapshot();
        let message = render(&self.required(node, "message")?.to_text(), &state);
        let duration = DurationHint::parse(&self.text_param(node, "duration", "short"));
        self.ui.show_toast(&message, duration).await;
        Ok(node.next.clone())
    }

    async fn show_dialog(&self, node: &Node) -> NodeResult {
        let state = self.state.snapshot();
        let title = render(&self.text_param(node, "title", ""), &state);
        let message = render(&self.required(node, "message")?.to_text(), &state);
        let duration = DurationHint::parse(&self.text_param(node, "duration", "short"));
        self.ui.show_dialog(&title, &message, duration).await;
        Ok(node.next.clone())
    }

    async fn navigate(&self, node: &Node) -> NodeResult {
        let state = self.state.snapshot();
        let screen_id = render(&self.required(node, "screenId")?.to_text(), &state);
        self.ui.navigate_to_screen(&screen_id, &BTreeMap::new()).await;
        self.state.set(CURRENT_SCREEN_KEY, screen_id);
        Ok(node.next.clone())
    }

    async fn show_image(&self, node: &Node, ctx: &TriggerContext) -> NodeResult {
        let state = self.state.snapshot();
        let raw = self.required(node, "source")?;
        let source = ResolveScope::new(&state, ctx, &self.assets).resolve(&raw, ctx.first_item());
        let screen_id = render(&self.text_param(node, "screenId", "image_viewer"), &state);

        let mut extras = BTreeMap::new();
        extras.insert("source".to_string(), source);
        self.ui.navigate_to_screen(&screen_id, &extras).await;
        self.state.set(CURRENT_SCREEN_KEY, screen_id);
        Ok(node.next.clone())
    }

    fn emit_message(&self, flow: &FlowDefinition, node: &Node) -> NodeResult {
        let message_type = self.text_param(node, "messageType", "");
        tracing::debug!(
            flow_id = %flow.flow_id,
            node_id = %node.id,
            message_type = %message_type,
            "EmitMessage has no messaging transport, skipping"
        );
        Ok(node.next.clone())
    }

    async fn persist_state(&self, flow: &FlowDefinition, node: &Node) -> NodeResult {
        let snapshot = self.state.snapshot();
        self.persistence.persist(&snapshot).await;
        self.emit(audit::capability_used(&flow.flow_id, &node.id, "persist", "ok"));
        Ok(node.next.clone())
    }

    async fn curl(&self, flow: &FlowDefinition, node: &Node, ctx: &TriggerContext) -> NodeResult {
        let state = self.state.snapshot();
        let url = self.resolved_text(node, "url", &state, ctx);
        let body_key = self.text_param(node, "bodyKey", "lastCurlBody");
        let status_key = self.text_param(node, "statusKey", "lastCurlStatus");
        let content_type_key = self.text_param(node, "contentTypeKey", "lastCurlContentType");
        let net = &self.config.network;
        let timeout_ms = net.clamp_timeout(self.resolved_i64(node, "timeoutMs", &state, ctx));
        let max_bytes = net.clamp_max_bytes(self.resolved_i64(node, "maxBytes", &state, ctx));

        let checked = match policy::validate_url(&url) {
            Ok(checked) => checked,
            Err(violation) => {
                tracing::warn!(
                    flow_id = %flow.flow_id,
                    node_id = %node.id,
                    reason = violation.as_str(),
                    "Curl destination blocked"
                );
                let shown = self.redactor.truncate(&url);
                self.emit(audit::policy_blocked(&flow.flow_id, &node.id, &shown, violation.as_str()));
                self.write_curl_failure(&body_key, &status_key, &content_type_key);
                return Ok(node.next.clone());
            }
        };

        match self.sandbox.http_get(checked.as_str(), max_bytes, timeout_ms).await {
            Ok(response) => {
                self.emit(audit::capability_used(
                    &flow.flow_id,
                    &node.id,
                    "http_get",
                    &response.status_code.to_string(),
                ));
                self.state.set(body_key, response.body);
                self.state.set(status_key, i64::from(response.status_code));
                self.state.set(content_type_key, response.content_type);
            }
            Err(e) => {
                tracing::warn!(
                    flow_id = %flow.flow_id,
                    node_id = %node.id,
                    error = %e,
                    "Curl failed"
                );
                self.emit(audit::capability_used(&flow.flow_id, &node.id, "http_get", &e.to_string()));
                self.write_curl_failure(&body_key, &status_key, &content_type_key);
            }
        }
        Ok(node.next.clone())
    }

    fn write_curl_failure(&self, body_key: &str, status_key: &str, content_type_key: &str) {
        self.state.set(body_key, "");
        self.state.set(status_key, -1);
        self.state.set(content_type_key, "");
    }

    async fn ping(&self, flow: &FlowDefinition, node: &Node, ctx: &TriggerContext) -> NodeResult {
        let state = self.state.snapshot();
        let host = self.resolved_text(node, "host", &state, ctx);
        let port = self.resolved_i64(node, "port", &state, ctx).unwrap_or(443);
        let ok_key = self.text_param(node, "okKey", "lastPingOk");
        let latency_key = self.text_param(node, "latencyKey", "lastPingLatencyMs");
        let timeout_ms = self
            .config
            .network
            .clamp_timeout(self.resolved_i64(node, "timeoutMs", &state, ctx).or(Some(2_000)));

        if let Err(violation) = policy::validate_host_port(&host, port) {
            tracing::warn!(
                flow_id = %flow.flow_id,
                node_id = %node.id,
                reason = violation.as_str(),
                "Ping destination blocked"
            );
            let destination = self.redactor.truncate(&format!("{}:{}", host, port));
            self.emit(audit::policy_blocked(&flow.flow_id, &node.id, &destination, violation.as_str()));
            self.state.set(ok_key, false);
            self.state.set(latency_key, -1);
            return Ok(node.next.clone());
        }

        // validate_host_port guarantees 1..=65535
        let port = u16::try_from(port).unwrap_or(443);
        match self.sandbox.tcp_ping(&host, port, timeout_ms).await {
            Ok(result) => {
                self.emit(audit::capability_used(&flow.flow_id, &node.id, "tcp_ping", "ok"));
                self.state.set(ok_key, true);
                self.state.set(latency_key, result.latency_ms as i64);
            }
            Err(e) => {
                tracing::warn!(
                    flow_id = %flow.flow_id,
                    node_id = %node.id,
                    error = %e,
                    "Ping failed"
                );
                self.emit(audit::capability_used(&flow.flow_id, &node.id, "tcp_ping", &e.to_string()));
                self.state.set(ok_key, false);
                self.state.set(latency_key, -1);
            }
        }
        Ok(node.next.clone())
    }

    async fn capture_image(&self, flow: &FlowDefinition, node: &Node) -> NodeResult {
        let image_key = self.text_param(node, "imageKey", "lastImageBase64");
        let status_key = self.text_param(node, "statusKey", "lastImageStatus");

        match self.sandbox.capture_image().await {
            Ok(bytes) => {
                self.emit(audit::capability_used(&flow.flow_id, &node.id, "capture_image", "ok"));
                let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
                self.state.set(image_key, encoded);
                self.state.set(status_key, "ok");
            }
            Err(e) => {
                tracing::warn!(
                    flow_id = %flow.flow_id,
                    node_id = %node.id,
                    error = %e,
                    "Image capture failed"
                );
                self.emit(audit::capability_used(
                    &flow.flow_id,
                    &node.id,
                    "capture_image",
                    &e.to_string(),
                ));
                self.state.set(image_key, "");
                self.state.set(status_key, format!("error:{}", e));
            }
        }
        Ok(node.next.clone())
    }

    fn resolved_i64(
        &self,
        node: &Node,
        key: &str,
        state: &BTreeMap<String, Value>,
        ctx: &TriggerContext,
    ) -> Option<i64> {
        let raw = self.param(node, key)?;
        ResolveScope::new(state, ctx, &self.assets)
            .resolve(&raw, ctx.first_item())
            .as_i64()
    }
}
