//! Trigger dispatch for one loaded flow

use crate::engine::FlowEngine;
use crate::loader::LoadedFlow;
use flow_api::{RunResult, Trigger, TriggerContext, TriggerType};
use std::sync::Arc;

/// A loaded flow bound to the engine that runs it
#[derive(Debug, Clone)]
pub struct FlowRuntime {
    flow: Arc<LoadedFlow>,
    engine: Arc<FlowEngine>,
}

impl FlowRuntime {
    pub fn new(flow: LoadedFlow, engine: Arc<FlowEngine>) -> Self {
        Self {
            flow: Arc::new(flow),
            engine,
        }
    }

    pub fn flow(&self) -> &LoadedFlow {
        &self.flow
    }

    pub fn engine(&self) -> &Arc<FlowEngine> {
        &self.engine
    }

    /// Triggers matching an event, in declaration order
    ///
    /// `selector` is the UI target id for UI triggers and the message type
    /// for `OnMessage`. A trigger without a selector matches every event of
    /// its type; `OnTimer` ignores the selector.
    pub fn matching<'a>(
        &'a self,
        trigger_type: &'a TriggerType,
        selector: Option<&'a str>,
    ) -> impl Iterator<Item = &'a Trigger> + 'a {
        self.flow
            .definition
            .triggers
            .iter()
            .filter(move |t| &t.trigger_type == trigger_type)
            .filter(move |t| {
                let wanted = match trigger_type {
                    TriggerType::OnTimer => None,
                    TriggerType::OnMessage => t.message_type.as_deref(),
                    _ => t.target_id.as_deref(),
                };
                wanted.is_none() || wanted == selector
            })
    }

    /// Run every matching trigger
    ///
    /// UI events copy `selector` into the context's target id when the
    /// caller did not set one. No match yields an empty list.
    pub async fn dispatch(
        &self,
        trigger_type: &TriggerType,
        selector: Option<&str>,
        ctx: TriggerContext,
    ) -> Vec<RunResult> {
        let mut ctx = ctx;
        let is_ui = !matches!(trigger_type, TriggerType::OnTimer | TriggerType::OnMessage);
        if is_ui && ctx.action_target_id.is_none() {
            ctx.action_target_id = selector.map(str::to_string);
        }

        let triggers: Vec<&Trigger> = self.matching(trigger_type, selector).collect();
        if triggers.is_empty() {
            tracing::debug!(
                flow_id = %self.flow.flow_id(),
                trigger = %trigger_type,
                "No trigger matched"
            );
        }

        let mut results = Vec::with_capacity(triggers.len());
        for trigger in triggers {
            results.push(
                self.engine
                    .execute(&self.flow.definition, trigger, ctx.clone())
                    .await,
            );
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::FlowLoader;
    use flow_api::Grants;

    fn runtime() -> FlowRuntime {
        let json = r#"{
            "flowId": "multi",
            "triggers": [
                {"type": "OnClick", "targetId": "save", "startNodeId": "a"},
                {"type": "OnClick", "startNodeId": "b"},
                {"type": "OnMessage", "messageType": "ping", "startNodeId": "a"},
                {"type": "OnTimer", "startNodeId": "b"}
            ],
            "nodes": [
                {"id": "a", "type": "SetState", "params": {"key": "who", "value": "action.targetId"}},
                {"id": "b", "type": "Increment", "params": {"key": "count"}}
            ]
        }"#;
        let flow = FlowLoader::default().load(json.as_bytes(), &Grants::all()).unwrap();
        FlowRuntime::new(flow, Arc::new(FlowEngine::builder().build()))
    }

    #[test]
    fn test_matching() {
        let rt = runtime();
        assert_eq!(rt.matching(&TriggerType::OnClick, Some("save")).count(), 2);
        assert_eq!(rt.matching(&TriggerType::OnClick, Some("other")).count(), 1);
        assert_eq!(rt.matching(&TriggerType::OnMessage, Some("ping")).count(), 1);
        assert_eq!(rt.matching(&TriggerType::OnMessage, Some("pong")).count(), 0);
        assert_eq!(rt.matching(&TriggerType::OnTimer, Some("anything")).count(), 1);
        assert_eq!(rt.matching(&TriggerType::OnLoad, None).count(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_runs_in_order() {
        let rt = runtime();
        let results = rt
            .dispatch(&TriggerType::OnClick, Some("save"), TriggerContext::new())
            .await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.ok));

        let state = rt.engine().state();
        assert_eq!(state.get("who"), Some("save".into()));
        assert_eq!(state.get("count"), Some(flow_api::Value::Number(1.0)));
    }

    #[tokio::test]
    async fn test_unmatched_dispatch_is_empty() {
        let rt = runtime();
        let results = rt
            .dispatch(&TriggerType::OnLoad, None, TriggerContext::new())
            .await;
        assert!(results.is_empty());
    }
}
