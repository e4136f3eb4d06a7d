//! Step-bounded flow interpreter
//!
//! One engine instance serves one plugin. A run walks the node graph from
//! the trigger's start node until a node has no successor, the step budget
//! is spent, a referenced node is missing, or a node fails. Partial state
//! and item mutations are kept when a run aborts.

mod nodes;

pub use nodes::CURRENT_SCREEN_KEY;

use crate::assets::AssetTable;
use crate::audit::{self, AuditEvent, AuditSink, NullAuditSink};
use crate::capability::{
    DeniedSandbox, DurationHint, LoggingUi, NullPersistence, Persistence, SandboxCapability,
    UiController,
};
use crate::config::EngineConfig;
use crate::error::{NodeError, RunError};
use crate::history::RunHistory;
use crate::rate_limit::RateLimiter;
use crate::redact::Redactor;
use crate::registry::NodeRegistry;
use crate::state::PluginState;
use flow_api::{FlowDefinition, Item, Node, RunRecord, RunResult, Trigger, TriggerContext};
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Title of the dialog shown when a node fails
const ERROR_DIALOG_TITLE: &str = "Flow error";

/// Interpreter for one plugin's flows
pub struct FlowEngine {
    registry: Arc<NodeRegistry>,
    state: Arc<PluginState>,
    ui: Arc<dyn UiController>,
    sandbox: Arc<dyn SandboxCapability>,
    persistence: Arc<dyn Persistence>,
    audit: Arc<dyn AuditSink>,
    assets: AssetTable,
    config: EngineConfig,
    limiter: RateLimiter,
    history: RunHistory,
    redactor: Redactor,
}

impl fmt::Debug for FlowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowEngine")
            .field("node_types", &self.registry.len())
            .field("state_keys", &self.state.len())
            .field("assets", &self.assets.len())
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl FlowEngine {
    pub fn builder() -> FlowEngineBuilder {
        FlowEngineBuilder::new()
    }

    /// Shared plugin state
    pub fn state(&self) -> &Arc<PluginState> {
        &self.state
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Most recent run records, oldest first
    pub fn history(&self) -> Vec<RunRecord> {
        self.history.records()
    }

    /// Run `flow` from `trigger`
    ///
    /// Never fails: every error ends up in [`RunResult::error`] and in the
    /// run history.
    pub async fn execute(
        &self,
        flow: &FlowDefinition,
        trigger: &Trigger,
        mut ctx: TriggerContext,
    ) -> RunResult {
        let started = Instant::now();
        let selector = ctx
            .action_target_id
            .clone()
            .or_else(|| trigger.target_id.clone())
            .or_else(|| trigger.message_type.clone());
        let key = RateLimiter::key(&flow.flow_id, &trigger.trigger_type, selector.as_deref());

        if !self.limiter.try_acquire(&key, &trigger.trigger_type) {
            tracing::warn!(
                flow_id = %flow.flow_id,
                trigger = %trigger.trigger_type,
                key = %key,
                "Run rejected by rate limiter"
            );
            self.emit(audit::rate_limited(&flow.flow_id, &trigger.trigger_type, &key));
            return self.finish(flow, trigger, Err(RunError::RateLimited), 0, started, ctx.items);
        }

        let nodes = flow.node_map();
        let max_steps = self.config.max_steps_per_run;
        let mut current = non_blank(Some(&trigger.start_node_id));
        let mut steps: u32 = 0;

        let outcome = loop {
            let Some(node_id) = current.take() else {
                break Ok(());
            };
            if steps >= max_steps {
                break Err(RunError::StepLimitExceeded);
            }
            steps += 1;

            let Some(node) = nodes.get(node_id.as_str()).copied() else {
                break Err(RunError::MissingNode(node_id));
            };

            tracing::debug!(
                flow_id = %flow.flow_id,
                node_id = %node.id,
                node_type = %node.node_type,
                steps,
                "Dispatching node"
            );

            let before = self.config.trace_nodes.then(|| Snapshot::take(self, &ctx));
            let dispatched = self.dispatch_guarded(flow, node, &mut ctx).await;
            if let Some(before) = before {
                self.trace(flow, node, before, &ctx);
            }

            match dispatched {
                Ok(next) => current = next,
                Err(error) => {
                    let error = RunError::from(error);
                    tracing::error!(
                        flow_id = %flow.flow_id,
                        node_id = %node.id,
                        node_type = %node.node_type,
                        error = %error,
                        "Node failed"
                    );
                    self.report_failure(&error).await;
                    break Err(error);
                }
            }
        };

        self.finish(flow, trigger, outcome, steps, started, ctx.items)
    }

    /// Dispatch one node, turning a panic into a node failure
    async fn dispatch_guarded(
        &self,
        flow: &FlowDefinition,
        node: &Node,
        ctx: &mut TriggerContext,
    ) -> Result<Option<String>, NodeError> {
        match AssertUnwindSafe(self.dispatch(flow, node, ctx))
            .catch_unwind()
            .await
        {
            Ok(result) => result.map(|next| non_blank(next.as_ref())),
            Err(_) => Err(NodeError::Panicked),
        }
    }

    async fn report_failure(&self, error: &RunError) {
        let message = error.to_string();
        let shown = AssertUnwindSafe(self.ui.show_dialog(
            ERROR_DIALOG_TITLE,
            &message,
            DurationHint::Long,
        ))
        .catch_unwind()
        .await;
        if shown.is_err() {
            tracing::warn!(error = %message, "Error dialog could not be shown");
        }
    }

    fn trace(&self, flow: &FlowDefinition, node: &Node, before: Snapshot, ctx: &TriggerContext) {
        let after = Snapshot::take(self, ctx);
        let extra = self.sensitive_keys(node);
        let empty = Item::new();
        let event = AuditEvent::new(
            audit::AuditEventType::NodeTrace,
            &flow.flow_id,
            audit::AuditDetails::NodeTrace {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
                state_changes: self.redactor.diff(&before.state, &after.state, &extra),
                item_changes: self.redactor.diff(
                    before.item.as_ref().unwrap_or(&empty),
                    after.item.as_ref().unwrap_or(&empty),
                    &extra,
                ),
            },
        );
        self.emit(event);
    }

    fn finish(
        &self,
        flow: &FlowDefinition,
        trigger: &Trigger,
        outcome: Result<(), RunError>,
        steps: u32,
        started: Instant,
        items: Vec<Item>,
    ) -> RunResult {
        let admitted = !matches!(outcome, Err(RunError::RateLimited));
        let result = RunResult {
            ok: outcome.is_ok(),
            flow_id: flow.flow_id.clone(),
            trigger_type: trigger.trigger_type.clone(),
            steps,
            duration_ms: started.elapsed().as_millis() as u64,
            error: outcome.err().map(|e| e.to_string()),
            items,
        };

        self.history.push(result.record());
        if admitted {
            self.emit(audit::run_finished(&result));
        }

        match &result.error {
            None => tracing::info!(
                flow_id = %result.flow_id,
                trigger = %result.trigger_type,
                steps = result.steps,
                duration_ms = result.duration_ms,
                "Run completed"
            ),
            Some(error) => tracing::info!(
                flow_id = %result.flow_id,
                trigger = %result.trigger_type,
                steps = result.steps,
                duration_ms = result.duration_ms,
                error = %error,
                "Run aborted"
            ),
        }

        result
    }

    /// Hand an event to the audit sink; failures are only logged
    fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(event) {
            tracing::warn!(error = %e, "Failed to record audit event");
        }
    }
}

/// State and first item captured around a node for tracing
struct Snapshot {
    state: std::collections::BTreeMap<String, flow_api::Value>,
    item: Option<Item>,
}

impl Snapshot {
    fn take(engine: &FlowEngine, ctx: &TriggerContext) -> Self {
        Self {
            state: engine.state.snapshot(),
            item: ctx.first_item().cloned(),
        }
    }
}

fn non_blank(id: Option<&String>) -> Option<String> {
    id.filter(|id| !id.trim().is_empty()).cloned()
}

/// Builder for [`FlowEngine`]
///
/// Every capability defaults to a harmless implementation: a UI that only
/// logs, a sandbox that refuses everything, persistence and audit that
/// discard their input.
pub struct FlowEngineBuilder {
    registry: Option<Arc<NodeRegistry>>,
    state: Option<Arc<PluginState>>,
    ui: Option<Arc<dyn UiController>>,
    sandbox: Option<Arc<dyn SandboxCapability>>,
    persistence: Option<Arc<dyn Persistence>>,
    audit: Option<Arc<dyn AuditSink>>,
    assets: AssetTable,
    config: EngineConfig,
}

impl FlowEngineBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            state: None,
            ui: None,
            sandbox: None,
            persistence: None,
            audit: None,
            assets: AssetTable::new(),
            config: EngineConfig::default(),
        }
    }

    pub fn registry(mut self, registry: Arc<NodeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Share an existing state store
    pub fn state(mut self, state: Arc<PluginState>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn ui(mut self, ui: Arc<dyn UiController>) -> Self {
        self.ui = Some(ui);
        self
    }

    pub fn sandbox(mut self, sandbox: Arc<dyn SandboxCapability>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn assets(mut self, assets: AssetTable) -> Self {
        self.assets = assets;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> FlowEngine {
        let config = self.config;
        FlowEngine {
            registry: self.registry.unwrap_or_else(NodeRegistry::shared),
            state: self.state.unwrap_or_default(),
            ui: self.ui.unwrap_or_else(|| Arc::new(LoggingUi)),
            sandbox: self.sandbox.unwrap_or_else(|| Arc::new(DeniedSandbox)),
            persistence: self.persistence.unwrap_or_else(|| Arc::new(NullPersistence)),
            audit: self.audit.unwrap_or_else(|| Arc::new(NullAuditSink)),
            assets: self.assets,
            limiter: RateLimiter::new(config.rate_limits.clone()),
            history: RunHistory::new(config.history_capacity),
            redactor: Redactor::new(&config.redaction),
            config,
        }
    }
}

impl Default for FlowEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
