//! Registries and the dispatch loop.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use futures::future::BoxFuture;
use tracing::{debug, info, info_span, warn, Instrument};
use tripwire_events::Event;

use crate::config::{DuplicateRulePolicy, EngineConfig};
use crate::context::Context;
use crate::error::EngineError;
use crate::middleware::{InlineMiddleware, Next};
use crate::result::{ActionFailure, EngineResult, RuleResult};
use crate::rule::Rule;
use crate::settings::ActionSettings;
use crate::traits::{Action, ActionFn, Listener, ListenerFn, Middleware};

/// Observer for human-readable dispatch diagnostics. Never affects control flow.
pub type DiagnosticSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Fired/skipped results accumulated by the innermost dispatch step.
#[derive(Default)]
pub(crate) struct RuleOutcomes {
    fired: Vec<RuleResult>,
    skipped: Vec<RuleResult>,
}

/// Event-condition-action dispatcher.
///
/// Register actions, rules, listeners and middleware first (`&mut self`),
/// then fire events (`&self`). Each engine owns its registries; any number
/// of engines can coexist.
pub struct Engine {
    config: EngineConfig,
    actions: HashMap<String, Arc<dyn Action>>,
    rules: Vec<Arc<Rule>>,
    middlewares: Vec<Arc<dyn Middleware>>,
    listeners: HashMap<String, Vec<Arc<dyn Listener>>>,
    diagnostics: Option<DiagnosticSink>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            actions: HashMap::new(),
            rules: Vec::new(),
            middlewares: Vec::new(),
            listeners: HashMap::new(),
            diagnostics: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register an action under its type name, replacing any previous one.
    pub fn register_action(&mut self, action: Arc<dyn Action>) -> &mut Self {
        self.actions.insert(action.action_type().to_string(), action);
        self
    }

    pub fn register_action_fn<F>(&mut self, action_type: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&mut Context, &ActionSettings) -> Result<()> + Send + Sync + 'static,
    {
        self.register_action(Arc::new(ActionFn::new(action_type, handler)))
    }

    /// Append a rule. Fails only under `DuplicateRulePolicy::Reject`.
    pub fn add_rule(&mut self, rule: Rule) -> Result<&mut Self, EngineError> {
        if self.config.duplicate_rule_ids == DuplicateRulePolicy::Reject
            && self.rules.iter().any(|r| r.id() == rule.id())
        {
            return Err(EngineError::DuplicateRule(rule.id().to_string()));
        }
        self.rules.push(Arc::new(rule));
        Ok(self)
    }

    pub fn add_rules(&mut self, rules: impl IntoIterator<Item = Rule>) -> Result<&mut Self, EngineError> {
        for rule in rules {
            self.add_rule(rule)?;
        }
        Ok(self)
    }

    /// Insert a middleware, keeping the chain sorted by ascending order.
    /// Equal orders keep registration order.
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middlewares.push(middleware);
        self.middlewares.sort_by_key(|m| m.order());
        self
    }

    pub fn use_fn<F>(&mut self, name: impl Into<String>, order: i32, handler: F) -> &mut Self
    where
        F: for<'c> Fn(&'c mut Context, Next<'c>) -> BoxFuture<'c, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.use_middleware(Arc::new(InlineMiddleware::new(name, order, handler)))
    }

    /// Remove every middleware with the given name.
    pub fn remove_middleware(&mut self, name: &str) -> &mut Self {
        self.middlewares.retain(|m| m.name() != name);
        self
    }

    /// Subscribe directly to an event type. Listeners run in registration
    /// order, before any rule.
    pub fn add_listener(&mut self, event_type: impl Into<String>, listener: Arc<dyn Listener>) -> &mut Self {
        self.listeners
            .entry(event_type.into())
            .or_default()
            .push(listener);
        self
    }

    pub fn on<F>(&mut self, event_type: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&Event, &mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.add_listener(event_type, Arc::new(ListenerFn::new(handler)))
    }

    pub fn set_diagnostic_sink<F>(&mut self, sink: F) -> &mut Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.diagnostics = Some(Arc::new(sink));
        self
    }

    // -----------------------------------------------------------------------
    // Rule lifecycle
    // -----------------------------------------------------------------------

    /// Enable the first rule with this id. No-op if absent.
    pub fn enable_rule(&mut self, rule_id: &str) -> &mut Self {
        self.set_rule_enabled(rule_id, true)
    }

    /// Disable the first rule with this id. No-op if absent.
    pub fn disable_rule(&mut self, rule_id: &str) -> &mut Self {
        self.set_rule_enabled(rule_id, false)
    }

    pub fn enable_group(&mut self, group: &str) -> &mut Self {
        self.set_group_enabled(group, true)
    }

    pub fn disable_group(&mut self, group: &str) -> &mut Self {
        self.set_group_enabled(group, false)
    }

    /// Remove every rule with this id.
    pub fn remove_rule(&mut self, rule_id: &str) -> &mut Self {
        self.rules.retain(|r| r.id() != rule_id);
        self
    }

    fn set_rule_enabled(&mut self, rule_id: &str, enabled: bool) -> &mut Self {
        if let Some(rule) = self.rules.iter_mut().find(|r| r.id() == rule_id) {
            Arc::make_mut(rule).set_enabled(enabled);
        }
        self
    }

    fn set_group_enabled(&mut self, group: &str, enabled: bool) -> &mut Self {
        for rule in self.rules.iter_mut().filter(|r| r.group() == Some(group)) {
            Arc::make_mut(rule).set_enabled(enabled);
        }
        self
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// First rule with this id.
    pub fn rule(&self, rule_id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id() == rule_id).map(|r| r.as_ref())
    }

    /// Rules in registration order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    pub fn has_action(&self, action_type: &str) -> bool {
        self.actions.contains_key(action_type)
    }

    /// Registered action types, sorted.
    pub fn action_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Middleware names, outermost first.
    pub fn middleware_names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        self.listeners.get(event_type).map_or(0, Vec::len)
    }

    // -----------------------------------------------------------------------
    // Firing
    // -----------------------------------------------------------------------

    /// Fire an event with a fresh context.
    pub async fn fire(&self, event: Event) -> Result<EngineResult, EngineError> {
        let mut context = Context::new();
        self.fire_in_context(event, &mut context).await
    }

    /// Build an event of the given type, let `configure` fill it, and fire
    /// it with a fresh context.
    pub async fn fire_type<F>(&self, event_type: &str, configure: F) -> Result<EngineResult, EngineError>
    where
        F: FnOnce(&mut Event),
    {
        let mut context = Context::new();
        self.fire_type_in_context(event_type, configure, &mut context).await
    }

    pub async fn fire_type_in_context<F>(
        &self,
        event_type: &str,
        configure: F,
        context: &mut Context,
    ) -> Result<EngineResult, EngineError>
    where
        F: FnOnce(&mut Event),
    {
        let mut event = Event::new(event_type);
        configure(&mut event);
        self.fire_in_context(event, context).await
    }

    /// Fire an event with a caller-supplied context. Data written by
    /// listeners, conditions and actions stays in the context afterwards.
    ///
    /// Returns `Err` only when a listener or middleware layer fails; action
    /// failures are reported inside the result.
    pub async fn fire_in_context(
        &self,
        event: Event,
        context: &mut Context,
    ) -> Result<EngineResult, EngineError> {
        let started = Instant::now();
        let event = Arc::new(event);
        context.begin_firing(Arc::clone(&event));

        let span = info_span!("fire", event_type = %event.event_type, event_id = %event.id);
        let mut outcomes = RuleOutcomes::default();

        Next::new(self, &self.middlewares, &event, &mut outcomes)
            .run(context)
            .instrument(span)
            .await?;

        let result = EngineResult {
            event,
            fired_rules: outcomes.fired,
            skipped_rules: outcomes.skipped,
            pipeline_stopped: context.is_pipeline_stopped(),
            duration: started.elapsed(),
        };

        info!(
            event_type = %result.event.event_type,
            fired = result.fired_rules.len(),
            skipped = result.skipped_rules.len(),
            stopped = result.pipeline_stopped,
            elapsed_ms = result.duration.as_millis() as u64,
            "Firing complete"
        );
        self.diagnose(|| {
            format!(
                "Event '{}' completed: {} fired, {} skipped, {}ms",
                result.event.event_type,
                result.fired_rules.len(),
                result.skipped_rules.len(),
                result.duration.as_millis()
            )
        });
        if let Some(threshold) = self.config.slow_firing_threshold {
            if result.duration > threshold {
                warn!(
                    event_type = %result.event.event_type,
                    elapsed_ms = result.duration.as_millis() as u64,
                    threshold_ms = threshold.as_millis() as u64,
                    "Slow firing"
                );
            }
        }

        Ok(result)
    }

    /// Innermost step of the chain: listeners, then matching rules by
    /// descending priority.
    pub(crate) async fn dispatch_inner(
        &self,
        event: &Arc<Event>,
        context: &mut Context,
        outcomes: &mut RuleOutcomes,
    ) -> Result<()> {
        if let Some(listeners) = self.listeners.get(&event.event_type) {
            for listener in listeners {
                if context.is_pipeline_stopped() {
                    break;
                }
                listener.handle(event, context).await?;
            }
        }

        let mut candidates: Vec<&Arc<Rule>> = self
            .rules
            .iter()
            .filter(|r| r.is_enabled() && r.listens_to(&event.event_type))
            .collect();
        // Stable: equal priorities keep registration order.
        candidates.sort_by_key(|r| Reverse(r.priority()));

        debug!(candidates = candidates.len(), "Candidate rules selected");
        self.diagnose(|| {
            format!(
                "Event '{}' -> {} candidate rules",
                event.event_type,
                candidates.len()
            )
        });

        for rule in candidates {
            if context.is_pipeline_stopped() {
                debug!("Pipeline stopped, remaining rules not evaluated");
                self.diagnose(|| "Pipeline stopped, skipping remaining rules".to_string());
                break;
            }

            context.enter_rule(Arc::clone(rule));
            let result = self.evaluate_and_execute(rule, event, context).await;

            if result.conditions_met {
                outcomes.fired.push(result);
            } else {
                outcomes.skipped.push(result);
            }
        }

        Ok(())
    }

    async fn evaluate_and_execute(&self, rule: &Rule, event: &Event, context: &mut Context) -> RuleResult {
        let mut failed_conditions = Vec::new();

        if !rule.evaluate(event, context, &mut failed_conditions) {
            debug!(rule_id = rule.id(), failed = ?failed_conditions, "Conditions not met");
            self.diagnose(|| {
                format!(
                    "  Rule '{}' -> conditions not met [{}]",
                    rule.id(),
                    failed_conditions.join(", ")
                )
            });
            return RuleResult::skipped(rule.id(), failed_conditions);
        }

        let mut executed = Vec::new();
        let mut error = None;

        for binding in rule.actions() {
            if context.is_skipping_remaining_actions() || context.is_pipeline_stopped() {
                break;
            }

            let Some(action) = self.actions.get(&binding.action_type) else {
                warn!(rule_id = rule.id(), action_type = %binding.action_type, "Action not registered, skipping");
                self.diagnose(|| format!("  Action '{}' not found", binding.action_type));
                continue;
            };

            debug!(rule_id = rule.id(), action_type = %binding.action_type, "Executing action");
            self.diagnose(|| format!("  -> Executing action '{}'", binding.action_type));

            match action.execute(context, &binding.settings).await {
                Ok(()) => executed.push(binding.action_type.clone()),
                Err(err) => {
                    warn!(
                        rule_id = rule.id(),
                        action_type = %binding.action_type,
                        error = %format!("{err:#}"),
                        "Action failed, abandoning rule"
                    );
                    self.diagnose(|| format!("  Action '{}' error: {err:#}", binding.action_type));
                    error = Some(ActionFailure::new(&binding.action_type, &err));
                    break;
                }
            }
        }

        debug!(rule_id = rule.id(), executed = executed.len(), "Rule fired");
        self.diagnose(|| format!("  Rule '{}' -> {} actions executed", rule.id(), executed.len()));

        RuleResult::fired(rule.id(), executed, error)
    }

    fn diagnose(&self, message: impl FnOnce() -> String) {
        if let Some(sink) = &self.diagnostics {
            sink(&message());
        }
    }
}
