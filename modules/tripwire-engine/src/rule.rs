//! Declarative rules and their builder.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tripwire_events::Event;

use crate::condition::{CompareOp, FieldCondition, PredicateCondition};
use crate::context::Context;
use crate::settings::ActionSettings;
use crate::traits::Condition;

/// How a rule combines the results of its conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchMode {
    /// Every condition true.
    #[default]
    All,
    /// At least one condition true.
    Any,
    /// Every condition false.
    None,
    /// Exactly one condition true; two or more fails.
    ExactlyOne,
}

impl MatchMode {
    pub fn combine(self, results: &[bool]) -> bool {
        match self {
            MatchMode::All => results.iter().all(|r| *r),
            MatchMode::Any => results.iter().any(|r| *r),
            MatchMode::None => results.iter().all(|r| !*r),
            MatchMode::ExactlyOne => results.iter().filter(|r| **r).count() == 1,
        }
    }
}

/// An action type to run when the rule fires, with its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionBinding {
    pub action_type: String,
    pub settings: ActionSettings,
    /// Ascending; ties keep insertion order.
    pub order: i32,
}

/// A rule: which events it listens to, when it fires, and what it runs.
///
/// Built with `Rule::builder`. After `build()` only the enabled flag can
/// change, and only through the engine.
#[derive(Clone)]
pub struct Rule {
    id: String,
    group: Option<String>,
    priority: i32,
    enabled: bool,
    event_types: Vec<String>,
    conditions: Vec<Arc<dyn Condition>>,
    match_mode: MatchMode,
    actions: Vec<ActionBinding>,
}

impl Rule {
    pub fn builder(id: impl Into<String>) -> RuleBuilder {
        RuleBuilder::new(id)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn event_types(&self) -> &[String] {
        &self.event_types
    }

    pub fn listens_to(&self, event_type: &str) -> bool {
        self.event_types.iter().any(|t| t == event_type)
    }

    pub fn conditions(&self) -> &[Arc<dyn Condition>] {
        &self.conditions
    }

    pub fn match_mode(&self) -> MatchMode {
        self.match_mode
    }

    /// Bindings in execution order.
    pub fn actions(&self) -> &[ActionBinding] {
        &self.actions
    }

    /// Evaluate every condition (no short-circuit) and combine per the match
    /// mode. Names of conditions that evaluated false are pushed to `failed`.
    pub fn evaluate(&self, event: &Event, context: &Context, failed: &mut Vec<String>) -> bool {
        if self.conditions.is_empty() {
            return true;
        }

        let results: Vec<bool> = self
            .conditions
            .iter()
            .map(|condition| {
                let passed = condition.evaluate(event, context);
                if !passed {
                    failed.push(condition.name().to_string());
                }
                passed
            })
            .collect();

        self.match_mode.combine(&results)
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("group", &self.group)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("event_types", &self.event_types)
            .field(
                "conditions",
                &self.conditions.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("match_mode", &self.match_mode)
            .field("actions", &self.actions)
            .finish()
    }
}

/// Fluent builder for `Rule`. Consumed by `build()`.
pub struct RuleBuilder {
    rule: Rule,
}

impl RuleBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            rule: Rule {
                id: id.into(),
                group: None,
                priority: 0,
                enabled: true,
                event_types: Vec::new(),
                conditions: Vec::new(),
                match_mode: MatchMode::All,
                actions: Vec::new(),
            },
        }
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.rule.group = Some(group.into());
        self
    }

    /// Higher runs first.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.rule.priority = priority;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.rule.enabled = enabled;
        self
    }

    pub fn disabled(self) -> Self {
        self.enabled(false)
    }

    /// Listen to an event type. Repeats are ignored.
    pub fn on(mut self, event_type: impl Into<String>) -> Self {
        let event_type = event_type.into();
        if !self.rule.event_types.contains(&event_type) {
            self.rule.event_types.push(event_type);
        }
        self
    }

    pub fn on_any<I, S>(self, event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        event_types.into_iter().fold(self, |b, t| b.on(t))
    }

    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.rule.match_mode = mode;
        self
    }

    /// Add a closure condition.
    pub fn when<F>(self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Event, &Context) -> bool + Send + Sync + 'static,
    {
        self.when_condition(PredicateCondition::new(name, predicate))
    }

    pub fn when_condition(mut self, condition: impl Condition + 'static) -> Self {
        self.rule.conditions.push(Arc::new(condition));
        self
    }

    pub fn when_field(
        self,
        field: impl Into<String>,
        op: CompareOp,
        expected: impl Into<serde_json::Value>,
    ) -> Self {
        self.when_condition(FieldCondition::new(field, op, expected))
    }

    pub fn when_equals(self, field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.when_field(field, CompareOp::Equal, value)
    }

    pub fn when_greater_than(
        self,
        field: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.when_field(field, CompareOp::GreaterThan, value)
    }

    pub fn when_less_than(
        self,
        field: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.when_field(field, CompareOp::LessThan, value)
    }

    /// Bind an action with no settings at order 0.
    pub fn then(self, action_type: impl Into<String>) -> Self {
        self.then_ordered(action_type, 0)
    }

    pub fn then_ordered(self, action_type: impl Into<String>, order: i32) -> Self {
        self.bind(action_type.into(), ActionSettings::new(), order)
    }

    /// Bind an action and fill its settings.
    pub fn then_with<F>(self, action_type: impl Into<String>, order: i32, configure: F) -> Self
    where
        F: FnOnce(&mut ActionSettings),
    {
        let mut settings = ActionSettings::new();
        configure(&mut settings);
        self.bind(action_type.into(), settings, order)
    }

    fn bind(mut self, action_type: String, settings: ActionSettings, order: i32) -> Self {
        self.rule.actions.push(ActionBinding {
            action_type,
            settings,
            order,
        });
        self
    }

    pub fn build(mut self) -> Rule {
        // Stable: equal orders keep insertion order.
        self.rule.actions.sort_by_key(|binding| binding.order);
        self.rule
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builder_defaults() {
        let rule = Rule::builder("r1").on("e").build();
        assert_eq!(rule.id(), "r1");
        assert!(rule.group().is_none());
        assert_eq!(rule.priority(), 0);
        assert!(rule.is_enabled());
        assert_eq!(rule.match_mode(), MatchMode::All);
        assert!(rule.conditions().is_empty());
        assert!(rule.actions().is_empty());
    }

    #[test]
    fn event_types_are_deduplicated_in_insertion_order() {
        let rule = Rule::builder("r1")
            .on("b")
            .on("a")
            .on_any(["b", "c"])
            .build();
        assert_eq!(rule.event_types(), ["b", "a", "c"]);
        assert!(rule.listens_to("c"));
        assert!(!rule.listens_to("d"));
    }

    #[test]
    fn actions_sorted_by_order_with_stable_ties() {
        let rule = Rule::builder("r1")
            .then_ordered("late", 5)
            .then("first_zero")
            .then_ordered("early", -1)
            .then("second_zero")
            .build();
        let types: Vec<&str> = rule.actions().iter().map(|a| a.action_type.as_str()).collect();
        assert_eq!(types, ["early", "first_zero", "second_zero", "late"]);
    }

    #[test]
    fn then_with_fills_settings() {
        let rule = Rule::builder("r1")
            .then_with("damage", 0, |s| {
                s.set("amount", 25);
            })
            .build();
        assert_eq!(rule.actions()[0].settings.get("amount"), Some(&json!(25)));
    }

    #[test]
    fn match_modes_combine_results() {
        assert!(MatchMode::All.combine(&[true, true]));
        assert!(!MatchMode::All.combine(&[true, false]));
        assert!(MatchMode::Any.combine(&[false, true]));
        assert!(!MatchMode::Any.combine(&[false, false]));
        assert!(MatchMode::None.combine(&[false, false]));
        assert!(!MatchMode::None.combine(&[false, true]));
        assert!(MatchMode::ExactlyOne.combine(&[false, true]));
        assert!(!MatchMode::ExactlyOne.combine(&[true, true]));
        assert!(!MatchMode::ExactlyOne.combine(&[false, false]));
    }

    #[test]
    fn evaluate_runs_every_condition_and_collects_failures() {
        let rule = Rule::builder("r1")
            .with_match_mode(MatchMode::Any)
            .when_equals("a", 1)
            .when_equals("b", 2)
            .when_equals("c", 3)
            .build();
        let event = Event::new("e").with("a", 0).with("b", 2).with("c", 0);

        let mut failed = Vec::new();
        assert!(rule.evaluate(&event, &Context::new(), &mut failed));
        assert_eq!(failed, ["a eq 1", "c eq 3"]);
    }

    #[test]
    fn no_conditions_is_vacuously_true() {
        let rule = Rule::builder("r1").with_match_mode(MatchMode::ExactlyOne).build();
        let mut failed = Vec::new();
        assert!(rule.evaluate(&Event::new("e"), &Context::new(), &mut failed));
        assert!(failed.is_empty());
    }
}
