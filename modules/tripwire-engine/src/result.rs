//! Outcome of a firing.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tripwire_events::Event;

/// An action that returned an error. Its rule stopped at this action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionFailure {
    pub action_type: String,
    /// The error with its full context chain.
    pub message: String,
}

impl ActionFailure {
    pub fn new(action_type: impl Into<String>, error: &anyhow::Error) -> Self {
        Self {
            action_type: action_type.into(),
            message: format!("{error:#}"),
        }
    }
}

/// What happened to one candidate rule.
#[derive(Debug, Clone, Serialize)]
pub struct RuleResult {
    pub rule_id: String,
    pub conditions_met: bool,
    pub executed_actions: Vec<String>,
    pub failed_conditions: Vec<String>,
    pub error: Option<ActionFailure>,
}

impl RuleResult {
    pub(crate) fn skipped(rule_id: impl Into<String>, failed_conditions: Vec<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            conditions_met: false,
            executed_actions: Vec::new(),
            failed_conditions,
            error: None,
        }
    }

    pub(crate) fn fired(
        rule_id: impl Into<String>,
        executed_actions: Vec<String>,
        error: Option<ActionFailure>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            conditions_met: true,
            executed_actions,
            failed_conditions: Vec::new(),
            error,
        }
    }
}

/// Everything one firing produced. Not retained by the engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineResult {
    pub event: Arc<Event>,
    pub fired_rules: Vec<RuleResult>,
    pub skipped_rules: Vec<RuleResult>,
    pub pipeline_stopped: bool,
    pub duration: Duration,
}

impl EngineResult {
    pub fn fired_rule_ids(&self) -> Vec<&str> {
        self.fired_rules.iter().map(|r| r.rule_id.as_str()).collect()
    }

    pub fn skipped_rule_ids(&self) -> Vec<&str> {
        self.skipped_rules.iter().map(|r| r.rule_id.as_str()).collect()
    }

    /// Executed action types across all fired rules, in execution order.
    pub fn executed_actions(&self) -> Vec<&str> {
        self.fired_rules
            .iter()
            .flat_map(|r| r.executed_actions.iter().map(String::as_str))
            .collect()
    }

    /// True if any fired rule stopped on a failing action.
    pub fn has_errors(&self) -> bool {
        self.fired_rules.iter().any(|r| r.error.is_some())
    }

    pub fn fired(&self, rule_id: &str) -> Option<&RuleResult> {
        self.fired_rules.iter().find(|r| r.rule_id == rule_id)
    }

    pub fn skipped(&self, rule_id: &str) -> Option<&RuleResult> {
        self.skipped_rules.iter().find(|r| r.rule_id == rule_id)
    }
}
