//! Shared mutable state for a firing.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tripwire_events::Event;

use crate::rule::Rule;

/// Key/value bag shared by every listener, condition, action and middleware
/// invoked during a firing.
///
/// A context is normally created per firing. Callers that want actions to
/// communicate across several firings may keep one alive and pass it to
/// `Engine::fire_in_context` each time; such firings must not overlap.
#[derive(Debug, Default)]
pub struct Context {
    data: HashMap<String, serde_json::Value>,
    current_event: Option<Arc<Event>>,
    current_rule: Option<Arc<Rule>>,
    stop_pipeline: bool,
    skip_remaining_actions: bool,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Typed read. `None` if the key is missing or the value does not
    /// deserialize into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.data.remove(key)
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Copy of the data bag, for inspection after a firing.
    pub fn snapshot(&self) -> HashMap<String, serde_json::Value> {
        self.data.clone()
    }

    /// The event being dispatched (or last dispatched, for a kept context).
    pub fn current_event(&self) -> Option<&Event> {
        self.current_event.as_deref()
    }

    /// The rule whose conditions or actions are running.
    pub fn current_rule(&self) -> Option<&Rule> {
        self.current_rule.as_deref()
    }

    /// Halt the firing: no further listeners, rules or actions start.
    /// Middleware code after `next.run(..)` still runs.
    pub fn stop_pipeline(&mut self) {
        self.stop_pipeline = true;
    }

    pub fn is_pipeline_stopped(&self) -> bool {
        self.stop_pipeline
    }

    /// Skip the remaining actions of the current rule only.
    pub fn skip_remaining_actions(&mut self) {
        self.skip_remaining_actions = true;
    }

    pub fn is_skipping_remaining_actions(&self) -> bool {
        self.skip_remaining_actions
    }

    pub(crate) fn begin_firing(&mut self, event: Arc<Event>) {
        self.current_event = Some(event);
        self.current_rule = None;
        self.stop_pipeline = false;
        self.skip_remaining_actions = false;
    }

    pub(crate) fn enter_rule(&mut self, rule: Arc<Rule>) {
        self.current_rule = Some(rule);
        self.skip_remaining_actions = false;
    }
}
